use std::path::Path;

use anyhow::Result;
use clap::Parser;

use crate::commands::load_container;

/// Output the state of a container as JSON
#[derive(Parser, Debug)]
pub struct State {
    #[clap(required = true)]
    pub container_id: String,
}

impl State {
    pub fn exec(&self, root_path: &Path) -> Result<()> {
        let mut container = load_container(root_path, &self.container_id)?;
        container.refresh_status()?;
        println!("{}", serde_json::to_string_pretty(&container.state)?);
        Ok(())
    }
}
