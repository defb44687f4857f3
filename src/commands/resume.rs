use std::path::Path;

use anyhow::Result;
use clap::Parser;

use crate::commands::load_container;

/// Resume all processes of a paused container
#[derive(Parser, Debug)]
pub struct Resume {
    #[clap(required = true)]
    pub container_id: String,
}

impl Resume {
    pub fn exec(&self, root_path: &Path) -> Result<()> {
        let mut container = load_container(root_path, &self.container_id)?;
        container.resume()
    }
}
