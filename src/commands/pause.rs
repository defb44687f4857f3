use std::path::Path;

use anyhow::Result;
use clap::Parser;

use crate::commands::load_container;

/// Suspend all processes inside the container
#[derive(Parser, Debug)]
pub struct Pause {
    #[clap(required = true)]
    pub container_id: String,
}

impl Pause {
    pub fn exec(&self, root_path: &Path) -> Result<()> {
        let mut container = load_container(root_path, &self.container_id)?;
        container.pause()
    }
}
