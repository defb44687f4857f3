use std::path::Path;

use anyhow::Result;
use clap::Parser;

use crate::commands::load_container;

/// Start a previously created container
#[derive(Parser, Debug)]
pub struct Start {
    /// Stay attached and wait for the container to exit
    #[clap(short, long)]
    pub attach: bool,
    #[clap(required = true)]
    pub container_id: String,
}

impl Start {
    pub fn exec(&self, root_path: &Path) -> Result<()> {
        let mut container = load_container(root_path, &self.container_id)?;
        container.start(self.attach)
    }
}
