use std::path::Path;

use anyhow::Result;
use clap::Parser;

use crate::commands::load_container;

/// Release all resources held by a container
#[derive(Parser, Debug)]
pub struct Delete {
    #[clap(required = true)]
    pub container_id: String,
    /// Force deletion of a container that is still running (uses SIGKILL)
    #[clap(short, long)]
    pub force: bool,
}

impl Delete {
    pub fn exec(&self, root_path: &Path) -> Result<()> {
        log::debug!("start deleting {}", self.container_id);
        let mut container = load_container(root_path, &self.container_id)?;
        container.delete(self.force)
    }
}
