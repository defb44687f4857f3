use std::path::Path;

use anyhow::Result;
use clap::Parser;

use crate::commands::load_container;

/// Display the processes running inside a container
#[derive(Parser, Debug)]
pub struct Ps {
    #[clap(required = true)]
    pub container_id: String,
}

impl Ps {
    pub fn exec(&self, root_path: &Path) -> Result<()> {
        let mut container = load_container(root_path, &self.container_id)?;
        container.ps()
    }
}
