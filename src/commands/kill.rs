use std::path::Path;

use anyhow::Result;
use clap::Parser;

use crate::commands::load_container;
use crate::signal;

/// Send a signal to the container's init process
#[derive(Parser, Debug)]
pub struct Kill {
    #[clap(required = true)]
    pub container_id: String,
    /// Symbolic or numeric signal name
    #[clap(default_value = "SIGTERM")]
    pub signal: String,
}

impl Kill {
    pub fn exec(&self, root_path: &Path) -> Result<()> {
        let sig = signal::from_str(&self.signal)?;
        let mut container = load_container(root_path, &self.container_id)?;
        container.kill(sig)
    }
}
