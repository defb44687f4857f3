use std::path::Path;

use anyhow::Result;
use clap::Parser;

use crate::commands::load_container;

/// Stream container events or resource statistics as JSON lines
#[derive(Parser, Debug)]
pub struct Events {
    /// Keep following the journal until the container exits
    #[clap(long)]
    pub follow: bool,
    /// Emit resource usage samples instead of journal events
    #[clap(long)]
    pub stats: bool,
    /// Sampling interval in milliseconds
    #[clap(long, default_value = "5000")]
    pub interval: u64,
    #[clap(required = true)]
    pub container_id: String,
}

impl Events {
    pub fn exec(&self, root_path: &Path) -> Result<()> {
        let mut container = load_container(root_path, &self.container_id)?;
        container.events(self.follow, self.stats, self.interval)
    }
}
