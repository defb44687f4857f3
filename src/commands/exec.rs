use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;

use crate::commands::load_container;
use crate::container::ExecOpts;

/// Execute a process inside an existing container
#[derive(Parser, Debug)]
pub struct Exec {
    /// Path to a process.json describing the process to run
    #[clap(short, long)]
    pub process: Option<PathBuf>,
    /// File to write the pid of the executed process to
    #[clap(long)]
    pub pid_file: Option<PathBuf>,
    /// Do not wait for the process to exit
    #[clap(short, long)]
    pub detach: bool,
    /// Allocate a controlling terminal for the process
    #[clap(short, long)]
    pub tty: bool,
    /// Pass N additional file descriptors to the process
    #[clap(long, default_value = "0")]
    pub preserve_fds: i32,
    /// Identifier of the container
    #[clap(required = true)]
    pub container_id: String,
    /// Command to execute, when no process.json is given
    #[clap(last = true)]
    pub command: Vec<String>,
}

impl Exec {
    pub fn exec(&self, root_path: &Path) -> Result<i32> {
        let mut container = load_container(root_path, &self.container_id)?;
        let opts = ExecOpts {
            process: self.process.clone(),
            pid_file: self.pid_file.clone(),
            detach: self.detach,
            tty: self.tty,
            preserve_fds: self.preserve_fds,
            command: self.command.clone(),
        };
        container.exec(&opts)
    }
}
