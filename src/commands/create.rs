//! Handles the creation of a new container
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;

use crate::container::{create_container, CreateOpts};

/// Create a container from an OCI bundle
#[derive(Parser, Debug)]
pub struct Create {
    /// Path to the bundle directory, containing config.json and root filesystem
    #[clap(short, long, default_value = ".")]
    pub bundle: PathBuf,
    /// Unix socket (file) path which will receive the master end of the
    /// container's pseudoterminal
    #[clap(short, long)]
    pub console_socket: Option<PathBuf>,
    /// File to write the pid of the created container to
    #[clap(short, long)]
    pub pid_file: Option<PathBuf>,
    /// Do not use pivot_root to jail the process inside the rootfs
    #[clap(long)]
    pub no_pivot: bool,
    /// Accepted for engine compatibility; start readiness is signaled through
    /// the sync pipe
    #[clap(long)]
    pub notify_socket: Option<PathBuf>,
    /// Pass N additional file descriptors to the container
    #[clap(long, default_value = "0")]
    pub preserve_fds: i32,
    /// Name of the container instance
    #[clap(required = true)]
    pub container_id: String,
}

impl Create {
    pub fn exec(&self, root_path: &Path) -> Result<()> {
        if self.notify_socket.is_some() {
            log::debug!("ignoring --notify-socket; not supported");
        }

        let opts = CreateOpts {
            id: self.container_id.clone(),
            bundle: self.bundle.clone(),
            pid_file: self.pid_file.clone(),
            console_socket: self.console_socket.clone(),
            no_pivot: self.no_pivot,
            preserve_fds: self.preserve_fds,
        };
        let pid = create_container(root_path, &opts)?;
        log::debug!("container {} created with pid {}", self.container_id, pid);
        Ok(())
    }
}
