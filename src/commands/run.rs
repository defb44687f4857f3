use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use nix::sys::wait::{waitpid, WaitStatus};

use crate::commands::load_container;
use crate::container::{create_container, CreateOpts};

/// Create a container and immediately start it, waiting for it to exit
#[derive(Parser, Debug)]
pub struct Run {
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
    /// Pass N additional file descriptors to the container
    #[clap(long, default_value = "0")]
    pub preserve_fds: i32,
    /// Name of the container instance
    #[clap(required = true)]
    pub container_id: String,
}

impl Run {
    /// Returns the container's exit code, mapping a signal death to 128+n.
    pub fn exec(&self, root_path: &Path) -> Result<i32> {
        let opts = CreateOpts {
            id: self.container_id.clone(),
            bundle: self.bundle.clone(),
            pid_file: self.pid_file.clone(),
            console_socket: self.console_socket.clone(),
            no_pivot: self.no_pivot,
            preserve_fds: self.preserve_fds,
        };
        let init_pid = create_container(root_path, &opts)?;

        let mut container = load_container(root_path, &self.container_id)?;
        container.start(false)?;

        // the init process is this invocation's direct child
        let exit_code = match waitpid(init_pid, None)
            .context("failed to wait for the container process")?
        {
            WaitStatus::Exited(_, code) => code,
            WaitStatus::Signaled(_, signal, _) => 128 + signal as i32,
            status => bail!("unexpected wait status {:?}", status),
        };

        let mut container = load_container(root_path, &self.container_id)?;
        container.delete(false)?;

        Ok(exit_code)
    }
}
