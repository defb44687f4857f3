//! The container init process, from namespace entry to exec. Runs in the
//! forked child; every step builds on the side effects of the previous one,
//! so the order is fixed.

use std::env;
use std::fs;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use nix::fcntl;
use nix::unistd::{self, Gid, Uid};

use crate::namespaces::Namespaces;
use crate::pipe;
use crate::process::fork;
use crate::rootfs::mount as rootfs;
use crate::spec::{LinuxNamespaceType, Spec};
use crate::tty;
use crate::utils;

pub struct InitArgs {
    pub spec: Spec,
    pub rootfs: PathBuf,
    pub fifo_path: PathBuf,
    /// Used as the hostname when the bundle does not configure one.
    pub container_id: String,
    pub console_slave: Option<RawFd>,
    pub console_master: Option<RawFd>,
    pub no_pivot: bool,
    pub preserve_fds: i32,
}

pub fn container_init(args: InitArgs) -> Result<()> {
    // The parent owns the master end; this copy only leaks into the container.
    if let Some(master) = args.console_master {
        let _ = unistd::close(master);
    }

    let spec = &args.spec;
    let linux = spec.linux.clone().unwrap_or_default();
    let namespaces = Namespaces::from(linux.namespaces.as_slice());

    namespaces.join_existing()?;
    namespaces.unshare_new()?;

    if namespaces.creates_new(LinuxNamespaceType::Pid) {
        fork::fork_into_pid_namespace()?;
    }

    // Everything after this line runs only once `start` has signaled.
    pipe::await_start(&args.fifo_path)?;

    let hostname = if spec.hostname.is_empty() {
        &args.container_id
    } else {
        &spec.hostname
    };
    unistd::sethostname(hostname).context("failed to set hostname")?;

    rootfs::bind_rootfs(&args.rootfs, &linux.rootfs_propagation)?;
    unistd::chdir(&args.rootfs)
        .with_context(|| format!("failed to chdir into rootfs {}", args.rootfs.display()))?;

    for mount in &spec.mounts {
        rootfs::mount_into_rootfs(mount)?;
    }

    for path in &linux.readonly_paths {
        if let Err(err) = rootfs::setup_readonly_path(path) {
            log::warn!("could not make {} read-only: {:#}", path, err);
        }
    }

    enter_root_jail(args.no_pivot)?;

    if !linux.rootfs_propagation.is_empty() {
        rootfs::apply_mount_propagation("/", &linux.rootfs_propagation)?;
    }

    let cwd = if spec.process.cwd.is_empty() {
        "/"
    } else {
        &spec.process.cwd
    };
    unistd::chdir(Path::new(cwd)).with_context(|| format!("failed to chdir to {}", cwd))?;

    if let Err(err) = rootfs::mount_proc() {
        log::warn!("could not mount /proc: {:#}", err);
    }

    for path in &linux.masked_paths {
        if let Err(err) = rootfs::setup_masked_path(path) {
            log::warn!("could not mask {}: {:#}", path, err);
        }
    }

    if spec.root.readonly {
        rootfs::remount_root_readonly()?;
    }

    if spec.process.terminal {
        if let Some(slave) = args.console_slave {
            tty::setup_console(slave).context("failed to set up the console")?;
        }
    }

    if !spec.process.env.is_empty() {
        env::vars().for_each(|(key, _)| env::remove_var(key));
        for (key, value) in utils::parse_env(&spec.process.env) {
            env::set_var(key, value);
        }
    }

    rootfs::create_default_devices()?;

    set_credentials(spec)?;

    cleanup_file_descriptors(args.preserve_fds)?;

    utils::do_exec(&spec.process.args[0], &spec.process.args)?;
    bail!("exec returned");
}

/// Swaps the mount namespace root for the prepared rootfs. Without a pivot
/// (or when it fails) a plain chroot does the jailing.
fn enter_root_jail(no_pivot: bool) -> Result<()> {
    if !no_pivot {
        match rootfs::pivot_rootfs() {
            Ok(()) => return Ok(()),
            Err(err) => log::warn!("pivot_root failed, falling back to chroot: {:#}", err),
        }
    }
    unistd::chroot(".").context("chroot into rootfs failed")?;
    unistd::chdir("/").context("failed to chdir after chroot")?;
    Ok(())
}

fn set_credentials(spec: &Spec) -> Result<()> {
    let user = &spec.process.user;
    if !user.additional_gids.is_empty() {
        let gids: Vec<Gid> = user
            .additional_gids
            .iter()
            .map(|gid| Gid::from_raw(*gid))
            .collect();
        unistd::setgroups(&gids).context("failed to set supplementary groups")?;
    }
    if user.gid != 0 {
        unistd::setgid(Gid::from_raw(user.gid)).context("failed to set gid")?;
    }
    if user.uid != 0 {
        unistd::setuid(Uid::from_raw(user.uid)).context("failed to set uid")?;
    }
    Ok(())
}

fn open_fds() -> Result<Vec<RawFd>> {
    let fds = fs::read_dir("/proc/self/fd")
        .context("failed to list /proc/self/fd")?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter_map(|name| name.parse::<RawFd>().ok())
        .collect();
    Ok(fds)
}

/// Flags every fd beyond stdio plus the preserved range close-on-exec so
/// nothing from the runtime leaks past execvp.
pub fn cleanup_file_descriptors(preserve_fds: i32) -> Result<()> {
    let min_fd = preserve_fds + 3;
    for fd in open_fds()? {
        if fd >= min_fd {
            // already-closed descriptors race with the listing
            let _ = fcntl::fcntl(fd, fcntl::F_SETFD(fcntl::FdFlag::FD_CLOEXEC));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::stat::Mode;
    use serial_test::serial;
    use std::os::unix::io::AsRawFd;

    #[test]
    #[serial]
    fn test_open_fds_sees_new_fd() -> Result<()> {
        let file = fs::File::open("/dev/null")?;
        let fds = open_fds()?;
        assert!(fds.contains(&file.as_raw_fd()));
        assert!(fds.contains(&0));
        Ok(())
    }

    #[test]
    #[serial]
    fn test_cleanup_flags_unpreserved_fds() -> Result<()> {
        let fd = fcntl::open("/dev/null", fcntl::OFlag::O_RDWR, Mode::empty())?;
        cleanup_file_descriptors(fd - 3)?;
        let flags = fcntl::fcntl(fd, fcntl::F_GETFD)?;
        assert_ne!(flags & fcntl::FdFlag::FD_CLOEXEC.bits(), 0);
        unistd::close(fd)?;
        Ok(())
    }
}
