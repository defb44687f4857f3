//! Mount table construction for the container root filesystem. Everything in
//! here runs in the container's mount namespace; the per-mount helpers assume
//! the current directory is the rootfs until the pivot happens.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use nix::errno::Errno;
use nix::mount::{mount as nix_mount, umount2, MntFlags, MsFlags};
use nix::sys::stat::{makedev, mknod, Mode, SFlag};
use nix::unistd;

use crate::spec::Mount;
use crate::utils;

/// Mount point where the old root is parked during pivot, relative to the new
/// root.
const OLD_ROOT: &str = ".runway-oldroot";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMountOptions {
    pub flags: MsFlags,
    pub propagation: MsFlags,
    pub has_propagation: bool,
    /// Set when both `bind` and `ro` appear. A bind mount ignores the
    /// read-only bit on the first pass, so it needs a remount follow-up.
    pub bind_readonly: bool,
    pub data: String,
}

impl Default for ParsedMountOptions {
    fn default() -> Self {
        Self {
            flags: MsFlags::empty(),
            propagation: MsFlags::empty(),
            has_propagation: false,
            bind_readonly: false,
            data: String::new(),
        }
    }
}

pub fn propagation_flag(name: &str) -> Option<MsFlags> {
    match name {
        "private" => Some(MsFlags::MS_PRIVATE),
        "rprivate" => Some(MsFlags::MS_PRIVATE | MsFlags::MS_REC),
        "shared" => Some(MsFlags::MS_SHARED),
        "rshared" => Some(MsFlags::MS_SHARED | MsFlags::MS_REC),
        "slave" => Some(MsFlags::MS_SLAVE),
        "rslave" => Some(MsFlags::MS_SLAVE | MsFlags::MS_REC),
        "unbindable" => Some(MsFlags::MS_UNBINDABLE),
        "runbindable" => Some(MsFlags::MS_UNBINDABLE | MsFlags::MS_REC),
        _ => None,
    }
}

pub fn apply_mount_propagation<P: AsRef<Path>>(path: P, name: &str) -> Result<()> {
    let path = path.as_ref();
    let flag = propagation_flag(name)
        .with_context(|| format!("unknown mount propagation mode: {}", name))?;
    nix_mount(None::<&str>, path, None::<&str>, flag, None::<&str>)
        .with_context(|| format!("failed to set {} propagation on {}", name, path.display()))?;
    Ok(())
}

pub fn parse_mount_options(options: &[String]) -> ParsedMountOptions {
    let mut parsed = ParsedMountOptions::default();
    let mut data: Vec<&str> = Vec::new();

    for opt in options {
        match opt.as_str() {
            "ro" => parsed.flags |= MsFlags::MS_RDONLY,
            "rw" => parsed.flags &= !MsFlags::MS_RDONLY,
            "nosuid" => parsed.flags |= MsFlags::MS_NOSUID,
            "nodev" => parsed.flags |= MsFlags::MS_NODEV,
            "noexec" => parsed.flags |= MsFlags::MS_NOEXEC,
            "relatime" => parsed.flags |= MsFlags::MS_RELATIME,
            "norelatime" => parsed.flags &= !MsFlags::MS_RELATIME,
            "strictatime" => parsed.flags |= MsFlags::MS_STRICTATIME,
            "nostrictatime" => parsed.flags &= !MsFlags::MS_STRICTATIME,
            "sync" => parsed.flags |= MsFlags::MS_SYNCHRONOUS,
            "dirsync" => parsed.flags |= MsFlags::MS_DIRSYNC,
            "remount" => parsed.flags |= MsFlags::MS_REMOUNT,
            "bind" => parsed.flags |= MsFlags::MS_BIND,
            "rbind" => parsed.flags |= MsFlags::MS_BIND | MsFlags::MS_REC,
            "recursive" => parsed.flags |= MsFlags::MS_REC,
            other => {
                if let Some(flag) = propagation_flag(other) {
                    parsed.propagation = flag;
                    parsed.has_propagation = true;
                } else {
                    data.push(other);
                }
            }
        }
    }

    parsed.data = data.join(",");
    if parsed.flags.contains(MsFlags::MS_BIND) && parsed.flags.contains(MsFlags::MS_RDONLY) {
        parsed.bind_readonly = true;
    }
    parsed
}

/// Binds the rootfs onto itself so it becomes a mount point the pivot can
/// operate on, then applies the requested propagation mode.
pub fn bind_rootfs(rootfs: &Path, rootfs_propagation: &str) -> Result<()> {
    nix_mount(
        Some(rootfs),
        rootfs,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .with_context(|| format!("failed to bind rootfs {}", rootfs.display()))?;

    if !rootfs_propagation.is_empty() {
        apply_mount_propagation(rootfs, rootfs_propagation)?;
    }
    Ok(())
}

fn target_in_rootfs(destination: &Path) -> PathBuf {
    match destination.strip_prefix("/") {
        Ok(relative) if !relative.as_os_str().is_empty() => relative.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Applies one OCI mount. The current directory must be the rootfs. Read-only
/// bind mounts take two passes because the kernel ignores MS_RDONLY on the
/// initial bind.
pub fn mount_into_rootfs(m: &Mount) -> Result<()> {
    let parsed = parse_mount_options(&m.options);
    let target = target_in_rootfs(&m.destination);
    log::debug!("mounting {} at {}", m.typ, m.destination.display());

    let source_is_file = !m.source.as_os_str().is_empty()
        && fs::metadata(&m.source).map(|meta| meta.is_file()).unwrap_or(false);
    if source_is_file {
        utils::ensure_file(&target, 0o644)?;
    } else {
        utils::ensure_directory(&target, 0o755)?;
    }

    let mut first_pass = parsed.flags & !MsFlags::MS_REMOUNT;
    if parsed.bind_readonly {
        first_pass &= !MsFlags::MS_RDONLY;
    }

    let source = if m.source.as_os_str().is_empty() {
        None
    } else {
        Some(m.source.as_path())
    };
    let fstype = if m.typ.is_empty() {
        None
    } else {
        Some(m.typ.as_str())
    };
    let data = if parsed.data.is_empty() {
        None
    } else {
        Some(parsed.data.as_str())
    };

    match nix_mount(source, &target, fstype, first_pass, data) {
        Ok(()) => {}
        // the engine may have pre-mounted the cgroup hierarchy
        Err(Errno::EBUSY) if m.typ == "cgroup" => {
            log::debug!("cgroup mount at {} already present", m.destination.display());
            return Ok(());
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to mount {}", m.destination.display()));
        }
    }

    if parsed.bind_readonly {
        nix_mount(
            None::<&str>,
            &target,
            None::<&str>,
            parsed.flags | MsFlags::MS_REMOUNT,
            None::<&str>,
        )
        .with_context(|| {
            format!("failed read-only remount of {}", m.destination.display())
        })?;
    } else if parsed.flags.contains(MsFlags::MS_REMOUNT) {
        nix_mount(
            None::<&str>,
            &target,
            None::<&str>,
            parsed.flags,
            None::<&str>,
        )
        .with_context(|| format!("failed to remount {}", m.destination.display()))?;
    }

    if parsed.has_propagation {
        nix_mount(
            None::<&str>,
            &target,
            None::<&str>,
            parsed.propagation,
            None::<&str>,
        )
        .with_context(|| {
            format!("failed to set propagation on {}", m.destination.display())
        })?;
    }

    Ok(())
}

/// Self-binds a path and remounts it read-only. Relative to the rootfs, which
/// is the current directory at this stage.
pub fn setup_readonly_path(path: &str) -> Result<()> {
    let target = target_in_rootfs(Path::new(path));
    if fs::symlink_metadata(&target).is_err()
        && utils::ensure_file(&target, 0o644).is_err()
    {
        utils::ensure_directory(&target, 0o755)?;
    }

    nix_mount(
        Some(&target),
        &target,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .with_context(|| format!("failed to bind readonly path {}", path))?;

    nix_mount(
        None::<&str>,
        &target,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY,
        None::<&str>,
    )
    .with_context(|| format!("failed read-only remount of {}", path))?;
    Ok(())
}

/// Shadows a path with a read-only empty tmpfs (directories) or a bind of
/// /dev/null (files). Runs after the pivot, so paths are container-absolute.
pub fn setup_masked_path(path: &str) -> Result<()> {
    let target = Path::new(path);
    if fs::symlink_metadata(target).is_err() {
        if path.ends_with('/') {
            utils::ensure_directory(target, 0o755)?;
        } else if utils::ensure_file(target, 0o644).is_err() {
            utils::ensure_directory(target, 0o755)?;
        }
    }

    let meta = fs::metadata(target)
        .with_context(|| format!("failed to stat masked path {}", path))?;
    if meta.is_dir() {
        nix_mount(
            Some("tmpfs"),
            target,
            Some("tmpfs"),
            MsFlags::MS_RDONLY,
            None::<&str>,
        )
        .with_context(|| format!("failed to mask directory {}", path))?;
    } else {
        nix_mount(
            Some("/dev/null"),
            target,
            None::<&str>,
            MsFlags::MS_BIND,
            None::<&str>,
        )
        .with_context(|| format!("failed to mask file {}", path))?;
    }
    Ok(())
}

/// Exchanges the mount namespace root for the current directory. The old root
/// is detached and its mount point removed.
pub fn pivot_rootfs() -> Result<()> {
    // make sure "." is a mount point distinct from its parent
    nix_mount(
        Some("."),
        ".",
        None::<&str>,
        MsFlags::MS_BIND,
        None::<&str>,
    )
    .context("failed to self-bind the new root")?;

    utils::ensure_directory(OLD_ROOT, 0o755)?;
    unistd::pivot_root(".", OLD_ROOT).context("pivot_root failed")?;
    unistd::chdir("/").context("failed to chdir into the new root")?;

    let parked = format!("/{}", OLD_ROOT);
    umount2(parked.as_str(), MntFlags::MNT_DETACH)
        .context("failed to detach the old root")?;
    if let Err(err) = fs::remove_dir(&parked) {
        log::warn!("failed to remove {}: {}", parked, err);
    }
    Ok(())
}

pub fn mount_proc() -> Result<()> {
    utils::ensure_directory("/proc", 0o555)?;
    nix_mount(
        Some("proc"),
        "/proc",
        Some("proc"),
        MsFlags::empty(),
        None::<&str>,
    )
    .context("failed to mount /proc")?;
    Ok(())
}

pub fn remount_root_readonly() -> Result<()> {
    nix_mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY,
        None::<&str>,
    )
    .context("failed to remount / read-only")?;
    Ok(())
}

/// The canonical device nodes every container gets.
const DEFAULT_DEVICES: [(&str, u64, u64); 6] = [
    ("/dev/null", 1, 3),
    ("/dev/zero", 1, 5),
    ("/dev/full", 1, 7),
    ("/dev/random", 1, 8),
    ("/dev/urandom", 1, 9),
    ("/dev/tty", 5, 0),
];

pub fn create_default_devices() -> Result<()> {
    utils::ensure_directory("/dev", 0o755)?;
    for (path, major, minor) in DEFAULT_DEVICES {
        match mknod(
            path,
            SFlag::S_IFCHR,
            Mode::from_bits_truncate(0o666),
            makedev(major, minor),
        ) {
            Ok(()) | Err(Errno::EEXIST) => {}
            Err(err) => return Err(err).with_context(|| format!("failed to mknod {}", path)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_bind_readonly_two_pass() {
        let parsed = parse_mount_options(&opts(&["bind", "ro"]));
        assert!(parsed.bind_readonly);
        assert!(parsed.flags.contains(MsFlags::MS_RDONLY));
        assert!(parsed.flags.contains(MsFlags::MS_BIND));
    }

    #[test]
    fn test_parse_rbind_sets_recursive() {
        let parsed = parse_mount_options(&opts(&["rbind"]));
        assert!(parsed.flags.contains(MsFlags::MS_BIND | MsFlags::MS_REC));
        assert!(!parsed.bind_readonly);
    }

    #[test]
    fn test_parse_propagation_tokens() {
        let parsed = parse_mount_options(&opts(&["shared"]));
        assert!(parsed.has_propagation);
        assert_eq!(parsed.propagation, MsFlags::MS_SHARED);

        let parsed = parse_mount_options(&opts(&["rslave"]));
        assert_eq!(parsed.propagation, MsFlags::MS_SLAVE | MsFlags::MS_REC);
    }

    #[test]
    fn test_parse_data_options_joined() {
        let parsed = parse_mount_options(&opts(&["nosuid", "size=64m", "mode=755", "gid"]));
        assert_eq!(parsed.data, "size=64m,mode=755,gid");
        assert!(parsed.flags.contains(MsFlags::MS_NOSUID));
    }

    #[test]
    fn test_parse_rw_clears_readonly() {
        let parsed = parse_mount_options(&opts(&["ro", "rw"]));
        assert!(!parsed.flags.contains(MsFlags::MS_RDONLY));
    }

    #[test]
    fn test_propagation_flag_unknown() {
        assert!(propagation_flag("bogus").is_none());
        assert!(apply_mount_propagation("/", "bogus").is_err());
    }

    #[test]
    fn test_target_in_rootfs() {
        assert_eq!(
            target_in_rootfs(Path::new("/proc/sys")),
            PathBuf::from("proc/sys")
        );
        assert_eq!(target_in_rootfs(Path::new("/")), PathBuf::from("."));
    }

    quickcheck! {
        fn prop_bind_and_ro_always_flag_two_pass(extra: Vec<String>) -> bool {
            let mut options = extra;
            options.push("bind".to_string());
            options.push("ro".to_string());
            let parsed = parse_mount_options(&options);
            parsed.bind_readonly && parsed.flags.contains(MsFlags::MS_RDONLY)
        }
    }
}
