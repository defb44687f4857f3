//! Cgroup management for container resource limits, covering both the v1
//! split hierarchies and the v2 unified hierarchy. The mode is picked by the
//! presence of `cgroup.controllers` at the cgroup root.

pub mod v1;
pub mod v2;

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use nix::unistd::Pid;

use crate::spec::Linux;

pub const CGROUP_ROOT: &str = "/sys/fs/cgroup";

pub fn is_cgroup_v2() -> bool {
    Path::new(CGROUP_ROOT).join("cgroup.controllers").exists()
}

/// Derives the container's cgroup path relative to the hierarchy root. A
/// configured `cgroupsPath` is used with surrounding slashes stripped;
/// otherwise the container gets `my_runtime/<id>`.
pub fn relative_cgroup_path(cgroups_path: &str, id: &str) -> String {
    let trimmed = cgroups_path.trim_matches('/');
    if trimmed.is_empty() {
        format!("my_runtime/{}", id)
    } else {
        trimmed.to_string()
    }
}

/// Writes a value into an existing cgroup control file.
pub fn write_cgroup_file<P: AsRef<Path>>(path: P, data: &str) -> Result<()> {
    let path = path.as_ref();
    OpenOptions::new()
        .create(false)
        .write(true)
        .open(path)
        .and_then(|mut file| file.write_all(data.as_bytes()))
        .with_context(|| format!("failed to write {} to {}", data, path.display()))?;
    Ok(())
}

/// Creates the container's cgroup, applies the configured limits and moves
/// `pid` in. Returns the relative cgroup path for persistence.
pub fn setup(pid: Pid, id: &str, linux: Option<&Linux>) -> Result<String> {
    let (cgroups_path, memory_limit, cpu_shares) = match linux {
        Some(linux) => {
            let resources = linux.resources.clone().unwrap_or_default();
            (
                linux.cgroups_path.clone(),
                resources.memory_limit(),
                resources.cpu_shares(),
            )
        }
        None => (String::new(), 0, 0),
    };

    let relative = relative_cgroup_path(&cgroups_path, id);
    log::debug!("setting up cgroup {} for container {}", relative, id);

    if is_cgroup_v2() {
        v2::setup(pid, &relative, memory_limit, cpu_shares)?;
    } else {
        v1::setup(pid, &relative, memory_limit, cpu_shares)?;
    }

    Ok(relative)
}

/// Removes the container's cgroup directories. A missing directory is fine;
/// any other failure is surfaced for the caller to log.
pub fn remove(relative: &str) -> Result<()> {
    if is_cgroup_v2() {
        v2::remove(relative)
    } else {
        v1::remove(relative)
    }
}

pub(crate) fn remove_cgroup_dir(path: &Path) -> Result<()> {
    match std::fs::remove_dir(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => {
            Err(err).with_context(|| format!("failed to remove cgroup {}", path.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path_from_config() {
        assert_eq!(
            relative_cgroup_path("/machine/demo/", "demo"),
            "machine/demo"
        );
        assert_eq!(relative_cgroup_path("machine/demo", "demo"), "machine/demo");
    }

    #[test]
    fn test_relative_path_default() {
        assert_eq!(relative_cgroup_path("", "demo"), "my_runtime/demo");
        assert_eq!(relative_cgroup_path("//", "demo"), "my_runtime/demo");
    }

    #[test]
    fn test_remove_missing_cgroup_is_benign() {
        assert!(remove_cgroup_dir(Path::new("/nonexistent/cgroup/dir")).is_ok());
    }
}
