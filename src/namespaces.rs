//! Namespace entry for the container init process. Namespaces with a `path`
//! are joined via `setns`; the rest are created with a single `unshare`.

use anyhow::{Context, Result};
use nix::fcntl::{self, OFlag};
use nix::sched::{self, CloneFlags};
use nix::sys::stat::Mode;
use nix::unistd;

use crate::spec::{LinuxNamespace, LinuxNamespaceType};

pub struct Namespaces {
    spaces: Vec<LinuxNamespace>,
    pub clone_flags: CloneFlags,
}

impl From<&[LinuxNamespace]> for Namespaces {
    fn from(namespaces: &[LinuxNamespace]) -> Self {
        let clone_flags = namespaces
            .iter()
            .filter(|ns| ns.path.is_none())
            .fold(CloneFlags::empty(), |mut cf, ns| {
                cf |= CloneFlags::from_bits_truncate(ns.typ as i32);
                cf
            });

        Namespaces {
            spaces: namespaces.to_vec(),
            clone_flags,
        }
    }
}

impl Namespaces {
    /// Joins every namespace that names an existing one, closing each fd after
    /// the `setns`.
    pub fn join_existing(&self) -> Result<()> {
        for ns in self.spaces.iter().filter(|ns| ns.path.is_some()) {
            let path = ns.path.as_ref().expect("filtered on path");
            let flag = CloneFlags::from_bits_truncate(ns.typ as i32);
            let fd = fcntl::open(path, OFlag::O_RDONLY | OFlag::O_CLOEXEC, Mode::empty())
                .with_context(|| {
                    format!("failed to open namespace path {}", path.display())
                })?;
            let res = sched::setns(fd, flag)
                .with_context(|| format!("failed to join {:?} namespace", ns.typ));
            let _ = unistd::close(fd);
            res?;
        }
        Ok(())
    }

    /// Creates all requested new namespaces in one call.
    pub fn unshare_new(&self) -> Result<()> {
        if self.clone_flags.is_empty() {
            return Ok(());
        }
        sched::unshare(self.clone_flags).context("failed to unshare namespaces")?;
        Ok(())
    }

    /// True when a new namespace of the given type was requested.
    pub fn creates_new(&self, typ: LinuxNamespaceType) -> bool {
        self.clone_flags
            .contains(CloneFlags::from_bits_truncate(typ as i32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<LinuxNamespace> {
        vec![
            LinuxNamespace {
                typ: LinuxNamespaceType::Pid,
                path: None,
            },
            LinuxNamespace {
                typ: LinuxNamespaceType::Uts,
                path: None,
            },
            LinuxNamespace {
                typ: LinuxNamespaceType::Network,
                path: Some("/var/run/netns/db".into()),
            },
        ]
    }

    #[test]
    fn test_clone_flags_cover_only_new_namespaces() {
        let namespaces = Namespaces::from(sample().as_slice());
        assert_eq!(
            namespaces.clone_flags,
            CloneFlags::CLONE_NEWPID | CloneFlags::CLONE_NEWUTS
        );
    }

    #[test]
    fn test_creates_new() {
        let namespaces = Namespaces::from(sample().as_slice());
        assert!(namespaces.creates_new(LinuxNamespaceType::Pid));
        assert!(!namespaces.creates_new(LinuxNamespaceType::Network));
        assert!(!namespaces.creates_new(LinuxNamespaceType::User));
    }
}
