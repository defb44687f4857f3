//! Resolution of the runtime state root, where per-container directories live.

use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use nix::unistd::geteuid;

use crate::utils;

/// The preferred state root for the current user. Root gets `/run/runway`;
/// other users get a directory under `XDG_RUNTIME_DIR` when it is set, and
/// a per-euid tmp directory otherwise.
pub fn default_state_root() -> PathBuf {
    if geteuid().is_root() {
        return PathBuf::from("/run/runway");
    }

    match env::var("XDG_RUNTIME_DIR") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir).join("runway"),
        _ => fallback_state_root(),
    }
}

pub fn fallback_state_root() -> PathBuf {
    PathBuf::from(format!("/tmp/runway-{}", geteuid()))
}

/// Resolves and creates the state root. An explicit `--root` wins; otherwise
/// the preferred root is used, degrading to the tmp fallback for unprivileged
/// users whose preferred location cannot be created.
pub fn resolve(cli_root: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(root) = cli_root {
        utils::ensure_directory(&root, 0o755)?;
        return fs::canonicalize(&root)
            .with_context(|| format!("failed to canonicalize {}", root.display()));
    }

    let preferred = default_state_root();
    match utils::ensure_directory(&preferred, 0o755) {
        Ok(()) => Ok(preferred),
        Err(err) => {
            if !geteuid().is_root() {
                let fallback = fallback_state_root();
                if fallback != preferred {
                    log::debug!(
                        "unable to use preferred state root {}: {:#}",
                        preferred.display(),
                        err
                    );
                    utils::ensure_directory(&fallback, 0o755).with_context(|| {
                        format!("failed to create state root {}", fallback.display())
                    })?;
                    log::debug!("falling back to state root {}", fallback.display());
                    return Ok(fallback);
                }
            }
            Err(err)
        }
    }
}
