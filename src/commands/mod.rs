//! The command surface. Each subcommand owns its clap definition and a thin
//! `exec` that drives the container engine.

pub mod create;
pub mod delete;
pub mod events;
pub mod exec;
pub mod features;
pub mod kill;
pub mod pause;
pub mod ps;
pub mod resume;
pub mod run;
pub mod start;
pub mod state;

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::container::Container;

pub(crate) fn load_container<P: AsRef<Path>>(root_path: P, container_id: &str) -> Result<Container> {
    let root_path = fs::canonicalize(&root_path)
        .with_context(|| format!("failed to canonicalize {}", root_path.as_ref().display()))?;
    let container_root = root_path.join(container_id);
    if !container_root.exists() {
        bail!("{} does not exist", container_id)
    }

    Container::load(container_root)
        .with_context(|| format!("could not load state for container {}", container_id))
}
