#[cfg(test)]
#[macro_use]
extern crate quickcheck;

pub mod cgroups;
pub mod commands;
pub mod container;
pub mod events;
pub mod hooks;
pub mod logger;
pub mod namespaces;
pub mod pipe;
pub mod process;
pub mod rootfs;
pub mod rootpath;
pub mod signal;
pub mod spec;
pub mod tty;
pub mod utils;

/// Version reported in state documents and the `runway.version` annotation.
pub const RUNTIME_VERSION: &str = env!("CARGO_PKG_VERSION");
