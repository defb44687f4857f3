//! The subset of the OCI runtime configuration this runtime honors. Unknown
//! keys in `config.json` are ignored.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub uid: u32,
    #[serde(default)]
    pub gid: u32,
    #[serde(default)]
    pub additional_gids: Vec<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Process {
    #[serde(default)]
    pub terminal: bool,
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default = "default_cwd")]
    pub cwd: String,
    #[serde(default)]
    pub user: User,
}

fn default_cwd() -> String {
    "/".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Root {
    pub path: PathBuf,
    #[serde(default)]
    pub readonly: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Mount {
    pub destination: PathBuf,
    #[serde(default, rename = "type")]
    pub typ: String,
    #[serde(default)]
    pub source: PathBuf,
    #[serde(default)]
    pub options: Vec<String>,
}

// Discriminants match the corresponding CLONE_* bits so the namespace type can
// be converted into clone flags directly.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LinuxNamespaceType {
    Mount = 0x0002_0000,
    Cgroup = 0x0200_0000,
    Uts = 0x0400_0000,
    Ipc = 0x0800_0000,
    User = 0x1000_0000,
    Pid = 0x2000_0000,
    Network = 0x4000_0000,
}

impl LinuxNamespaceType {
    /// Name of the corresponding entry under `/proc/<pid>/ns/`.
    pub fn proc_name(&self) -> &'static str {
        match self {
            LinuxNamespaceType::Mount => "mnt",
            LinuxNamespaceType::Cgroup => "cgroup",
            LinuxNamespaceType::Uts => "uts",
            LinuxNamespaceType::Ipc => "ipc",
            LinuxNamespaceType::User => "user",
            LinuxNamespaceType::Pid => "pid",
            LinuxNamespaceType::Network => "net",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LinuxNamespace {
    #[serde(rename = "type")]
    pub typ: LinuxNamespaceType,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LinuxIdMapping {
    #[serde(default, rename = "hostID")]
    pub host_id: u32,
    #[serde(default, rename = "containerID")]
    pub container_id: u32,
    #[serde(default)]
    pub size: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LinuxMemory {
    pub limit: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LinuxCpu {
    pub shares: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LinuxResources {
    pub memory: Option<LinuxMemory>,
    pub cpu: Option<LinuxCpu>,
}

impl LinuxResources {
    pub fn memory_limit(&self) -> i64 {
        self.memory.as_ref().and_then(|m| m.limit).unwrap_or(0)
    }

    pub fn cpu_shares(&self) -> u64 {
        self.cpu.as_ref().and_then(|c| c.shares).unwrap_or(0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Linux {
    #[serde(default)]
    pub namespaces: Vec<LinuxNamespace>,
    pub resources: Option<LinuxResources>,
    #[serde(default)]
    pub uid_mappings: Vec<LinuxIdMapping>,
    #[serde(default)]
    pub gid_mappings: Vec<LinuxIdMapping>,
    #[serde(default)]
    pub masked_paths: Vec<String>,
    #[serde(default)]
    pub readonly_paths: Vec<String>,
    #[serde(default)]
    pub rootfs_propagation: String,
    #[serde(default)]
    pub cgroups_path: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Hook {
    #[serde(default)]
    pub path: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<String>,
    /// Seconds the hook may run for; zero means no bound.
    #[serde(default)]
    pub timeout: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Hooks {
    #[serde(default)]
    pub create_runtime: Vec<Hook>,
    #[serde(default)]
    pub create_container: Vec<Hook>,
    #[serde(default)]
    pub start_container: Vec<Hook>,
    #[serde(default)]
    pub prestart: Vec<Hook>,
    #[serde(default)]
    pub poststart: Vec<Hook>,
    #[serde(default)]
    pub poststop: Vec<Hook>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Spec {
    #[serde(default, rename = "ociVersion")]
    pub version: String,
    pub process: Process,
    pub root: Root,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub mounts: Vec<Mount>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    pub linux: Option<Linux>,
    pub hooks: Option<Hooks>,
}

impl Spec {
    /// Loads and validates `config.json` from a bundle directory.
    pub fn load(bundle: &Path) -> Result<Self> {
        let config_path = bundle.join("config.json");
        let file = File::open(&config_path)
            .with_context(|| format!("failed to open {}", config_path.display()))?;
        let spec: Spec = serde_json::from_reader(&file)
            .with_context(|| format!("malformed {}", config_path.display()))?;

        if spec.process.args.is_empty() {
            bail!("process.args must not be empty");
        }

        Ok(spec)
    }

    /// Absolute path of the root filesystem, resolving a relative `root.path`
    /// against the bundle directory.
    pub fn rootfs_path(&self, bundle: &Path) -> PathBuf {
        if self.root.path.is_absolute() {
            self.root.path.clone()
        } else {
            bundle.join(&self.root.path)
        }
    }

    pub fn hooks_or_default(&self) -> Hooks {
        self.hooks.clone().unwrap_or_default()
    }
}
