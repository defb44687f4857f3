use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize, Serializer};

use crate::RUNTIME_VERSION;

const STATE_FILE: &str = "state.json";

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Creating,
    Created,
    Running,
    Paused,
    Stopped,
}

impl ContainerStatus {
    pub fn can_start(&self) -> bool {
        matches!(self, ContainerStatus::Created)
    }

    pub fn can_kill(&self) -> bool {
        matches!(self, ContainerStatus::Created | ContainerStatus::Running)
    }

    pub fn can_pause(&self) -> bool {
        matches!(self, ContainerStatus::Running)
    }

    pub fn can_resume(&self) -> bool {
        matches!(self, ContainerStatus::Paused)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContainerStatus::Creating => "creating",
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Paused => "paused",
            ContainerStatus::Stopped => "stopped",
        };
        name.fmt(f)
    }
}

// The on-disk schema never carries a negative pid; the in-memory sentinel is
// normalized on serialization.
fn serialize_pid<S: Serializer>(pid: &i32, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i32((*pid).max(0))
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct State {
    pub version: String,
    #[serde(rename = "ociVersion")]
    pub oci_version: String,
    pub id: String,
    pub status: ContainerStatus,
    #[serde(serialize_with = "serialize_pid")]
    pub pid: i32,
    #[serde(alias = "bundle_path")]
    pub bundle: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,
}

impl State {
    pub fn new(id: &str, status: ContainerStatus, pid: i32, bundle: &str, oci_version: &str) -> Self {
        let oci_version = if oci_version.is_empty() {
            RUNTIME_VERSION.to_string()
        } else {
            oci_version.to_string()
        };
        Self {
            version: RUNTIME_VERSION.to_string(),
            oci_version,
            id: id.to_string(),
            status,
            pid,
            bundle: bundle.to_string(),
            annotations: HashMap::new(),
        }
    }

    pub fn save(&self, container_root: &Path) -> Result<()> {
        let path = container_root.join(STATE_FILE);
        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("failed to open state file {}", path.display()))?;
        serde_json::to_writer_pretty(&file, self).context("failed to serialize state")?;
        Ok(())
    }

    pub fn load(container_root: &Path) -> Result<Self> {
        let path = container_root.join(STATE_FILE);
        let file = fs::File::open(&path)
            .with_context(|| format!("failed to open state file {}", path.display()))?;
        let mut state: Self =
            serde_json::from_reader(&file).context("failed to parse state file")?;
        if state.version.is_empty() {
            state.version = state.oci_version.clone();
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::create_temp_dir;

    fn sample(pid: i32) -> State {
        let mut state = State::new("demo", ContainerStatus::Running, pid, "/bundle", "1.0.2");
        state
            .annotations
            .insert("runway.cgroupPath".to_string(), "my_runtime/demo".to_string());
        state
    }

    #[test]
    fn test_round_trip() -> Result<()> {
        let tmp = create_temp_dir("state_round_trip")?;
        let state = sample(42);
        state.save(&tmp)?;
        let loaded = State::load(&tmp)?;
        assert_eq!(loaded, state);
        Ok(())
    }

    #[test]
    fn test_negative_pid_normalized_on_save() -> Result<()> {
        let tmp = create_temp_dir("state_negative_pid")?;
        let state = sample(-1);
        state.save(&tmp)?;
        let loaded = State::load(&tmp)?;
        assert_eq!(loaded.pid, 0);
        Ok(())
    }

    #[test]
    fn test_legacy_bundle_key_accepted() -> Result<()> {
        let tmp = create_temp_dir("state_legacy_bundle")?;
        std::fs::write(
            tmp.join(STATE_FILE),
            r#"{
                "version": "0.1.0",
                "ociVersion": "1.0.2",
                "id": "old",
                "status": "stopped",
                "pid": 0,
                "bundle_path": "/old/bundle"
            }"#,
        )?;
        let loaded = State::load(&tmp)?;
        assert_eq!(loaded.bundle, "/old/bundle");
        assert_eq!(loaded.status, ContainerStatus::Stopped);
        Ok(())
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_value(sample(1)).unwrap();
        assert_eq!(json["status"], "running");
    }

    #[test]
    fn test_status_predicates() {
        assert!(ContainerStatus::Created.can_start());
        assert!(!ContainerStatus::Running.can_start());
        assert!(ContainerStatus::Created.can_kill());
        assert!(ContainerStatus::Running.can_kill());
        assert!(!ContainerStatus::Stopped.can_kill());
        assert!(!ContainerStatus::Creating.can_kill());
        assert!(ContainerStatus::Running.can_pause());
        assert!(ContainerStatus::Paused.can_resume());
    }

    #[test]
    fn test_empty_oci_version_defaults_to_runtime() {
        let state = State::new("demo", ContainerStatus::Creating, 0, ".", "");
        assert_eq!(state.oci_version, crate::RUNTIME_VERSION);
    }
}
