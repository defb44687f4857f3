use anyhow::Result;
use clap::Parser;
use serde_json::json;

use crate::RUNTIME_VERSION;

/// Print the features supported by this runtime as JSON
#[derive(Parser, Debug)]
pub struct Features {}

impl Features {
    pub fn exec(&self) -> Result<()> {
        let features = json!({
            "ociVersionMin": "1.0.0",
            "ociVersionMax": "1.0.2",
            "hooks": [
                "createRuntime",
                "createContainer",
                "startContainer",
                "prestart",
                "poststart",
                "poststop",
            ],
            "mountOptions": [
                "bind", "rbind", "ro", "rw", "nosuid", "nodev", "noexec",
                "relatime", "norelatime", "strictatime", "nostrictatime",
                "sync", "dirsync", "remount", "recursive",
                "private", "rprivate", "shared", "rshared",
                "slave", "rslave", "unbindable", "runbindable",
            ],
            "linux": {
                "namespaces": ["cgroup", "ipc", "mount", "network", "pid", "user", "uts"],
                "cgroup": { "v1": true, "v2": true, "systemd": false },
            },
            "annotations": {
                "runway.version": RUNTIME_VERSION,
            },
        });
        println!("{}", serde_json::to_string_pretty(&features)?);
        Ok(())
    }
}
