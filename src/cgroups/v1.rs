//! The legacy split hierarchies, one directory tree per controller.

use std::path::{Path, PathBuf};

use anyhow::Result;
use nix::unistd::Pid;

use super::{remove_cgroup_dir, write_cgroup_file, CGROUP_ROOT};
use crate::utils;

const CGROUP_PROCS: &str = "cgroup.procs";
const MEMORY_LIMIT: &str = "memory.limit_in_bytes";
const CPU_SHARES: &str = "cpu.shares";

fn controller_path(controller: &str, relative: &str) -> PathBuf {
    Path::new(CGROUP_ROOT).join(controller).join(relative)
}

pub fn setup(pid: Pid, relative: &str, memory_limit: i64, cpu_shares: u64) -> Result<()> {
    if memory_limit > 0 {
        let memory = controller_path("memory", relative);
        utils::ensure_directory(&memory, 0o755)?;
        write_cgroup_file(memory.join(MEMORY_LIMIT), &memory_limit.to_string())?;
        write_cgroup_file(memory.join(CGROUP_PROCS), &pid.to_string())?;
    }

    if cpu_shares > 0 {
        let cpu = controller_path("cpu", relative);
        utils::ensure_directory(&cpu, 0o755)?;
        write_cgroup_file(cpu.join(CPU_SHARES), &cpu_shares.to_string())?;
        write_cgroup_file(cpu.join(CGROUP_PROCS), &pid.to_string())?;
    }

    Ok(())
}

pub fn remove(relative: &str) -> Result<()> {
    remove_cgroup_dir(&controller_path("memory", relative))?;
    remove_cgroup_dir(&controller_path("cpu", relative))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_paths() {
        assert_eq!(
            controller_path("memory", "my_runtime/demo"),
            PathBuf::from("/sys/fs/cgroup/memory/my_runtime/demo")
        );
    }
}
