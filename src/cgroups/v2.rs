//! The unified hierarchy. Controllers live in one tree and have to be enabled
//! through the root's `cgroup.subtree_control` before limits can be written.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use nix::unistd::Pid;

use super::{remove_cgroup_dir, write_cgroup_file, CGROUP_ROOT};
use crate::utils;

const CGROUP_CONTROLLERS: &str = "cgroup.controllers";
const CGROUP_SUBTREE_CONTROL: &str = "cgroup.subtree_control";
const CGROUP_PROCS: &str = "cgroup.procs";
const MEMORY_MAX: &str = "memory.max";
const CPU_WEIGHT: &str = "cpu.weight";

/// Translates v1 cpu shares (2..=262144, default 1024) into the v2 weight
/// range (1..=10000). The mapping is monotonic and hits both endpoints.
pub fn cpu_shares_to_weight(shares: u64) -> u64 {
    if shares == 0 {
        return 100;
    }
    if shares < 2 {
        return 1;
    }
    let shares = shares.min(262_144);
    1 + (shares - 2) * 9999 / 262_142
}

fn available_controllers(root: &Path) -> Result<HashSet<String>> {
    let path = root.join(CGROUP_CONTROLLERS);
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(contents.split_whitespace().map(str::to_string).collect())
}

pub fn setup(pid: Pid, relative: &str, memory_limit: i64, cpu_shares: u64) -> Result<()> {
    let root = Path::new(CGROUP_ROOT);
    let available = available_controllers(root)?;

    let mut required: Vec<&str> = Vec::new();
    if memory_limit > 0 {
        required.push("memory");
    }
    if cpu_shares > 0 {
        required.push("cpu");
    }

    for controller in &required {
        if !available.contains(*controller) {
            bail!("{} controller not available in the unified hierarchy", controller);
        }
        write_cgroup_file(
            root.join(CGROUP_SUBTREE_CONTROL),
            &format!("+{}", controller),
        )?;
    }

    let unified: PathBuf = root.join(relative);
    utils::ensure_directory(&unified, 0o755)?;

    if memory_limit > 0 {
        write_cgroup_file(unified.join(MEMORY_MAX), &memory_limit.to_string())?;
    }
    if cpu_shares > 0 {
        let weight = cpu_shares_to_weight(cpu_shares);
        write_cgroup_file(unified.join(CPU_WEIGHT), &weight.to_string())?;
    }

    write_cgroup_file(unified.join(CGROUP_PROCS), &pid.to_string())?;
    Ok(())
}

pub fn remove(relative: &str) -> Result<()> {
    remove_cgroup_dir(&Path::new(CGROUP_ROOT).join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_endpoints() {
        assert_eq!(cpu_shares_to_weight(0), 100);
        assert_eq!(cpu_shares_to_weight(1), 1);
        assert_eq!(cpu_shares_to_weight(2), 1);
        assert_eq!(cpu_shares_to_weight(262_144), 10_000);
        // clamped beyond the v1 maximum
        assert_eq!(cpu_shares_to_weight(1 << 40), 10_000);
    }

    #[test]
    fn test_weight_default_shares() {
        let weight = cpu_shares_to_weight(1024);
        assert!(weight >= 1 && weight <= 100);
    }

    quickcheck! {
        fn prop_weight_monotonic(a: u64, b: u64) -> bool {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            if lo == 0 {
                // zero maps to the default weight, outside the ordered range
                true
            } else {
                cpu_shares_to_weight(lo) <= cpu_shares_to_weight(hi)
            }
        }

        fn prop_weight_in_range(shares: u64) -> bool {
            let weight = cpu_shares_to_weight(shares);
            (1..=10_000).contains(&weight)
        }
    }
}
