//! The `events` surface: replaying the journal and sampling live resource
//! statistics from procfs.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use nix::sys::signal::kill;
use nix::unistd::Pid;
use procfs::process::Process;
use serde_json::json;

use super::Container;
use crate::events::{events_file_path, iso8601_now};
use crate::process::collect_process_tree;

const FOLLOW_POLL_INTERVAL: Duration = Duration::from_millis(100);

impl Container {
    /// Streams the container's events. Without flags the recorded journal is
    /// replayed once; `follow` tails it until the init process exits; `stats`
    /// switches to sampling resource usage every `interval_ms` instead.
    pub fn events(&mut self, follow: bool, stats: bool, interval_ms: u64) -> Result<()> {
        self.refresh_status()?;

        if stats {
            return self.stream_stats(interval_ms);
        }

        let path = events_file_path(self.state_root(), self.id());
        let mut offset = 0u64;
        if path.exists() {
            offset = replay_from(&path, offset)?;
        }

        if follow {
            let pid = self.pid();
            loop {
                if path.exists() {
                    offset = replay_from(&path, offset)?;
                }
                match pid {
                    Some(pid) if kill(pid, None).is_ok() => {
                        std::thread::sleep(FOLLOW_POLL_INTERVAL)
                    }
                    _ => break,
                }
            }
            // pick up anything written while the container was going down
            if path.exists() {
                replay_from(&path, offset)?;
            }
        }
        Ok(())
    }

    fn stream_stats(&self, interval_ms: u64) -> Result<()> {
        let pid = match self.pid() {
            Some(pid) => pid,
            None => bail!("{} is not running", self.id()),
        };
        let interval = Duration::from_millis(interval_ms.max(1));

        while kill(pid, None).is_ok() {
            match sample_stats(pid) {
                Ok(stats) => {
                    let event = json!({
                        "timestamp": iso8601_now(),
                        "type": "stats",
                        "id": self.id(),
                        "data": stats,
                    });
                    println!("{}", event);
                }
                // the process can vanish between the liveness check and the read
                Err(err) => {
                    log::debug!("stats sample failed: {:#}", err);
                    break;
                }
            }
            std::thread::sleep(interval);
        }
        Ok(())
    }
}

/// One resource usage sample for the process tree rooted at `pid`. CPU time
/// comes from utime+stime scaled by the clock tick, memory from VmRSS.
fn sample_stats(pid: Pid) -> Result<serde_json::Value> {
    let proc = Process::new(pid.as_raw()).context("init process is gone")?;
    let stat = proc.stat().context("failed to read process stat")?;
    let ticks_per_second = procfs::ticks_per_second().context("failed to read clock tick")? as u64;
    let total_ticks = stat.utime + stat.stime;
    let cpu_total_ns = total_ticks.saturating_mul(1_000_000_000 / ticks_per_second.max(1));

    let status = proc.status().context("failed to read process status")?;
    let rss_bytes = status.vmrss.unwrap_or(0).saturating_mul(1024);

    let pids_current = collect_process_tree(pid).len();

    Ok(json!({
        "cpu": { "usage": { "total": cpu_total_ns } },
        "memory": { "usage": { "rss": rss_bytes } },
        "pids": { "current": pids_current },
    }))
}

/// Prints journal lines starting at `offset`; returns the new offset. Only
/// complete lines are consumed so a mid-write append is never split.
fn replay_from(path: &std::path::Path, offset: u64) -> Result<u64> {
    let mut file = File::open(path)
        .with_context(|| format!("failed to open events log {}", path.display()))?;
    file.seek(SeekFrom::Start(offset))?;

    let mut reader = BufReader::new(file);
    let mut consumed = offset;
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line)?;
        if n == 0 || !line.ends_with('\n') {
            break;
        }
        print!("{}", line);
        consumed += n as u64;
    }
    Ok(consumed)
}
