//! Host-side process helpers shared by the lifecycle engine and the hook
//! dispatcher.

pub mod fork;
pub mod init;

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::time::{Duration, Instant};

use anyhow::Result;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

/// Signals that a process did not finish within its allowed time and has been
/// killed.
#[derive(Debug)]
pub struct TimeoutError(pub Pid);

impl std::error::Error for TimeoutError {}

impl fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "process {} timed out and was killed", self.0)
    }
}

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Waits for `pid` to exit. With `timeout_secs <= 0` this is a plain blocking
/// wait; otherwise the child is polled and killed with SIGKILL once the
/// deadline passes, in which case a [`TimeoutError`] is returned.
pub fn wait_for_process(pid: Pid, timeout_secs: i64) -> Result<WaitStatus> {
    if timeout_secs <= 0 {
        return Ok(waitpid(pid, None)?);
    }

    let deadline = Instant::now() + Duration::from_secs(timeout_secs as u64);
    loop {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG))? {
            WaitStatus::StillAlive => {}
            status => return Ok(status),
        }

        if Instant::now() >= deadline {
            let _ = kill(pid, Signal::SIGKILL);
            let _ = waitpid(pid, None);
            return Err(TimeoutError(pid).into());
        }

        std::thread::sleep(WAIT_POLL_INTERVAL);
    }
}

/// Collects `root_pid` and all of its descendants by walking the kernel's
/// children lists breadth first. Processes that disappear mid-walk simply
/// contribute nothing.
pub fn collect_process_tree(root_pid: Pid) -> Vec<Pid> {
    let mut result = Vec::new();
    if root_pid.as_raw() <= 0 {
        return result;
    }

    let mut visited: HashSet<i32> = HashSet::new();
    let mut queue = std::collections::VecDeque::new();
    visited.insert(root_pid.as_raw());
    queue.push_back(root_pid.as_raw());

    while let Some(current) = queue.pop_front() {
        result.push(Pid::from_raw(current));

        let children_path = format!("/proc/{}/task/{}/children", current, current);
        let contents = match fs::read_to_string(&children_path) {
            Ok(contents) => contents,
            Err(_) => continue,
        };

        for token in contents.split_whitespace() {
            if let Ok(child) = token.parse::<i32>() {
                if child > 0 && visited.insert(child) {
                    queue.push_back(child);
                }
            }
        }
    }

    result
}
