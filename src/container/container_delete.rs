use std::fs;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};

use super::{Container, CGROUP_PATH_ANNOTATION};
use crate::cgroups;
use crate::hooks;
use crate::pipe;

const KILL_WAIT: Duration = Duration::from_secs(10);

impl Container {
    /// Removes every trace of the container: state file, sync pipe, events
    /// log, state directory and cgroup. A live container is only torn down
    /// when `force` is set.
    pub fn delete(&mut self, force: bool) -> Result<()> {
        log::debug!("deleting container {}", self.id());
        self.refresh_status()?;

        let alive = self
            .pid()
            .map(|pid| kill(pid, None).is_ok())
            .unwrap_or(false);
        if alive {
            if !force {
                bail!(
                    "{} is still running; kill it first or delete with force",
                    self.id()
                );
            }
            self.kill_and_reap()?;
            self.mark_stopped()?;
        }

        // poststop gets a best-effort run; a missing bundle or failing hook
        // must not block the teardown
        match self.spec() {
            Ok(spec) => {
                let hooks_config = spec.hooks_or_default();
                if let Err(err) =
                    hooks::run_hook_sequence(&hooks_config.poststop, &mut self.state, "poststop")
                {
                    log::warn!("poststop hooks failed for {}: {:#}", self.id(), err);
                }
            }
            Err(err) => log::debug!("skipping poststop hooks for {}: {:#}", self.id(), err),
        }

        let _ = fs::remove_file(self.root.join(pipe::SYNC_FIFO));
        let _ = fs::remove_file(self.root.join("events.log"));
        let _ = fs::remove_file(self.root.join("state.json"));
        fs::remove_dir_all(&self.root).or_else(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                Ok(())
            } else {
                Err(err)
            }
        })?;

        let cgroup_path = self
            .state
            .annotations
            .get(CGROUP_PATH_ANNOTATION)
            .cloned()
            .unwrap_or_else(|| cgroups::relative_cgroup_path("", self.id()));
        if let Err(err) = cgroups::remove(&cgroup_path) {
            log::warn!("failed to remove cgroup {}: {:#}", cgroup_path, err);
        }

        log::debug!("container {} deleted", self.id());
        Ok(())
    }

    /// SIGKILLs the init process and waits for it to vanish. The process is
    /// usually not this invocation's child, so reaping falls back to polling.
    fn kill_and_reap(&self) -> Result<()> {
        let pid = match self.pid() {
            Some(pid) => pid,
            None => return Ok(()),
        };

        match kill(pid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(err) => return Err(err.into()),
        }

        let deadline = Instant::now() + KILL_WAIT;
        loop {
            match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
                // reaped by us
                Ok(WaitStatus::StillAlive) => {}
                Ok(_) => return Ok(()),
                // not our child; watch for it to disappear instead
                Err(Errno::ECHILD) => {
                    if kill(pid, None).is_err() {
                        return Ok(());
                    }
                }
                Err(err) => return Err(err.into()),
            }

            if Instant::now() >= deadline {
                bail!("init process {} survived SIGKILL", pid);
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ContainerStatus, State};
    use crate::utils::create_temp_dir;
    use std::process::Command;

    #[test]
    fn test_delete_removes_state_directory() -> Result<()> {
        let tmp = create_temp_dir("delete_stopped")?;
        let dir = tmp.join("demo");
        std::fs::create_dir_all(&dir)?;
        State::new("demo", ContainerStatus::Stopped, -1, ".", "1.0.2").save(&dir)?;
        std::fs::write(dir.join("events.log"), "{}\n")?;

        let mut container = Container::load(dir.clone())?;
        container.delete(false)?;
        assert!(!dir.exists());
        Ok(())
    }

    #[test]
    fn test_delete_refuses_live_container_without_force() -> Result<()> {
        let tmp = create_temp_dir("delete_live")?;
        let dir = tmp.join("demo");
        std::fs::create_dir_all(&dir)?;

        let child = Command::new("sleep").arg("30").spawn()?;
        let pid = child.id() as i32;
        State::new("demo", ContainerStatus::Running, pid, ".", "1.0.2").save(&dir)?;

        let mut container = Container::load(dir.clone())?;
        assert!(container.delete(false).is_err());
        assert!(dir.exists());

        // force tears it down
        let mut container = Container::load(dir.clone())?;
        container.delete(true)?;
        assert!(!dir.exists());
        Ok(())
    }
}
