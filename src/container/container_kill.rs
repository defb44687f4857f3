use anyhow::{bail, Context, Result};
use nix::sys::signal::{self, Signal};
use serde_json::json;

use super::Container;
use crate::events;

impl Container {
    /// Sends `signal` to the init process. For the terminating signals the
    /// container is marked stopped right away; the init may live in a child
    /// PID namespace this process cannot reap, so no waitpid happens here.
    pub fn kill(&mut self, signal: Signal) -> Result<()> {
        self.refresh_status()?;
        if !self.can_kill() {
            bail!(
                "{} could not be killed because it was {}",
                self.id(),
                self.status()
            );
        }

        let pid = self.pid().context("no init pid recorded")?;
        log::debug!("sending {} to {} (pid {})", signal, self.id(), pid);
        signal::kill(pid, signal)
            .with_context(|| format!("failed to signal container {}", self.id()))?;

        events::record_event(
            self.state_root(),
            self.id(),
            "signal",
            Some(json!({ "signal": signal.to_string(), "pid": pid.as_raw() })),
        );

        if matches!(signal, Signal::SIGKILL | Signal::SIGTERM) {
            self.mark_stopped()?;
            events::record_state_event(self.state_root(), &self.state);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ContainerStatus, State};
    use crate::utils::create_temp_dir;
    use nix::sys::wait::waitpid;
    use nix::unistd::Pid;
    use std::process::Command;

    #[test]
    fn test_kill_stopped_container_is_refused() -> Result<()> {
        let tmp = create_temp_dir("kill_stopped")?;
        let dir = tmp.join("demo");
        std::fs::create_dir_all(&dir)?;
        State::new("demo", ContainerStatus::Stopped, -1, ".", "1.0.2").save(&dir)?;

        let mut container = Container::load(dir)?;
        assert!(container.kill(Signal::SIGTERM).is_err());
        Ok(())
    }

    #[test]
    fn test_sigterm_marks_stopped_without_reaping() -> Result<()> {
        let tmp = create_temp_dir("kill_sigterm")?;
        let dir = tmp.join("demo");
        std::fs::create_dir_all(&dir)?;

        let child = Command::new("sleep").arg("30").spawn()?;
        let pid = child.id() as i32;
        State::new("demo", ContainerStatus::Running, pid, ".", "1.0.2").save(&dir)?;

        let mut container = Container::load(dir.clone())?;
        container.kill(Signal::SIGTERM)?;
        assert_eq!(container.status(), ContainerStatus::Stopped);
        assert!(container.pid().is_none());

        let reloaded = Container::load(dir)?;
        assert_eq!(reloaded.status(), ContainerStatus::Stopped);

        // the journal saw the signal before the state flip
        let log = std::fs::read_to_string(tmp.join("demo").join("events.log"))?;
        let types: Vec<String> = log
            .lines()
            .map(|line| {
                serde_json::from_str::<serde_json::Value>(line).unwrap()["type"]
                    .as_str()
                    .unwrap()
                    .to_string()
            })
            .collect();
        assert_eq!(types, vec!["signal", "state"]);

        let _ = waitpid(Pid::from_raw(pid), None);
        Ok(())
    }
}
