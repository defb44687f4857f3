use anyhow::{bail, Result};
use nix::sys::signal::Signal;

use super::{Container, ContainerStatus};
use crate::events;

impl Container {
    /// Continues a paused container by sending SIGCONT across the tree.
    pub fn resume(&mut self) -> Result<()> {
        self.refresh_status()?;
        if !self.can_resume() {
            bail!(
                "{} could not be resumed because it was {}",
                self.id(),
                self.status()
            );
        }

        if let Err(err) = self.signal_tree(Signal::SIGCONT) {
            let root = self.state_root().to_path_buf();
            events::record_error_event(&root, self.id(), "resume", &format!("{:#}", err));
            return Err(err);
        }

        self.state.status = ContainerStatus::Running;
        self.save()?;
        events::record_state_event(self.state_root(), &self.state);
        log::debug!("container {} resumed", self.id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::State;
    use crate::utils::create_temp_dir;
    use anyhow::Result;
    use nix::sys::signal::kill;
    use nix::sys::wait::waitpid;
    use nix::unistd::Pid;
    use std::process::Command;

    #[test]
    fn test_pause_then_resume_round_trip() -> Result<()> {
        let tmp = create_temp_dir("pause_resume")?;
        let dir = tmp.join("demo");
        std::fs::create_dir_all(&dir)?;

        let child = Command::new("sleep").arg("30").spawn()?;
        let pid = child.id() as i32;
        State::new("demo", ContainerStatus::Running, pid, ".", "1.0.2").save(&dir)?;

        let mut container = Container::load(dir)?;
        container.pause()?;
        assert_eq!(container.status(), ContainerStatus::Paused);

        container.resume()?;
        assert_eq!(container.status(), ContainerStatus::Running);

        let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
        let _ = waitpid(Pid::from_raw(pid), None);
        Ok(())
    }

    #[test]
    fn test_resume_requires_paused() -> Result<()> {
        let tmp = create_temp_dir("resume_wrong_state")?;
        let dir = tmp.join("demo");
        std::fs::create_dir_all(&dir)?;
        State::new("demo", ContainerStatus::Stopped, -1, ".", "1.0.2").save(&dir)?;

        let mut container = Container::load(dir)?;
        assert!(container.resume().is_err());
        Ok(())
    }
}
