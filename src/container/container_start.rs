use std::time::Duration;

use anyhow::{bail, Context, Result};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};

use super::{Container, ContainerStatus};
use crate::events;
use crate::hooks;
use crate::pipe;

const ATTACH_POLL_INTERVAL: Duration = Duration::from_millis(100);

impl Container {
    /// Releases the init process blocked on the sync pipe. Pre-start hooks run
    /// before the signal; `poststart` runs after. With `attach` the call
    /// lingers until the init process exits.
    pub fn start(&mut self, attach: bool) -> Result<()> {
        self.refresh_status()?;
        if !self.can_start() {
            bail!(
                "{} could not be started because it was {}",
                self.id(),
                self.status()
            );
        }

        let hooks_config = self.spec()?.hooks_or_default();
        hooks::run_hook_sequence(&hooks_config.prestart, &mut self.state, "prestart")?;
        hooks::run_hook_sequence(&hooks_config.start_container, &mut self.state, "startContainer")?;
        self.save()?;

        let fifo = self.root.join(pipe::SYNC_FIFO);
        pipe::signal_start(&fifo).context("failed to signal the sync pipe")?;
        // consumed by this start; a second start must not find it
        let _ = std::fs::remove_file(&fifo);

        self.state.status = ContainerStatus::Running;
        self.save()?;
        events::record_state_event(self.state_root(), &self.state);
        log::debug!("container {} started", self.id());

        if let Err(err) =
            hooks::run_hook_sequence(&hooks_config.poststart, &mut self.state, "poststart")
        {
            let root = self.state_root().to_path_buf();
            events::record_error_event(&root, self.id(), "hook", &format!("{:#}", err));
            if let Some(pid) = self.pid() {
                let _ = kill(pid, Signal::SIGKILL);
            }
            self.mark_stopped()?;
            return Err(err);
        }
        self.save()?;

        if attach {
            self.wait_for_exit()?;
        }
        Ok(())
    }

    /// Polls the init process until it disappears, then records the stop.
    fn wait_for_exit(&mut self) -> Result<()> {
        let pid = self.pid().context("no init pid recorded")?;
        loop {
            match kill(pid, None) {
                Ok(()) => std::thread::sleep(ATTACH_POLL_INTERVAL),
                Err(Errno::ESRCH) => break,
                Err(err) => return Err(err).context("failed to poll the init process"),
            }
        }

        log::debug!("container {} has exited", self.id());
        self.mark_stopped()?;
        events::record_state_event(self.state_root(), &self.state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::State;
    use crate::utils::create_temp_dir;

    #[test]
    fn test_start_requires_created_status() -> Result<()> {
        let tmp = create_temp_dir("start_wrong_state")?;
        let dir = tmp.join("demo");
        std::fs::create_dir_all(&dir)?;
        State::new("demo", ContainerStatus::Running, 1, ".", "1.0.2").save(&dir)?;

        let mut container = Container::load(dir)?;
        let err = container.start(false).unwrap_err();
        assert!(err.to_string().contains("could not be started"));
        Ok(())
    }
}
