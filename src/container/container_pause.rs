use anyhow::{bail, Result};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};

use super::{Container, ContainerStatus};
use crate::events;
use crate::process::collect_process_tree;

impl Container {
    /// Stops every process in the container's tree with SIGSTOP. A failure on
    /// any live process aborts the transition and leaves the state untouched.
    pub fn pause(&mut self) -> Result<()> {
        self.refresh_status()?;
        if !self.can_pause() {
            bail!(
                "{} could not be paused because it was {}",
                self.id(),
                self.status()
            );
        }

        if let Err(err) = self.signal_tree(Signal::SIGSTOP) {
            let root = self.state_root().to_path_buf();
            events::record_error_event(&root, self.id(), "pause", &format!("{:#}", err));
            return Err(err);
        }

        self.state.status = ContainerStatus::Paused;
        self.save()?;
        events::record_state_event(self.state_root(), &self.state);
        log::debug!("container {} paused", self.id());
        Ok(())
    }

    /// Sends `signal` to the whole process tree, tolerating processes that
    /// exit mid-walk.
    pub(super) fn signal_tree(&self, signal: Signal) -> Result<()> {
        let pid = match self.pid() {
            Some(pid) => pid,
            None => bail!("no init pid recorded for {}", self.id()),
        };

        for process in collect_process_tree(pid) {
            match kill(process, signal) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(err) => {
                    bail!("failed to send {} to pid {}: {}", signal, process, err)
                }
            }
        }
        Ok(())
    }
}
