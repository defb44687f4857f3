use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use nix::unistd::Pid;
use procfs::process::{ProcState, Process};

use crate::container::{ContainerStatus, State};
use crate::spec::Spec;

#[derive(Debug)]
pub struct Container {
    pub state: State,
    /// The per-container state directory, `<state root>/<id>`.
    pub root: PathBuf,
}

impl Container {
    pub fn load(container_root: PathBuf) -> Result<Self> {
        let state = State::load(&container_root)?;
        Ok(Self {
            state,
            root: container_root,
        })
    }

    pub fn save(&self) -> Result<()> {
        log::debug!("saving container state {:?} in {:?}", self.state.status, self.root);
        self.state.save(&self.root)
    }

    pub fn id(&self) -> &str {
        &self.state.id
    }

    pub fn status(&self) -> ContainerStatus {
        self.state.status
    }

    pub fn bundle(&self) -> &str {
        &self.state.bundle
    }

    pub fn pid(&self) -> Option<Pid> {
        if self.state.pid > 0 {
            Some(Pid::from_raw(self.state.pid))
        } else {
            None
        }
    }

    /// The state root holding all containers.
    pub fn state_root(&self) -> &Path {
        self.root.parent().unwrap_or(&self.root)
    }

    pub fn spec(&self) -> Result<Spec> {
        Spec::load(Path::new(&self.state.bundle))
            .with_context(|| format!("failed to reload bundle config for {}", self.id()))
    }

    pub fn can_start(&self) -> bool {
        self.state.status.can_start()
    }

    pub fn can_kill(&self) -> bool {
        self.state.status.can_kill()
    }

    pub fn can_pause(&self) -> bool {
        self.state.status.can_pause()
    }

    pub fn can_resume(&self) -> bool {
        self.state.status.can_resume()
    }

    /// Reconciles the recorded status with the actual liveness of the init
    /// process and persists the result when it changed.
    pub fn refresh_status(&mut self) -> Result<()> {
        let new_status = match self.pid() {
            Some(pid) => match Process::new(pid.as_raw()) {
                Ok(proc) => match proc.stat().and_then(|stat| stat.state()) {
                    Ok(ProcState::Zombie) | Ok(ProcState::Dead) => ContainerStatus::Stopped,
                    Ok(_) => match self.status() {
                        ContainerStatus::Creating
                        | ContainerStatus::Created
                        | ContainerStatus::Paused => self.status(),
                        _ => ContainerStatus::Running,
                    },
                    Err(_) => ContainerStatus::Stopped,
                },
                Err(_) => ContainerStatus::Stopped,
            },
            None => match self.status() {
                ContainerStatus::Creating => ContainerStatus::Creating,
                _ => ContainerStatus::Stopped,
            },
        };

        if new_status != self.status() {
            self.state.status = new_status;
            if new_status == ContainerStatus::Stopped {
                self.state.pid = -1;
            }
            self.save()?;
        }
        Ok(())
    }

    /// Marks the container stopped. The pid is dropped so a stopped record
    /// never points at a live process, and an unconsumed sync pipe goes away
    /// with it.
    pub(crate) fn mark_stopped(&mut self) -> Result<()> {
        self.state.status = ContainerStatus::Stopped;
        self.state.pid = -1;
        let _ = std::fs::remove_file(self.root.join(crate::pipe::SYNC_FIFO));
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::create_temp_dir;

    #[test]
    fn test_load_missing_container() {
        assert!(Container::load(PathBuf::from("/nonexistent/container")).is_err());
    }

    #[test]
    fn test_refresh_marks_dead_pid_stopped() -> Result<()> {
        let tmp = create_temp_dir("refresh_dead_pid")?;
        // a pid far beyond pid_max never names a live process
        let state = State::new("gone", ContainerStatus::Running, i32::MAX - 1, ".", "1.0.2");
        state.save(&tmp)?;

        let mut container = Container::load(tmp.path().to_path_buf())?;
        container.refresh_status()?;
        assert_eq!(container.status(), ContainerStatus::Stopped);
        assert!(container.pid().is_none());

        let reloaded = Container::load(tmp.path().to_path_buf())?;
        assert_eq!(reloaded.status(), ContainerStatus::Stopped);
        Ok(())
    }

    #[test]
    fn test_refresh_keeps_live_created() -> Result<()> {
        let tmp = create_temp_dir("refresh_live_created")?;
        let me = std::process::id() as i32;
        let state = State::new("live", ContainerStatus::Created, me, ".", "1.0.2");
        state.save(&tmp)?;

        let mut container = Container::load(tmp.path().to_path_buf())?;
        container.refresh_status()?;
        assert_eq!(container.status(), ContainerStatus::Created);
        Ok(())
    }
}
