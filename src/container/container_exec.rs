//! Running an additional process inside an existing container by joining its
//! namespaces through `/proc/<pid>/ns/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use nix::errno::Errno;
use nix::fcntl::{open, OFlag};
use nix::sched::{setns, CloneFlags};
use nix::sys::stat::Mode;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{self, isatty, Pid};

use super::{Container, ContainerStatus};
use crate::process::fork;
use crate::spec::{LinuxNamespaceType, Process};
use crate::utils;

#[derive(Debug, Clone, Default)]
pub struct ExecOpts {
    /// Path to a `process.json` describing what to run; beats `command`.
    pub process: Option<PathBuf>,
    pub pid_file: Option<PathBuf>,
    pub detach: bool,
    pub tty: bool,
    pub preserve_fds: i32,
    pub command: Vec<String>,
}

impl Container {
    /// Enters the container's namespaces and executes a process there.
    /// Returns the process exit code, or 0 immediately when detached.
    pub fn exec(&mut self, opts: &ExecOpts) -> Result<i32> {
        self.refresh_status()?;
        if !matches!(
            self.status(),
            ContainerStatus::Running | ContainerStatus::Created
        ) {
            bail!(
                "cannot exec in {} because it is {}",
                self.id(),
                self.status()
            );
        }
        let init_pid = self.pid().context("no init pid recorded")?;

        let process = self.exec_process(opts)?;
        if process.args.is_empty() {
            bail!("no command to execute");
        }

        // the pid file must be created on the host side before the mount
        // namespace switch changes what its path resolves to
        let mut pid_file = match &opts.pid_file {
            Some(path) => Some(
                fs::File::create(path)
                    .with_context(|| format!("failed to create pid file {}", path.display()))?,
            ),
            None => None,
        };

        let spec = self.spec()?;
        let namespaces = spec
            .linux
            .map(|linux| linux.namespaces)
            .unwrap_or_default();
        join_namespaces(init_pid, namespaces.iter().map(|ns| ns.typ))?;

        let preserve_fds = opts.preserve_fds;
        let tty = opts.tty || process.terminal;
        let child = fork::fork_container(move || run_exec_process(&process, tty, preserve_fds))?;

        if let Some(file) = pid_file.as_mut() {
            use std::io::Write;
            write!(file, "{}", child).context("failed to write the pid file")?;
        }

        if opts.detach {
            return Ok(0);
        }

        match waitpid(child, None)? {
            WaitStatus::Exited(_, code) => Ok(code),
            WaitStatus::Signaled(_, signal, _) => Ok(128 + signal as i32),
            status => bail!("unexpected wait status {:?}", status),
        }
    }

    fn exec_process(&self, opts: &ExecOpts) -> Result<Process> {
        if let Some(path) = &opts.process {
            let file = fs::File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            let process: Process =
                serde_json::from_reader(&file).context("malformed process document")?;
            return Ok(process);
        }

        Ok(Process {
            terminal: opts.tty,
            args: opts.command.clone(),
            env: Vec::new(),
            cwd: "/".to_string(),
            user: Default::default(),
        })
    }
}

/// Joins the given namespace types of `pid`. The user namespace goes first so
/// the rest are joined with the container's credentials; mount goes last
/// because it changes what `/proc` means.
fn join_namespaces<I: Iterator<Item = LinuxNamespaceType>>(pid: Pid, types: I) -> Result<()> {
    let mut ordered: Vec<LinuxNamespaceType> = types.collect();
    ordered.sort_by_key(|typ| match typ {
        LinuxNamespaceType::User => 0,
        LinuxNamespaceType::Mount => 2,
        _ => 1,
    });
    ordered.dedup();

    for typ in ordered {
        let path = format!("/proc/{}/ns/{}", pid, typ.proc_name());
        let fd = open(
            Path::new(&path),
            OFlag::O_RDONLY | OFlag::O_CLOEXEC,
            Mode::empty(),
        )
        .with_context(|| format!("failed to open {}", path))?;

        let res = setns(fd, CloneFlags::from_bits_truncate(typ as i32));
        let _ = unistd::close(fd);
        match res {
            Ok(()) => {}
            // joining the namespace we are already in is not possible; skip it
            Err(Errno::EINVAL) => {
                log::warn!("could not join {:?} namespace of {}", typ, pid);
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to join {:?} namespace", typ))
            }
        }
    }
    Ok(())
}

fn run_exec_process(process: &Process, tty: bool, preserve_fds: i32) -> Result<()> {
    if tty {
        let _ = unistd::setsid();
        if isatty(0).unwrap_or(false)
            && unsafe { libc::ioctl(0, libc::TIOCSCTTY, 0) } < 0
        {
            log::warn!("could not take the controlling terminal");
        }
    }

    if !process.cwd.is_empty() {
        unistd::chdir(Path::new(&process.cwd))
            .with_context(|| format!("failed to chdir to {}", process.cwd))?;
    }

    for (key, value) in utils::parse_env(&process.env) {
        std::env::set_var(key, value);
    }

    crate::process::init::cleanup_file_descriptors(preserve_fds)?;
    utils::do_exec(&process.args[0], &process.args)?;
    bail!("exec returned");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::State;
    use crate::utils::create_temp_dir;

    #[test]
    fn test_exec_refused_on_stopped_container() -> Result<()> {
        let tmp = create_temp_dir("exec_stopped")?;
        let dir = tmp.join("demo");
        std::fs::create_dir_all(&dir)?;
        State::new("demo", ContainerStatus::Stopped, -1, ".", "1.0.2").save(&dir)?;

        let mut container = Container::load(dir)?;
        let opts = ExecOpts {
            command: vec!["/bin/true".to_string()],
            ..Default::default()
        };
        assert!(container.exec(&opts).is_err());
        Ok(())
    }

    #[test]
    fn test_process_document_wins_over_command() -> Result<()> {
        let tmp = create_temp_dir("exec_process_json")?;
        let dir = tmp.join("demo");
        std::fs::create_dir_all(&dir)?;
        State::new("demo", ContainerStatus::Running, 1, ".", "1.0.2").save(&dir)?;

        let process_path = tmp.join("process.json");
        std::fs::write(
            &process_path,
            r#"{"args": ["/bin/date"], "cwd": "/tmp", "terminal": false}"#,
        )?;

        let container = Container::load(dir)?;
        let opts = ExecOpts {
            process: Some(process_path),
            command: vec!["/bin/ignored".to_string()],
            ..Default::default()
        };
        let process = container.exec_process(&opts)?;
        assert_eq!(process.args, vec!["/bin/date".to_string()]);
        assert_eq!(process.cwd, "/tmp");
        Ok(())
    }
}
