//! Container creation: state directory, journal, hooks, sync pipe, fork,
//! id mappings, console hand-off, cgroups, and the `created` record. Any
//! failure between the first side effect and the final save is rolled back so
//! nothing of the container survives on disk or in the cgroup tree.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::cgroups;
use crate::container::{ContainerStatus, State, CGROUP_PATH_ANNOTATION, VERSION_ANNOTATION};
use crate::events;
use crate::hooks;
use crate::namespaces::Namespaces;
use crate::pipe;
use crate::process::{fork, init, wait_for_process};
use crate::spec::{LinuxNamespaceType, Spec};
use crate::tty::{self, ConsolePair};
use crate::utils;
use crate::RUNTIME_VERSION;

#[derive(Debug, Clone)]
pub struct CreateOpts {
    pub id: String,
    pub bundle: PathBuf,
    pub pid_file: Option<PathBuf>,
    pub console_socket: Option<PathBuf>,
    pub no_pivot: bool,
    pub preserve_fds: i32,
}

/// Tracks every side effect of an in-flight create so a failure at any step
/// can undo all of them. `commit` disarms the guard once the container state
/// is durable.
struct CleanupGuard<'a> {
    root: &'a Path,
    id: &'a str,
    phase: &'static str,
    pid: Option<Pid>,
    fifo: Option<PathBuf>,
    cgroup: Option<String>,
    console: Option<ConsolePair>,
    armed: bool,
}

impl<'a> CleanupGuard<'a> {
    fn new(root: &'a Path, id: &'a str) -> Self {
        Self {
            root,
            id,
            phase: "config",
            pid: None,
            fifo: None,
            cgroup: None,
            console: None,
            armed: true,
        }
    }

    fn phase(&mut self, phase: &'static str) {
        self.phase = phase;
    }

    fn commit(&mut self) -> Option<ConsolePair> {
        self.armed = false;
        self.console.take()
    }

    fn cleanup(&mut self, message: &str) {
        if let Some(pid) = self.pid.take() {
            let _ = kill(pid, Signal::SIGKILL);
            let _ = wait_for_process(pid, 0);
        }

        if let Some(mut console) = self.console.take() {
            console.close();
        }

        events::record_error_event(self.root, self.id, self.phase, message);

        if let Some(cgroup) = self.cgroup.take() {
            if let Err(err) = cgroups::remove(&cgroup) {
                log::warn!("failed to remove cgroup {}: {:#}", cgroup, err);
            }
        }

        if let Some(fifo) = self.fifo.take() {
            let _ = fs::remove_file(fifo);
        }

        let container_dir = self.root.join(self.id);
        let _ = fs::remove_file(container_dir.join("state.json"));
        let _ = fs::remove_file(container_dir.join("events.log"));
        let _ = fs::remove_dir(container_dir);
    }
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.cleanup("create aborted");
        }
    }
}

/// Creates the container and leaves it in the `created` state, blocked on the
/// sync pipe. Returns the init pid.
pub fn create_container(root: &Path, opts: &CreateOpts) -> Result<Pid> {
    let container_dir = root.join(&opts.id);
    if container_dir.join("state.json").exists() {
        bail!("container {} already exists", opts.id);
    }

    let mut guard = CleanupGuard::new(root, &opts.id);
    let result = run_create(root, opts, &mut guard);
    match result {
        Ok(pid) => {
            if let Some(mut console) = guard.commit() {
                console.close();
            }
            Ok(pid)
        }
        Err(err) => {
            guard.cleanup(&format!("{:#}", err));
            guard.armed = false;
            Err(err)
        }
    }
}

fn run_create(root: &Path, opts: &CreateOpts, guard: &mut CleanupGuard) -> Result<Pid> {
    let bundle = fs::canonicalize(&opts.bundle)
        .with_context(|| format!("failed to resolve bundle {}", opts.bundle.display()))?;

    guard.phase("config");
    let spec = Spec::load(&bundle)?;
    let linux = spec.linux.clone().unwrap_or_default();

    guard.phase("state");
    utils::ensure_directory(&container_dir(root, &opts.id), 0o755)?;
    let mut state = State::new(
        &opts.id,
        ContainerStatus::Creating,
        0,
        &bundle.to_string_lossy(),
        &spec.version,
    );
    state.annotations.extend(spec.annotations.clone());
    state
        .annotations
        .insert(VERSION_ANNOTATION.to_string(), RUNTIME_VERSION.to_string());
    state.save(&container_dir(root, &opts.id))?;
    events::record_state_event(root, &state);

    guard.phase("hook");
    let hooks_config = spec.hooks_or_default();
    hooks::run_hook_sequence(&hooks_config.create_runtime, &mut state, "createRuntime")?;

    guard.phase("fifo");
    let fifo = pipe::fifo_path(root, &opts.id);
    pipe::create(&fifo)?;
    guard.fifo = Some(fifo.clone());

    guard.phase("console");
    if spec.process.terminal && opts.console_socket.is_some() {
        guard.console = Some(tty::allocate_console_pair()?);
    }

    guard.phase("config");
    let rootfs = fs::canonicalize(spec.rootfs_path(&bundle))
        .context("failed to resolve the rootfs path")?;

    if let Err(err) = prctl::set_dumpable(false) {
        log::warn!("failed to clear the dumpable flag: errno {}", err);
    }

    guard.phase("fork");
    let init_args = init::InitArgs {
        spec: spec.clone(),
        rootfs,
        fifo_path: fifo,
        container_id: opts.id.clone(),
        console_slave: guard.console.as_ref().map(|pair| pair.slave),
        console_master: guard.console.as_ref().map(|pair| pair.master),
        no_pivot: opts.no_pivot,
        preserve_fds: opts.preserve_fds,
    };
    let pid = fork::fork_container(move || init::container_init(init_args))?;
    guard.pid = Some(pid);
    log::debug!("container init pid is {}", pid);

    guard.phase("mapping");
    let namespaces = Namespaces::from(linux.namespaces.as_slice());
    if namespaces.creates_new(LinuxNamespaceType::User) {
        write_id_mappings(pid, &linux.uid_mappings, &linux.gid_mappings)?;
    }

    guard.phase("console");
    if let Some(pair) = guard.console.as_mut() {
        pair.close_slave();
        let socket = opts
            .console_socket
            .as_ref()
            .expect("console pair implies a socket path");
        tty::send_console_fd(pair, socket)?;
        pair.close_master();
    }

    guard.phase("cgroup");
    let cgroup_path = cgroups::setup(pid, &opts.id, spec.linux.as_ref())?;
    guard.cgroup = Some(cgroup_path.clone());
    state
        .annotations
        .insert(CGROUP_PATH_ANNOTATION.to_string(), cgroup_path);

    guard.phase("hook");
    hooks::run_hook_sequence(&hooks_config.create_container, &mut state, "createContainer")?;

    guard.phase("state");
    if let Some(pid_file) = &opts.pid_file {
        fs::write(pid_file, pid.to_string()).context("failed to write the pid file")?;
    }

    state.status = ContainerStatus::Created;
    state.pid = pid.as_raw();
    state.save(&container_dir(root, &opts.id))?;
    events::record_state_event(root, &state);

    Ok(pid)
}

fn container_dir(root: &Path, id: &str) -> PathBuf {
    root.join(id)
}

/// Writes the uid/gid maps of a freshly unshared user namespace. The child's
/// `unshare` races this write, so permission errors are retried briefly; the
/// child does not rely on the mappings until after the sync-pipe read.
fn write_id_mappings(
    pid: Pid,
    uid_mappings: &[crate::spec::LinuxIdMapping],
    gid_mappings: &[crate::spec::LinuxIdMapping],
) -> Result<()> {
    if uid_mappings.is_empty() && gid_mappings.is_empty() {
        return Ok(());
    }

    let proc_dir = PathBuf::from(format!("/proc/{}", pid));
    if !gid_mappings.is_empty() {
        write_map_file(&proc_dir.join("setgroups"), "deny\n")?;
    }
    if !uid_mappings.is_empty() {
        write_map_file(&proc_dir.join("uid_map"), &format_id_mappings(uid_mappings))?;
    }
    if !gid_mappings.is_empty() {
        write_map_file(&proc_dir.join("gid_map"), &format_id_mappings(gid_mappings))?;
    }
    Ok(())
}

fn format_id_mappings(mappings: &[crate::spec::LinuxIdMapping]) -> String {
    mappings
        .iter()
        .map(|m| format!("{} {} {}\n", m.container_id, m.host_id, m.size))
        .collect()
}

fn write_map_file(path: &Path, contents: &str) -> Result<()> {
    let deadline = Instant::now() + Duration::from_millis(500);
    loop {
        match fs::write(path, contents) {
            Ok(()) => return Ok(()),
            Err(err) => {
                let retryable = matches!(
                    err.raw_os_error().map(Errno::from_i32),
                    Some(Errno::EPERM) | Some(Errno::EINVAL) | Some(Errno::EACCES)
                );
                if !retryable || Instant::now() >= deadline {
                    return Err(err)
                        .with_context(|| format!("failed to write {}", path.display()));
                }
            }
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}
