//! Lifecycle hook execution. Hooks are operator-supplied executables that get
//! the container state on stdin; a phase that ran to success is stamped into
//! the state's annotations so re-entrant lifecycle calls never repeat it.

use std::io::Write;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

use crate::container::State;
use crate::events::iso8601_now;
use crate::process::wait_for_process;
use crate::spec::Hook;
use crate::utils;

fn annotation_key(phase: &str) -> String {
    format!("runway.hooks.{}", phase)
}

/// Runs an ordered hook list for one lifecycle phase. The phase runs at most
/// once per container lifetime: a pre-existing completion annotation
/// short-circuits the whole list. Returns true when the phase is (or already
/// was) complete.
pub fn run_hook_sequence(hooks: &[Hook], state: &mut State, phase: &str) -> Result<bool> {
    if hooks.is_empty() {
        return Ok(true);
    }

    let key = annotation_key(phase);
    if state.annotations.contains_key(&key) {
        log::debug!("{} hooks already ran for {}", phase, state.id);
        return Ok(true);
    }

    for hook in hooks {
        execute_single_hook(hook, state, phase)
            .with_context(|| format!("{} hook failed", phase))?;
    }

    state.annotations.insert(key, iso8601_now());
    Ok(true)
}

fn execute_single_hook(hook: &Hook, state: &State, phase: &str) -> Result<()> {
    if hook.path.as_os_str().is_empty() {
        bail!("hook path is empty");
    }

    // hook.args follows argv semantics: the first entry is arg0, which may
    // differ from the executable path
    let (arg0, args) = if hook.args.is_empty() {
        (hook.path.display().to_string(), Vec::new())
    } else {
        let mut args = hook.args.clone();
        let arg0 = args.remove(0);
        (arg0, args)
    };

    let mut child = Command::new(&hook.path)
        .args(&args)
        .arg0(&arg0)
        .env("OCI_HOOK_TYPE", phase)
        .env("OCI_CONTAINER_ID", &state.id)
        .env(
            "OCI_CONTAINER_BUNDLE",
            if state.bundle.is_empty() {
                "."
            } else {
                &state.bundle
            },
        )
        .env("OCI_CONTAINER_PID", state.pid.to_string())
        .env("OCI_CONTAINER_STATUS", state.status.to_string())
        .envs(utils::parse_env(&hook.env))
        .stdin(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to spawn hook {}", hook.path.display()))?;

    let pid = Pid::from_raw(child.id() as i32);

    let payload = serde_json::to_vec(state).context("failed to serialize state for hook")?;
    let write_result = child
        .stdin
        .take()
        .context("hook child has no stdin")
        .and_then(|mut stdin| {
            stdin
                .write_all(&payload)
                .context("failed to write state to hook stdin")
        });
    if let Err(err) = write_result {
        let _ = kill(pid, Signal::SIGKILL);
        let _ = wait_for_process(pid, 0);
        return Err(err);
    }

    match wait_for_process(pid, hook.timeout)
        .with_context(|| format!("hook {} did not finish", hook.path.display()))?
    {
        WaitStatus::Exited(_, 0) => Ok(()),
        WaitStatus::Exited(_, code) => {
            bail!("hook {} exited with status {}", hook.path.display(), code)
        }
        WaitStatus::Signaled(_, signal, _) => {
            bail!("hook {} terminated by {}", hook.path.display(), signal)
        }
        status => bail!(
            "hook {} ended with unexpected status {:?}",
            hook.path.display(),
            status
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerStatus;
    use crate::process::TimeoutError;
    use crate::utils::create_temp_dir;
    use std::path::PathBuf;

    fn test_state() -> State {
        State::new("hook-test", ContainerStatus::Creating, 0, "/bundle", "1.0.2")
    }

    fn hook(path: &str, args: Vec<String>, timeout: i64) -> Hook {
        Hook {
            path: PathBuf::from(path),
            args,
            env: vec![],
            timeout,
        }
    }

    #[test]
    fn test_empty_list_succeeds_without_stamp() -> Result<()> {
        let mut state = test_state();
        assert!(run_hook_sequence(&[], &mut state, "prestart")?);
        assert!(state.annotations.is_empty());
        Ok(())
    }

    #[test]
    fn test_successful_phase_is_stamped() -> Result<()> {
        let mut state = test_state();
        let hooks = vec![hook("/bin/true", vec![], 0)];
        assert!(run_hook_sequence(&hooks, &mut state, "createRuntime")?);
        let stamp = state
            .annotations
            .get("runway.hooks.createRuntime")
            .expect("phase not stamped");
        assert!(stamp.ends_with('Z'));
        Ok(())
    }

    #[test]
    fn test_phase_runs_at_most_once() -> Result<()> {
        let tmp = create_temp_dir("hooks_once")?;
        let witness = tmp.join("witness");
        let hooks = vec![hook(
            "/bin/sh",
            vec![
                "sh".to_string(),
                "-c".to_string(),
                format!("cat >> {}", witness.display()),
            ],
            0,
        )];

        let mut state = test_state();
        assert!(run_hook_sequence(&hooks, &mut state, "poststop")?);
        assert!(run_hook_sequence(&hooks, &mut state, "poststop")?);

        // stdin carried the state JSON exactly once
        let contents = std::fs::read_to_string(&witness)?;
        let value: serde_json::Value = serde_json::from_str(&contents)?;
        assert_eq!(value["id"], "hook-test");
        Ok(())
    }

    #[test]
    fn test_failing_hook_skips_the_rest() -> Result<()> {
        let tmp = create_temp_dir("hooks_fail")?;
        let witness = tmp.join("witness");
        let hooks = vec![
            hook("/bin/false", vec![], 0),
            hook(
                "/bin/sh",
                vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    format!("touch {}", witness.display()),
                ],
                0,
            ),
        ];

        let mut state = test_state();
        assert!(run_hook_sequence(&hooks, &mut state, "prestart").is_err());
        assert!(!witness.exists());
        assert!(state.annotations.is_empty());
        Ok(())
    }

    #[test]
    fn test_empty_path_fails() {
        let mut state = test_state();
        let hooks = vec![hook("", vec![], 0)];
        assert!(run_hook_sequence(&hooks, &mut state, "prestart").is_err());
    }

    #[test]
    #[ignore]
    // Runs for a full second to trigger the timeout, so it stays out of the
    // default test pass.
    fn test_hook_timeout() {
        let mut state = test_state();
        let hooks = vec![hook(
            "/usr/bin/tail",
            vec!["tail".to_string(), "-f".to_string(), "/dev/null".to_string()],
            1,
        )];
        let err = run_hook_sequence(&hooks, &mut state, "prestart")
            .expect_err("expected the hook to time out");
        assert!(err
            .chain()
            .any(|cause| cause.downcast_ref::<TimeoutError>().is_some()));
    }
}
