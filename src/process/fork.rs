use std::process::exit;

use anyhow::Result;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};

/// Forks the container process. The parent returns the child's pid; the child
/// runs `f`, which is expected to end in an exec and therefore never return
/// successfully. A child-side error is printed and turned into exit code 1.
pub fn fork_container<F: FnOnce() -> Result<()>>(f: F) -> Result<Pid> {
    match unsafe { unistd::fork()? } {
        ForkResult::Parent { child } => Ok(child),
        ForkResult::Child => {
            if let Err(err) = f() {
                eprintln!("runway: container setup failed: {:#}", err);
                exit(1);
            }
            exit(0);
        }
    }
}

/// Performs the inner fork that places the container payload inside a freshly
/// unshared PID namespace. The caller continues only in the inner child; the
/// outer process waits and forwards the child's exit status.
pub fn fork_into_pid_namespace() -> Result<()> {
    match unsafe { unistd::fork()? } {
        ForkResult::Child => Ok(()),
        ForkResult::Parent { child } => match waitpid(child, None)? {
            WaitStatus::Exited(_, code) => exit(code),
            WaitStatus::Signaled(_, signal, _) => exit(128 + signal as i32),
            status => {
                eprintln!("runway: unexpected wait status {:?}", status);
                exit(1);
            }
        },
    }
}
