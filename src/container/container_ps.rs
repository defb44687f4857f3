use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use nix::unistd::Pid;
use procfs::process::Process;
use tabwriter::TabWriter;

use super::Container;
use crate::process::collect_process_tree;

impl Container {
    /// Prints the container's process table, one `PID  CMD` row per process
    /// in the tree rooted at the init pid.
    pub fn ps(&mut self) -> Result<()> {
        self.refresh_status()?;
        let pid = match self.pid() {
            Some(pid) => pid,
            None => bail!("{} has no running processes", self.id()),
        };

        let mut tw = TabWriter::new(io::stdout());
        writeln!(&mut tw, "PID\tCMD")?;
        for process in collect_process_tree(pid) {
            writeln!(&mut tw, "{}\t{}", process, command_line(process))?;
        }
        tw.flush().context("failed to flush the process table")?;
        Ok(())
    }
}

fn command_line(pid: Pid) -> String {
    let proc = match Process::new(pid.as_raw()) {
        Ok(proc) => proc,
        Err(_) => return "?".to_string(),
    };

    match proc.cmdline() {
        Ok(args) if !args.is_empty() => args.join(" "),
        // kernel threads and zombies have an empty cmdline
        _ => proc
            .stat()
            .map(|stat| format!("[{}]", stat.comm))
            .unwrap_or_else(|_| "?".to_string()),
    }
}
