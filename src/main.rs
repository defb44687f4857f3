//! # Runway
//! A single-container OCI runtime for Linux. A higher-level engine invokes
//! this binary once per lifecycle operation; container state lives on disk so
//! independent invocations can cooperate on the same container.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use clap::Parser;

use runway::commands::{
    create::Create, delete::Delete, events::Events, exec::Exec, features::Features, kill::Kill,
    pause::Pause, ps::Ps, resume::Resume, run::Run, start::Start, state::State,
};
use runway::logger::{self, LogFormat};
use runway::rootpath;

/// Global options precede the subcommand, as with other OCI runtimes.
#[derive(Parser, Debug)]
#[clap(name = "runway", version, about = "A single-container OCI runtime")]
struct Opts {
    /// Enable debug logging
    #[clap(long)]
    debug: bool,
    /// Write log output to this file instead of stderr
    #[clap(short, long)]
    log: Option<PathBuf>,
    /// Log line format: text or json
    #[clap(long, default_value = "text")]
    log_format: String,
    /// Root directory for container state
    #[clap(short, long)]
    root: Option<PathBuf>,
    /// Accepted for engine compatibility; cgroups are managed through cgroupfs
    #[clap(long)]
    systemd_cgroup: bool,
    #[clap(subcommand)]
    subcmd: SubCommand,
}

#[derive(Parser, Debug)]
enum SubCommand {
    Create(Create),
    Start(Start),
    Run(Run),
    State(State),
    Kill(Kill),
    Exec(Exec),
    Pause(Pause),
    Resume(Resume),
    Ps(Ps),
    Events(Events),
    Delete(Delete),
    Features(Features),
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    let format = LogFormat::from_str(&opts.log_format)?;
    if let Err(err) = logger::init(opts.debug, opts.log.clone(), format) {
        eprintln!("log init failed: {:#}", err);
    }

    if opts.systemd_cgroup {
        log::debug!("ignoring --systemd-cgroup; using cgroupfs");
    }

    let root_path = rootpath::resolve(opts.root.clone())?;

    match opts.subcmd {
        SubCommand::Create(create) => create.exec(&root_path),
        SubCommand::Start(start) => start.exec(&root_path),
        SubCommand::Run(run) => {
            let code = run.exec(&root_path)?;
            std::process::exit(code);
        }
        SubCommand::State(state) => state.exec(&root_path),
        SubCommand::Kill(kill) => kill.exec(&root_path),
        SubCommand::Exec(exec) => {
            let code = exec.exec(&root_path)?;
            std::process::exit(code);
        }
        SubCommand::Pause(pause) => pause.exec(&root_path),
        SubCommand::Resume(resume) => resume.exec(&root_path),
        SubCommand::Ps(ps) => ps.exec(&root_path),
        SubCommand::Events(events) => events.exec(&root_path),
        SubCommand::Delete(delete) => delete.exec(&root_path),
        SubCommand::Features(features) => features.exec(),
    }
}
