use anyhow::{bail, Result};
use nix::sys::signal::Signal;

/// Signal numbers and short names, in kernel order. Long names are the short
/// names with a `SIG` prefix.
const SIGNALS: &[(i32, &str, Signal)] = &[
    (1, "HUP", Signal::SIGHUP),
    (2, "INT", Signal::SIGINT),
    (3, "QUIT", Signal::SIGQUIT),
    (4, "ILL", Signal::SIGILL),
    (5, "TRAP", Signal::SIGTRAP),
    (6, "ABRT", Signal::SIGABRT),
    (7, "BUS", Signal::SIGBUS),
    (8, "FPE", Signal::SIGFPE),
    (9, "KILL", Signal::SIGKILL),
    (10, "USR1", Signal::SIGUSR1),
    (11, "SEGV", Signal::SIGSEGV),
    (12, "USR2", Signal::SIGUSR2),
    (13, "PIPE", Signal::SIGPIPE),
    (14, "ALRM", Signal::SIGALRM),
    (15, "TERM", Signal::SIGTERM),
    (16, "STKFLT", Signal::SIGSTKFLT),
    (17, "CHLD", Signal::SIGCHLD),
    (18, "CONT", Signal::SIGCONT),
    (19, "STOP", Signal::SIGSTOP),
    (20, "TSTP", Signal::SIGTSTP),
    (21, "TTIN", Signal::SIGTTIN),
    (22, "TTOU", Signal::SIGTTOU),
    (23, "URG", Signal::SIGURG),
    (24, "XCPU", Signal::SIGXCPU),
    (25, "XFSZ", Signal::SIGXFSZ),
    (26, "VTALRM", Signal::SIGVTALRM),
    (27, "PROF", Signal::SIGPROF),
    (28, "WINCH", Signal::SIGWINCH),
    (29, "IO", Signal::SIGIO),
    (30, "PWR", Signal::SIGPWR),
    (31, "SYS", Signal::SIGSYS),
];

/// Parses a signal given by number, short name or full name, in any case.
pub fn from_str(signal: &str) -> Result<Signal> {
    let upper = signal.to_ascii_uppercase();

    if let Ok(number) = upper.parse::<i32>() {
        return match SIGNALS.iter().find(|(n, _, _)| *n == number) {
            Some((_, _, sig)) => Ok(*sig),
            None => bail!("{} is not a valid signal number", signal),
        };
    }

    let name = upper.strip_prefix("SIG").unwrap_or(&upper);
    // historic spelling still seen in the wild
    let name = if name == "IOT" { "ABRT" } else { name };

    match SIGNALS.iter().find(|(_, short, _)| *short == name) {
        Some((_, _, sig)) => Ok(*sig),
        None => bail!("{} is not a valid signal", signal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_symbolic_and_numeric() {
        assert_eq!(from_str("SIGTERM").unwrap(), Signal::SIGTERM);
        assert_eq!(from_str("term").unwrap(), Signal::SIGTERM);
        assert_eq!(from_str("15").unwrap(), Signal::SIGTERM);
        assert_eq!(from_str("KILL").unwrap(), Signal::SIGKILL);
        assert_eq!(from_str("9").unwrap(), Signal::SIGKILL);
    }

    #[test]
    fn test_parse_historic_alias() {
        assert_eq!(from_str("IOT").unwrap(), Signal::SIGABRT);
        assert_eq!(from_str("SIGIOT").unwrap(), Signal::SIGABRT);
    }

    #[test]
    fn test_every_table_entry_parses_three_ways() {
        for (number, short, sig) in SIGNALS {
            assert_eq!(from_str(&number.to_string()).unwrap(), *sig);
            assert_eq!(from_str(short).unwrap(), *sig);
            assert_eq!(from_str(&format!("SIG{}", short)).unwrap(), *sig);
        }
    }

    #[test]
    fn test_parse_invalid() {
        assert!(from_str("SIGNOPE").is_err());
        assert!(from_str("99").is_err());
        assert!(from_str("0").is_err());
        assert!(from_str("").is_err());
    }
}
