//! Resolved supervisor configuration.
//!
//! Built once by the CLI layer, validated before anything is spawned,
//! and read-only afterwards. The escalation plan is copied into
//! fixed-layout atomics at install time (see `terminate`), so the
//! termination sequence is capped at [`MAX_STAGES`] stages.

use std::ffi::OsString;

pub use nix::sys::signal::Signal;

use crate::error::{InitError, InitResult};

/// Number of slots in the fixed stage-signal table.
pub const MAX_STAGES: usize = 8;

/// Resolved supervisor configuration record.
#[derive(Debug, Clone)]
pub struct Config {
    /// Ordered escalation sequence, one signal per termination stage.
    pub termination_signals: Vec<Signal>,
    /// Signals relayed verbatim to children (single best-effort pass).
    pub forward_signals: Vec<Signal>,
    /// Seconds between escalation stages. 0 escalates without waiting.
    pub timeout_secs: u32,
    /// One argument vector per subprocess to spawn.
    pub segments: Vec<Vec<OsString>>,
}

impl Config {
    /// Configuration with the default escalation plan (TERM then KILL,
    /// 2 seconds apart, forwarding INT) for the given command segments.
    pub fn new(segments: Vec<Vec<OsString>>) -> Self {
        Self {
            termination_signals: vec![Signal::SIGTERM, Signal::SIGKILL],
            forward_signals: vec![Signal::SIGINT],
            timeout_secs: 2,
            segments,
        }
    }

    /// Reject configurations the supervisor cannot honor. Runs before
    /// any child is spawned; every rejection is fatal.
    pub fn validate(&self) -> InitResult<()> {
        if self.termination_signals.is_empty() {
            return Err(InitError::Config("empty termination sequence".into()));
        }
        if self.termination_signals.len() > MAX_STAGES {
            return Err(InitError::Config(format!(
                "termination sequence has {} stages, at most {MAX_STAGES} supported",
                self.termination_signals.len()
            )));
        }
        if self.forward_signals.contains(&Signal::SIGALRM) {
            return Err(InitError::Config(
                "SIGALRM is reserved for escalation timing and cannot be forwarded".into(),
            ));
        }
        if self.segments.is_empty() {
            return Err(InitError::Config("no command segments given".into()));
        }
        if self.segments.iter().any(|segment| segment.is_empty()) {
            return Err(InitError::Config(
                "empty command segment between delimiters".into(),
            ));
        }
        Ok(())
    }
}

/// Parse a signal name as accepted on the command line: `TERM`,
/// `SIGTERM`, lower case, or a numeric id.
pub fn parse_signal(name: &str) -> InitResult<Signal> {
    let trimmed = name.trim();
    if let Ok(num) = trimmed.parse::<i32>() {
        return Signal::try_from(num)
            .map_err(|_| InitError::Config(format!("unknown signal number {num}")));
    }
    let upper = trimmed.to_ascii_uppercase();
    let full = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{upper}")
    };
    match full.as_str() {
        "SIGHUP" => Ok(Signal::SIGHUP),
        "SIGINT" => Ok(Signal::SIGINT),
        "SIGQUIT" => Ok(Signal::SIGQUIT),
        "SIGABRT" => Ok(Signal::SIGABRT),
        "SIGKILL" => Ok(Signal::SIGKILL),
        "SIGUSR1" => Ok(Signal::SIGUSR1),
        "SIGUSR2" => Ok(Signal::SIGUSR2),
        "SIGPIPE" => Ok(Signal::SIGPIPE),
        "SIGALRM" => Ok(Signal::SIGALRM),
        "SIGTERM" => Ok(Signal::SIGTERM),
        "SIGCHLD" => Ok(Signal::SIGCHLD),
        "SIGCONT" => Ok(Signal::SIGCONT),
        "SIGSTOP" => Ok(Signal::SIGSTOP),
        "SIGTSTP" => Ok(Signal::SIGTSTP),
        "SIGTTIN" => Ok(Signal::SIGTTIN),
        "SIGTTOU" => Ok(Signal::SIGTTOU),
        "SIGWINCH" => Ok(Signal::SIGWINCH),
        _ => Err(InitError::Config(format!("unknown signal {trimmed:?}"))),
    }
}
