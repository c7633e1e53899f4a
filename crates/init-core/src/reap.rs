//! Reaping loop: the supervisor's single blocking control flow.
//!
//! Waits for any descendant state change, folds normalized exit
//! statuses into the aggregate code, and starts the termination
//! sequence on the first reap. The loop ends when `wait` reports no
//! children left.

use nix::errno::Errno;
use nix::sys::wait::{self, WaitStatus};
use tracing::{debug, error};

use crate::{signals, terminate};

/// Normalized exit status of a reaped descendant: its exit code, or
/// 128 + signal number when terminated by a signal.
fn normalize(status: &WaitStatus) -> Option<(i32, i32)> {
    match status {
        WaitStatus::Exited(pid, code) => Some((pid.as_raw(), *code)),
        WaitStatus::Signaled(pid, sig, _) => Some((pid.as_raw(), 128 + *sig as i32)),
        _ => None,
    }
}

/// Fold one normalized status into the aggregate: the first non-zero
/// status wins, in reap order, and is never overwritten.
fn fold_exit(aggregate: i32, status: i32) -> i32 {
    if aggregate == 0 { status } else { aggregate }
}

/// Start the termination sequence exactly once, with signals re-blocked
/// so the relay cannot run concurrently with the enumerator.
fn begin_termination() {
    let _blocked = signals::Blocked::enter();
    terminate::begin();
}

/// Wait for descendant state changes until none remain. Returns the
/// aggregate exit code the supervisor should exit with.
pub fn reap_loop() -> i32 {
    let mut aggregate = 0;
    loop {
        match wait::wait() {
            Ok(status) => {
                if let Some((pid, code)) = normalize(&status) {
                    debug!(pid, code, "reaped");
                    aggregate = fold_exit(aggregate, code);
                    begin_termination();
                }
            }
            Err(Errno::EINTR) => debug!("wait interrupted by signal"),
            Err(Errno::ECHILD) => {
                debug!("no children left");
                break;
            }
            Err(e) => {
                // Unexpected wait failure: count it as a failed child
                // and shut everything down. The escalation alarm keeps
                // the sequence moving to exhaustion even if wait never
                // succeeds again.
                error!("wait failed: {e}");
                aggregate = fold_exit(aggregate, 1);
                begin_termination();
            }
        }
    }
    aggregate
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::Signal;
    use nix::unistd::Pid;

    #[test]
    fn normalize_passes_exit_codes_through() {
        let status = WaitStatus::Exited(Pid::from_raw(7), 3);
        assert_eq!(normalize(&status), Some((7, 3)));
    }

    #[test]
    fn normalize_maps_signals_past_128() {
        let status = WaitStatus::Signaled(Pid::from_raw(8), Signal::SIGKILL, false);
        assert_eq!(normalize(&status), Some((8, 137)));
        let status = WaitStatus::Signaled(Pid::from_raw(9), Signal::SIGTERM, false);
        assert_eq!(normalize(&status), Some((9, 143)));
    }

    #[test]
    fn normalize_ignores_stop_and_continue() {
        let status = WaitStatus::Stopped(Pid::from_raw(10), Signal::SIGSTOP);
        assert_eq!(normalize(&status), None);
    }

    #[test]
    fn first_nonzero_status_wins() {
        let mut aggregate = 0;
        for status in [0, 0, 3, 0, 7] {
            aggregate = fold_exit(aggregate, status);
        }
        assert_eq!(aggregate, 3);
    }

    #[test]
    fn all_zero_statuses_stay_zero() {
        let mut aggregate = 0;
        for status in [0, 0, 0] {
            aggregate = fold_exit(aggregate, status);
        }
        assert_eq!(aggregate, 0);
    }
}
