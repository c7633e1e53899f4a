//! Process spawning and supervisor session setup.
//!
//! Each command segment becomes one forked child in its own process
//! group, so a child and everything it spawns form a single killable
//! unit. Argument vectors are converted to C strings before forking;
//! the child touches nothing but setpgid/sigprocmask/execvp between
//! fork and exec.

use std::ffi::{CString, OsString};
use std::os::unix::ffi::OsStrExt;

use nix::sys::signal::{SigSet, SigmaskHow, sigprocmask};
use nix::unistd::{self, ForkResult, Pid};
use tracing::debug;

use crate::error::{InitError, InitResult};

/// Exit status of a child whose exec failed, distinguishable from
/// ordinary child failures.
const EXEC_FAILED: i32 = 127;

/// Detach the supervisor into a fresh session and, when not running as
/// PID 1, register it as a child subreaper so orphaned descendants
/// reparent here instead of to the real init.
pub fn setup_session() -> InitResult<()> {
    if let Err(e) = unistd::setsid() {
        // Already a process-group leader; the session cannot change.
        debug!("setsid: {e}");
    }
    if unistd::getpid().as_raw() != 1 {
        debug!("registering as child subreaper");
        // SAFETY: PR_SET_CHILD_SUBREAPER takes a single integer flag.
        let rc = unsafe { libc::prctl(libc::PR_SET_CHILD_SUBREAPER, 1, 0, 0, 0) };
        if rc != 0 {
            return Err(InitError::Spawn(format!(
                "prctl(PR_SET_CHILD_SUBREAPER): {}",
                std::io::Error::last_os_error()
            )));
        }
    }
    Ok(())
}

fn to_argv(segment: &[OsString]) -> InitResult<Vec<CString>> {
    segment
        .iter()
        .map(|arg| {
            CString::new(arg.as_bytes())
                .map_err(|_| InitError::Config(format!("argument contains NUL byte: {arg:?}")))
        })
        .collect()
}

/// Fork one subprocess per segment.
///
/// A fork failure is fatal: without its full set of children the
/// supervisor has no purpose. Exec failure is reported by the affected
/// child exiting with [`EXEC_FAILED`], which the reaping loop treats
/// like any other child failure.
pub fn spawn_segments(segments: &[Vec<OsString>]) -> InitResult<Vec<Pid>> {
    let mut spawned = Vec::with_capacity(segments.len());
    for segment in segments {
        let argv = to_argv(segment)?;
        spawned.push(spawn(&argv)?);
    }
    Ok(spawned)
}

fn spawn(argv: &[CString]) -> InitResult<Pid> {
    let Some(program) = argv.first() else {
        return Err(InitError::Config("empty command segment".into()));
    };
    // SAFETY: the supervisor is single-threaded at spawn time; the
    // child calls only setpgid/sigprocmask/execvp before exec or _exit.
    match unsafe { unistd::fork() } {
        Ok(ForkResult::Parent { child }) => {
            debug!(pid = child.as_raw(), command = ?argv, "spawned");
            Ok(child)
        }
        Ok(ForkResult::Child) => {
            let zero = Pid::from_raw(0);
            let _ = unistd::setpgid(zero, zero);
            // Undo the mask inherited from the setup-race window.
            let _ = sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&SigSet::all()), None);
            let err = match unistd::execvp(program, argv) {
                Ok(never) => match never {},
                Err(e) => e,
            };
            eprintln!("pod-init: exec {program:?} failed: {err}");
            // SAFETY: _exit is the only safe way out of a failed exec.
            unsafe { libc::_exit(EXEC_FAILED) }
        }
        Err(e) => Err(InitError::Spawn(format!("fork failed: {e}"))),
    }
}
