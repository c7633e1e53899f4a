//! Signal relay: classification and the async delivery entry point.
//!
//! Every configured signal is resolved once at install time into a
//! per-signal role table; the handler itself only dispatches on that
//! table and defers real work to the termination state machine and the
//! child enumerator. It never blocks and never allocates.
//!
//! Signals are blocked at the process level for the whole setup window
//! and unblocked just before the wait loop starts. Main-context code
//! that sends signals itself re-blocks them via [`Blocked`] so the
//! handler cannot re-enter the enumerator's read.

use std::sync::atomic::{AtomicU8, Ordering};

use nix::sys::signal::{
    SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal, sigaction, sigprocmask,
};

use crate::config::Config;
use crate::error::{InitError, InitResult};
use crate::{enumerate, terminate};

/// Size of the role table; covers every real-time signal on Linux.
const NSIG: usize = 65;

const ROLE_NONE: u8 = 0;
const ROLE_FORWARD: u8 = 1;
const ROLE_RESTART: u8 = 2;
const ROLE_ESCALATE: u8 = 3;

/// What a delivered signal means to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalRole {
    /// Relay verbatim to all current children, single best-effort pass.
    Forward,
    /// Restart the termination sequence from its first stage.
    Restart,
    /// Escalation timeout expired: run the next stage.
    Escalate,
}

static ROLES: [AtomicU8; NSIG] = [const { AtomicU8::new(ROLE_NONE) }; NSIG];

fn set_role(sig: Signal, role: u8) {
    if let Some(slot) = ROLES.get(sig as usize) {
        slot.store(role, Ordering::SeqCst);
    }
}

/// Resolve the role of every configured signal.
///
/// SIGALRM is reserved internally for escalation timing, and SIGTERM
/// always restarts the sequence; both override any forward request.
pub fn resolve_roles(config: &Config) {
    for sig in &config.forward_signals {
        set_role(*sig, ROLE_FORWARD);
    }
    set_role(Signal::SIGALRM, ROLE_ESCALATE);
    set_role(Signal::SIGTERM, ROLE_RESTART);
}

/// Role of a raw signal number, if it has one.
pub fn role_of(sig: libc::c_int) -> Option<SignalRole> {
    let raw = usize::try_from(sig).ok()?;
    match ROLES.get(raw)?.load(Ordering::SeqCst) {
        ROLE_FORWARD => Some(SignalRole::Forward),
        ROLE_RESTART => Some(SignalRole::Restart),
        ROLE_ESCALATE => Some(SignalRole::Escalate),
        _ => None,
    }
}

/// The async entry point. Registered with a full `sa_mask`, so no other
/// handled signal can interrupt it mid-dispatch.
extern "C" fn relay(sig: libc::c_int) {
    // SAFETY: errno is thread-local; saved and restored so the
    // interrupted syscall's caller sees its own error.
    let saved_errno = unsafe { *libc::__errno_location() };
    match role_of(sig) {
        Some(SignalRole::Escalate) => terminate::trigger(),
        Some(SignalRole::Restart) => terminate::restart(),
        Some(SignalRole::Forward) => enumerate::signal_children(sig),
        None => {}
    }
    // SAFETY: as above.
    unsafe {
        *libc::__errno_location() = saved_errno;
    }
}

/// Resolve roles and register the relay for every signal that has one.
///
/// SA_RESTART is deliberately not set: the reaping loop relies on
/// EINTR to wake from `wait` after a delivery. SIGTTIN/SIGTTOU/SIGPIPE
/// are ignored (TTY and pipe noise must not kill an init process)
/// unless the configuration assigns them a role.
pub fn install_handlers(config: &Config) -> InitResult<()> {
    resolve_roles(config);

    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    for sig in [Signal::SIGTTIN, Signal::SIGTTOU, Signal::SIGPIPE] {
        if role_of(sig as libc::c_int).is_none() {
            // SAFETY: installing SIG_IGN has no handler to misbehave.
            unsafe { sigaction(sig, &ignore) }
                .map_err(|e| InitError::Signal(format!("ignoring {} failed: {e}", sig.as_str())))?;
        }
    }

    let action = SigAction::new(SigHandler::Handler(relay), SaFlags::empty(), SigSet::all());
    let mut handled = vec![Signal::SIGALRM, Signal::SIGTERM];
    handled.extend(config.forward_signals.iter().copied());
    for sig in handled {
        // SAFETY: relay performs only async-signal-safe work (atomics,
        // open/read/close/kill/alarm) and runs with all signals masked.
        unsafe { sigaction(sig, &action) }.map_err(|e| {
            InitError::Signal(format!("registering {} failed: {e}", sig.as_str()))
        })?;
    }
    Ok(())
}

/// Block every signal at the process level (the setup window).
pub fn block_all() -> InitResult<()> {
    sigprocmask(SigmaskHow::SIG_BLOCK, Some(&SigSet::all()), None)
        .map_err(|e| InitError::Signal(format!("blocking signals failed: {e}")))
}

/// Unblock every signal; delivery to the relay begins here.
pub fn unblock_all() -> InitResult<()> {
    sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&SigSet::all()), None)
        .map_err(|e| InitError::Signal(format!("unblocking signals failed: {e}")))
}

/// RAII guard re-blocking all signals while the main control flow sends
/// signals itself.
pub struct Blocked(());

impl Blocked {
    pub fn enter() -> Self {
        let _ = sigprocmask(SigmaskHow::SIG_BLOCK, Some(&SigSet::all()), None);
        Blocked(())
    }
}

impl Drop for Blocked {
    fn drop(&mut self) {
        let _ = sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&SigSet::all()), None);
    }
}
