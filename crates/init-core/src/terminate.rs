//! Termination state machine.
//!
//! One stage per configured signal: [`trigger`] sends the current
//! stage's signal to every live child, arms the escalation alarm and
//! advances the stage counter. Exhausting the sequence exits the
//! supervisor with status 1 rather than hanging forever.
//!
//! The stage counter is the only mutable state shared between the
//! signal-handling context and the main control flow, so everything
//! here lives in fixed-layout atomics mutated with single indivisible
//! operations. The tables are filled once at install time, before any
//! handler can fire.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicUsize, Ordering};

use nix::unistd::alarm;

use crate::config::{Config, MAX_STAGES};
use crate::enumerate;

/// 0-based index of the next stage to run. Values past the configured
/// stage count mean the sequence is exhausted.
static STAGE: AtomicUsize = AtomicUsize::new(0);
static STAGE_COUNT: AtomicUsize = AtomicUsize::new(0);
static STAGE_SIGNALS: [AtomicI32; MAX_STAGES] = [const { AtomicI32::new(0) }; MAX_STAGES];
static TIMEOUT_SECS: AtomicU32 = AtomicU32::new(0);
static STARTED: AtomicBool = AtomicBool::new(false);

/// Copy the escalation plan into the fixed tables. Runs once during
/// setup, while all signals are still blocked.
pub fn install(config: &Config) {
    for (slot, sig) in STAGE_SIGNALS.iter().zip(&config.termination_signals) {
        slot.store(*sig as i32, Ordering::SeqCst);
    }
    let count = config.termination_signals.len().min(MAX_STAGES);
    STAGE_COUNT.store(count, Ordering::SeqCst);
    TIMEOUT_SECS.store(config.timeout_secs, Ordering::SeqCst);
    STAGE.store(0, Ordering::SeqCst);
    STARTED.store(false, Ordering::SeqCst);
}

/// Whether the termination sequence has started.
pub fn started() -> bool {
    STARTED.load(Ordering::SeqCst)
}

/// Run the next escalation stage: send the stage's signal to every
/// currently discovered child, arm the timeout, advance the counter.
/// Past the last stage this is fatal (exit 1).
///
/// With a zero timeout there is no alarm to arm, so stages run
/// back-to-back until the children are gone or the sequence exhausts.
///
/// Callable from signal-handler context. Main-context callers must
/// hold the process signal mask (see `signals::Blocked`) so a handler
/// cannot re-enter the enumerator mid-read.
pub fn trigger() {
    STARTED.store(true, Ordering::SeqCst);
    loop {
        let stage = STAGE.load(Ordering::SeqCst);
        if stage >= STAGE_COUNT.load(Ordering::SeqCst) {
            crate::fatal_from_handler(b"pod-init: not all children terminated in time, exiting\n");
        }
        let sig = STAGE_SIGNALS
            .get(stage)
            .map(|slot| slot.load(Ordering::SeqCst))
            .unwrap_or(0);
        STAGE.store(stage + 1, Ordering::SeqCst);
        enumerate::signal_children(sig);
        let timeout = TIMEOUT_SECS.load(Ordering::SeqCst);
        if timeout > 0 {
            let _ = alarm::set(timeout);
            return;
        }
    }
}

/// Restart the sequence from its first stage and run that stage now.
///
/// Driven only by the designated terminate signal: a fresh external
/// termination request overrides in-progress automatic escalation.
pub fn restart() {
    let _ = alarm::cancel();
    STAGE.store(0, Ordering::SeqCst);
    trigger();
}

/// Start the sequence if it has not started yet. Called by the reaping
/// loop; the first reaped child begins graceful shutdown of the rest.
pub fn begin() {
    if !started() {
        trigger();
    }
}
