//! Supervisor core for a minimal container init.
//!
//! Spawns one subprocess per command segment, relays configured
//! signals, reaps every descendant (including orphans reparented by
//! the kernel), and once any child exits drives the rest through a
//! timed, escalating termination sequence so the container shuts down
//! cleanly instead of leaking zombies or hung processes.
//!
//! Startup sequence ([`run`]):
//! 1. Validate the resolved configuration.
//! 2. Block all signals for the setup window.
//! 3. Install the escalation plan and signal role table.
//! 4. Register the relay handler.
//! 5. New session; register as subreaper when not PID 1.
//! 6. Eagerly probe the /proc children interface — a late failure
//!    during a termination round would be silent signal loss.
//! 7. Spawn the command segments.
//! 8. Unblock signals and enter the reaping loop.

pub mod config;
pub mod enumerate;
pub mod error;
pub mod reap;
pub mod signals;
pub mod spawn;
pub mod terminate;

pub use config::Config;
pub use error::{InitError, InitResult};

use tracing::debug;

/// Run the supervisor to completion. Returns the aggregate exit code
/// the process should exit with: the first non-zero child status in
/// reap order, else 0. Termination-sequence exhaustion and handler-path
/// failures exit(1) directly instead of returning.
pub fn run(config: Config) -> InitResult<i32> {
    config.validate()?;
    signals::block_all()?;

    let pid = nix::unistd::getpid();
    debug!(pid = pid.as_raw(), "starting supervisor");
    enumerate::install(pid);
    terminate::install(&config);
    signals::install_handlers(&config)?;
    spawn::setup_session()?;
    enumerate::probe()?;
    spawn::spawn_segments(&config.segments)?;

    signals::unblock_all()?;
    Ok(reap::reap_loop())
}

/// Write `msg` to stderr and exit(1) using only async-signal-safe
/// primitives. Shared fatal path for signal-handler-context failures.
pub(crate) fn fatal_from_handler(msg: &[u8]) -> ! {
    // SAFETY: write(2) and _exit(2) are async-signal-safe.
    unsafe {
        libc::write(libc::STDERR_FILENO, msg.as_ptr().cast(), msg.len());
        libc::_exit(1);
    }
}
