//! Child discovery.
//!
//! The set of direct children is never cached: every signal-sending
//! operation re-reads `/proc/<pid>/task/<pid>/children`, so orphans
//! reparented to the supervisor since the last call are picked up
//! automatically. A pid reused between the read and the kill can
//! receive one spurious signal; the window is a single scheduling
//! quantum and the consequence bounded, so the race is documented
//! rather than eliminated.
//!
//! [`signal_children`] runs in signal-handler context: raw
//! open/read/close/kill on fixed stack buffers, no allocation, no
//! locks. The path string is formatted once at install time.

use std::ffi::CString;
use std::sync::OnceLock;

use nix::errno::Errno;
use nix::unistd::Pid;

use crate::error::{InitError, InitResult};

/// Children list of the supervisor's main thread, formatted at install
/// time so handler-context reads never allocate.
static CHILDREN_PATH: OnceLock<CString> = OnceLock::new();

const READ_CHUNK: usize = 512;

fn children_path(pid: Pid) -> String {
    format!("/proc/{pid}/task/{pid}/children")
}

/// Record the supervisor's pid. Must run before signals are unblocked.
pub fn install(pid: Pid) {
    // The path contains no NUL bytes, so CString::new cannot fail.
    let _ = CHILDREN_PATH.set(CString::new(children_path(pid)).unwrap_or_default());
}

/// Incremental parser for the space-separated pid list, carrying a
/// partially read number across chunk boundaries.
#[derive(Default)]
struct PidAccumulator {
    current: i32,
    in_number: bool,
}

impl PidAccumulator {
    fn feed(&mut self, chunk: &[u8], f: &mut dyn FnMut(i32)) {
        for &byte in chunk {
            if byte.is_ascii_digit() {
                self.in_number = true;
                self.current = self
                    .current
                    .saturating_mul(10)
                    .saturating_add(i32::from(byte - b'0'));
            } else if self.in_number {
                f(self.current);
                self.current = 0;
                self.in_number = false;
            }
        }
    }

    fn finish(&mut self, f: &mut dyn FnMut(i32)) {
        if self.in_number {
            f(self.current);
            self.current = 0;
            self.in_number = false;
        }
    }
}

/// Stream the current direct children to `f`, freshly read from the
/// process table. Async-signal-safe.
fn visit_children(f: &mut dyn FnMut(i32)) -> Result<(), Errno> {
    let Some(path) = CHILDREN_PATH.get() else {
        return Err(Errno::ENOENT);
    };
    // SAFETY: path is a valid NUL-terminated string; open(2) is
    // async-signal-safe.
    let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDONLY | libc::O_CLOEXEC) };
    if fd < 0 {
        return Err(Errno::last());
    }
    let mut buf = [0u8; READ_CHUNK];
    let mut acc = PidAccumulator::default();
    let result = loop {
        // SAFETY: buf is a valid writable buffer of READ_CHUNK bytes.
        let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            let errno = Errno::last();
            if errno == Errno::EINTR {
                continue;
            }
            break Err(errno);
        }
        if n == 0 {
            acc.finish(f);
            break Ok(());
        }
        acc.feed(buf.get(..n as usize).unwrap_or(&[]), f);
    };
    // SAFETY: fd is a valid open descriptor.
    unsafe { libc::close(fd) };
    result
}

/// Eagerly verify the children list can be opened and parsed.
///
/// Discovering at termination time that the interface is unreadable
/// would mean signals silently not delivered, so this runs once during
/// setup and any failure is fatal. Returns the current child count.
pub fn probe() -> InitResult<usize> {
    let mut count = 0;
    visit_children(&mut |_| count += 1).map_err(|errno| {
        InitError::ProcTable(format!(
            "{}: {errno}",
            CHILDREN_PATH
                .get()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default()
        ))
    })?;
    Ok(count)
}

/// Fresh list of direct children. Setup and diagnostic path; allocates,
/// so never called from the handler.
pub fn direct_children() -> InitResult<Vec<i32>> {
    let mut pids = Vec::new();
    visit_children(&mut |pid| pids.push(pid))
        .map_err(|errno| InitError::ProcTable(errno.to_string()))?;
    Ok(pids)
}

/// Send `sig` to every direct child, enumerating fresh at send time.
///
/// Callable from signal-handler context. An unreadable children list
/// here would mean termination signals silently lost, so it aborts the
/// supervisor instead.
pub(crate) fn signal_children(sig: libc::c_int) {
    let result = visit_children(&mut |pid| {
        // SAFETY: plain kill(2); a pid reused since enumeration at
        // worst receives one spurious signal.
        unsafe {
            libc::kill(pid, sig);
        }
    });
    if result.is_err() {
        crate::fatal_from_handler(b"pod-init: cannot enumerate children, exiting\n");
    }
}
