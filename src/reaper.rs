//! Asynchronous child-state observation.
//!
//! The SIGCHLD handler must not touch the job table: it only reaps pending
//! statuses with `WNOHANG` and records raw `(pid, status)` pairs into a
//! pre-allocated lock-free ring. [`drain`] runs on the control thread at
//! the top of every read-eval iteration and applies the recorded events.
//!
//! The control thread blocks SIGCHLD (via [`ChldMask`]) around its own
//! blocking waits so the handler and a foreground `waitpid` never compete
//! for the same statuses.

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

use nix::sys::signal::{sigaction, sigprocmask, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use tracing::{debug, trace, warn};

use crate::job::JobTable;

const QUEUE_LEN: usize = 256;
const QUEUE_MASK: usize = QUEUE_LEN - 1;

struct Slot {
    pid: AtomicI32,
    status: AtomicI32,
}

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_SLOT: Slot = Slot {
    pid: AtomicI32::new(0),
    status: AtomicI32::new(0),
};

static SLOTS: [Slot; QUEUE_LEN] = [EMPTY_SLOT; QUEUE_LEN];
static HEAD: AtomicUsize = AtomicUsize::new(0);
static TAIL: AtomicUsize = AtomicUsize::new(0);
static DROPPED: AtomicUsize = AtomicUsize::new(0);

/// Producer side; runs only in the signal handler. Single-producer: the
/// kernel blocks SIGCHLD while its handler runs.
fn push(pid: i32, status: i32) {
    let head = HEAD.load(Ordering::Acquire);
    let tail = TAIL.load(Ordering::Relaxed);
    if tail.wrapping_sub(head) >= QUEUE_LEN {
        DROPPED.fetch_add(1, Ordering::Relaxed);
        return;
    }
    let slot = &SLOTS[tail & QUEUE_MASK];
    slot.pid.store(pid, Ordering::Relaxed);
    slot.status.store(status, Ordering::Relaxed);
    TAIL.store(tail.wrapping_add(1), Ordering::Release);
}

/// Consumer side; runs only on the control thread.
fn pop() -> Option<(i32, i32)> {
    let head = HEAD.load(Ordering::Relaxed);
    let tail = TAIL.load(Ordering::Acquire);
    if head == tail {
        return None;
    }
    let slot = &SLOTS[head & QUEUE_MASK];
    let pid = slot.pid.load(Ordering::Relaxed);
    let status = slot.status.load(Ordering::Relaxed);
    HEAD.store(head.wrapping_add(1), Ordering::Release);
    Some((pid, status))
}

extern "C" fn handle_sigchld(_: libc::c_int) {
    // Async-signal-safe body: waitpid and atomics only, errno preserved.
    let saved_errno = unsafe { *libc::__errno_location() };
    loop {
        let mut status: libc::c_int = 0;
        let pid = unsafe {
            libc::waitpid(
                -1,
                &mut status,
                libc::WNOHANG | libc::WUNTRACED | libc::WCONTINUED,
            )
        };
        if pid <= 0 {
            break;
        }
        push(pid, status);
    }
    unsafe {
        *libc::__errno_location() = saved_errno;
    }
}

pub fn install() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(handle_sigchld),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    unsafe { sigaction(Signal::SIGCHLD, &action) }?;
    Ok(())
}

/// Applies every recorded child event to the job table. Events for pids no
/// tracked job owns are discarded. Never blocks.
pub fn drain(jobs: &mut JobTable) {
    let dropped = DROPPED.swap(0, Ordering::Relaxed);
    if dropped > 0 {
        warn!(dropped, "reap event queue overflowed; job states may lag");
    }
    while let Some((pid, raw)) = pop() {
        match WaitStatus::from_raw(Pid::from_raw(pid), raw) {
            Ok(status) => {
                if jobs.apply(status) {
                    debug!(pid, ?status, "applied child state change");
                } else {
                    trace!(pid, "discarding event for untracked process");
                }
            }
            Err(e) => debug!(pid, raw, error = %e, "undecodable wait status"),
        }
    }
}

/// Blocks SIGCHLD for the control thread until dropped. Held across
/// fork/register windows and blocking foreground waits.
pub struct ChldMask(());

impl ChldMask {
    pub fn block() -> nix::Result<ChldMask> {
        sigprocmask(SigmaskHow::SIG_BLOCK, Some(&chld_set()), None)?;
        Ok(ChldMask(()))
    }
}

impl Drop for ChldMask {
    fn drop(&mut self) {
        let _ = sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&chld_set()), None);
    }
}

fn chld_set() -> SigSet {
    let mut set = SigSet::empty();
    set.add(Signal::SIGCHLD);
    set
}
