//! Controlling-terminal ownership.
//!
//! Exactly one process group owns the terminal at a time: the shell's own,
//! or a foreground job's. Transfers happen only through [`Terminal`], and
//! [`ForegroundGuard`] returns ownership to the shell on every exit path,
//! error paths included.
//!
//! When stdin is not a terminal (tests driving the binary through a pipe),
//! every transfer is a no-op.

use std::os::unix::io::RawFd;

use nix::unistd::{getpgrp, isatty, tcsetpgrp, Pid};
use tracing::debug;

pub struct Terminal {
    fd: RawFd,
    shell_pgid: Pid,
    is_tty: bool,
}

impl Terminal {
    pub fn new() -> Terminal {
        let fd = libc::STDIN_FILENO;
        Terminal {
            fd,
            shell_pgid: getpgrp(),
            is_tty: isatty(fd).unwrap_or(false),
        }
    }

    /// Takes the terminal for the shell's own group. Called once at
    /// startup, after the shell has joined its own process group.
    pub fn claim(&mut self) -> nix::Result<()> {
        self.shell_pgid = getpgrp();
        if self.is_tty {
            tcsetpgrp(self.fd, self.shell_pgid)?;
        }
        Ok(())
    }

    /// Hands the terminal to `pgid`; dropping the guard hands it back.
    pub fn foreground(&self, pgid: Pid) -> ForegroundGuard<'_> {
        if self.is_tty {
            if let Err(e) = tcsetpgrp(self.fd, pgid) {
                debug!(%pgid, error = %e, "terminal handoff failed");
            }
        }
        ForegroundGuard { term: self }
    }
}

pub struct ForegroundGuard<'a> {
    term: &'a Terminal,
}

impl Drop for ForegroundGuard<'_> {
    fn drop(&mut self) {
        if self.term.is_tty {
            if let Err(e) = tcsetpgrp(self.term.fd, self.term.shell_pgid) {
                debug!(error = %e, "terminal restore failed");
            }
        }
    }
}
