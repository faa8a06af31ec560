//! The pipeline builder: turns a parsed [`Pipeline`] into a set of child
//! processes sharing one process group, wires pipes and redirections, and
//! either waits in the foreground or registers a background job.

use std::convert::Infallible;
use std::ffi::CString;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::io::{IntoRawFd, RawFd};

use nix::fcntl::OFlag;
use nix::sys::signal::{self, killpg, SigHandler, SigSet, SigmaskHow, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};
use tracing::debug;

use crate::builtin;
use crate::error::ShellError;
use crate::global::State;
use crate::job::JobState;
use crate::reaper::ChldMask;
use crate::search::SearchCache;
use crate::types::{Command, Pipeline, RedirectMode};

pub const MAX_STAGES: usize = 32;

#[derive(Debug)]
pub enum LaunchOutcome {
    /// Every stage exited; carries the last stage's status.
    Completed(i32),
    /// The group stopped; a Stopped job now tracks it.
    Stopped,
    /// Running in the background under the given job id.
    Backgrounded(usize),
    /// The `exit` builtin ran; the loop should terminate with this code.
    Exit(i32),
}

/// Retries a syscall while it reports EINTR.
pub(crate) fn retry_eintr<T, F>(mut f: F) -> nix::Result<T>
where
    F: FnMut() -> nix::Result<T>,
{
    loop {
        match f() {
            Err(nix::Error::EINTR) => continue,
            result => return result,
        }
    }
}

pub fn launch(
    state: &mut State,
    pipeline: &Pipeline,
    text: &str,
) -> Result<LaunchOutcome, ShellError> {
    if pipeline.is_empty() {
        return Ok(LaunchOutcome::Completed(0));
    }
    if pipeline.stages.len() == 1 {
        if let Some(b) = pipeline.stages[0].builtin {
            return builtin::run(state, b, &pipeline.stages[0].args);
        }
    }
    if pipeline.stages.len() > MAX_STAGES {
        return Err(ShellError::TooManyStages(pipeline.stages.len()));
    }

    let mut pipes: Vec<(RawFd, RawFd)> = Vec::with_capacity(pipeline.stages.len() - 1);
    for _ in 1..pipeline.stages.len() {
        match unistd::pipe2(OFlag::O_CLOEXEC) {
            Ok(ends) => pipes.push(ends),
            Err(e) => {
                close_all(&pipes);
                return Err(ShellError::PipeCreation(e));
            }
        }
    }

    // SIGCHLD stays blocked through fork, registration and the foreground
    // wait, so the reaper cannot steal this launch's statuses.
    let _mask = ChldMask::block()?;

    let mut pgid: Option<Pid> = None;
    let mut members: Vec<Pid> = Vec::with_capacity(pipeline.stages.len());
    for (i, stage) in pipeline.stages.iter().enumerate() {
        match unsafe { unistd::fork() } {
            Ok(ForkResult::Parent { child }) => {
                let group = *pgid.get_or_insert(child);
                // Raced from the child side too; losing the race is fine.
                let _ = unistd::setpgid(child, group);
                members.push(child);
            }
            Ok(ForkResult::Child) => {
                exec_stage(&state.search_cache, stage, i, &pipes, pgid);
            }
            Err(e) => {
                close_all(&pipes);
                abort_partial(pgid, &members);
                return Err(ShellError::ProcessCreation(e));
            }
        }
    }
    close_all(&pipes);
    let pgid = pgid.expect("non-empty pipeline forked no children");
    debug!(%pgid, stages = members.len(), background = pipeline.background, "launched pipeline");

    if pipeline.background {
        return Ok(match state.jobs.push(pgid, text, members, JobState::Running) {
            Some(job) => {
                println!("[{}] {}", job.id, pgid);
                LaunchOutcome::Backgrounded(job.id)
            }
            None => {
                eprintln!("msh: job table full; group {} running untracked", pgid);
                LaunchOutcome::Completed(0)
            }
        });
    }

    let _fg = state.term.foreground(pgid);
    match wait_group(pgid, members) {
        GroupWait::Exited(status) => Ok(LaunchOutcome::Completed(status)),
        GroupWait::Stopped(rest) => {
            println!("\n[stopped] {}", text);
            if state.jobs.push(pgid, text, rest, JobState::Stopped).is_none() {
                eprintln!("msh: job table full; stopped group {} untracked", pgid);
            }
            Ok(LaunchOutcome::Stopped)
        }
    }
}

pub(crate) enum GroupWait {
    /// All members exited; carries the last stage's status.
    Exited(i32),
    /// A member stopped; carries the members not yet observed to exit.
    Stopped(Vec<Pid>),
}

/// Blocks until every member of the group exits or any member stops.
/// The caller must hold SIGCHLD blocked.
pub(crate) fn wait_group(pgid: Pid, mut members: Vec<Pid>) -> GroupWait {
    let last = members.last().copied();
    let target = Pid::from_raw(-pgid.as_raw());
    let mut status = 0;
    while !members.is_empty() {
        match retry_eintr(|| waitpid(target, Some(WaitPidFlag::WUNTRACED))) {
            Ok(WaitStatus::Exited(pid, code)) => {
                members.retain(|&p| p != pid);
                if Some(pid) == last {
                    status = code;
                }
            }
            Ok(WaitStatus::Signaled(pid, sig, _)) => {
                members.retain(|&p| p != pid);
                if Some(pid) == last {
                    status = 128 + sig as i32;
                }
            }
            Ok(WaitStatus::Stopped(..)) => return GroupWait::Stopped(members),
            Ok(_) => {}
            Err(nix::Error::ECHILD) => break,
            Err(e) => {
                debug!(%pgid, error = %e, "group wait failed");
                break;
            }
        }
    }
    GroupWait::Exited(status)
}

fn close_all(pipes: &[(RawFd, RawFd)]) {
    for &(r, w) in pipes {
        let _ = unistd::close(r);
        let _ = unistd::close(w);
    }
}

/// Fork failed mid-pipeline: kill and reap whatever was already created so
/// the failed launch leaves no orphans behind.
fn abort_partial(pgid: Option<Pid>, members: &[Pid]) {
    let pgid = match pgid {
        Some(pgid) => pgid,
        None => return,
    };
    let _ = killpg(pgid, Signal::SIGKILL);
    for &pid in members {
        let _ = retry_eintr(|| waitpid(pid, None));
    }
}

struct StageFailure {
    status: i32,
    message: String,
}

impl StageFailure {
    fn new(status: i32, message: String) -> StageFailure {
        StageFailure { status, message }
    }
}

/// Runs in the forked child. Reports its own failure and never returns;
/// sibling stages are unaffected.
fn exec_stage(
    cache: &SearchCache,
    stage: &Command,
    index: usize,
    pipes: &[(RawFd, RawFd)],
    pgid: Option<Pid>,
) -> ! {
    // The shell ignores the job-control keys and blocks SIGCHLD; children
    // must not inherit either.
    unsafe {
        for sig in [
            Signal::SIGINT,
            Signal::SIGTSTP,
            Signal::SIGQUIT,
            Signal::SIGTTOU,
            Signal::SIGTTIN,
        ] {
            let _ = signal::signal(sig, SigHandler::SigDfl);
        }
    }
    let _ = signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::empty()), None);
    let group = pgid.unwrap_or_else(|| Pid::from_raw(0));
    let _ = unistd::setpgid(Pid::from_raw(0), group);

    let status = match wire_and_exec(cache, stage, index, pipes) {
        Ok(never) => match never {},
        Err(fail) => {
            let mut stderr = io::stderr();
            let _ = writeln!(stderr, "msh: {}", fail.message);
            let _ = stderr.flush();
            fail.status
        }
    };
    unsafe { libc::_exit(status as libc::c_int) }
}

fn wire_and_exec(
    cache: &SearchCache,
    stage: &Command,
    index: usize,
    pipes: &[(RawFd, RawFd)],
) -> Result<Infallible, StageFailure> {
    // Pipe ends first, then explicit redirections so `<`/`>` win over the
    // pipe for the stages at the ends. dup2 clears O_CLOEXEC on the copy;
    // every original pipe fd closes itself at exec.
    if index > 0 {
        dup_onto(pipes[index - 1].0, libc::STDIN_FILENO)?;
    }
    if index < pipes.len() {
        dup_onto(pipes[index].1, libc::STDOUT_FILENO)?;
    }

    if let Some(path) = &stage.stdin_redirect {
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|e| StageFailure::new(1, format!("{}: {}", path, e)))?;
        dup_onto(file.into_raw_fd(), libc::STDIN_FILENO)?;
    }
    if let Some((path, mode)) = &stage.stdout_redirect {
        let mut opts = OpenOptions::new();
        match mode {
            RedirectMode::Truncate => opts.write(true).create(true).truncate(true),
            RedirectMode::Append => opts.append(true).create(true),
        };
        let file = opts
            .open(path)
            .map_err(|e| StageFailure::new(1, format!("{}: {}", path, e)))?;
        dup_onto(file.into_raw_fd(), libc::STDOUT_FILENO)?;
    }

    let name = match stage.name() {
        Some(name) => name,
        // An empty stage between pipes runs nothing.
        None => unsafe { libc::_exit(0) },
    };

    let path = if name.contains('/') {
        CString::new(name).map_err(|e| StageFailure::new(126, e.to_string()))?
    } else {
        let key = CString::new(name).map_err(|e| StageFailure::new(126, e.to_string()))?;
        match cache.lookup(&key) {
            Some(path) => path.clone(),
            None => return Err(StageFailure::new(127, format!("command not found: {}", name))),
        }
    };
    let argv: Vec<CString> = stage
        .args
        .iter()
        .map(|s| CString::new(s.as_str()))
        .collect::<Result<_, _>>()
        .map_err(|e| StageFailure::new(126, e.to_string()))?;

    let e = unistd::execv(&path, &argv).unwrap_err();
    Err(StageFailure::new(126, format!("{}: {}", name, e)))
}

fn dup_onto(fd: RawFd, target: RawFd) -> Result<(), StageFailure> {
    unistd::dup2(fd, target)
        .map_err(|e| StageFailure::new(1, format!("dup2 failed: {}", e)))?;
    if fd != target {
        let _ = unistd::close(fd);
    }
    Ok(())
}
