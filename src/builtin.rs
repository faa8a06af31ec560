//! In-process commands, including the job-control dispatcher (`jobs`,
//! `fg`, `bg`, `kill`). Dispatch is an explicit match over the [`Builtin`]
//! tags the parser resolved.

use std::env;
use std::path::Path;

use nix::sys::signal::{killpg, Signal};
use nix::unistd;
use tracing::debug;

use crate::error::ShellError;
use crate::eval::{wait_group, GroupWait, LaunchOutcome};
use crate::global::State;
use crate::job::JobState;
use crate::reaper::ChldMask;
use crate::types::Builtin;

pub fn run(
    state: &mut State,
    builtin: Builtin,
    args: &[String],
) -> Result<LaunchOutcome, ShellError> {
    match builtin {
        Builtin::Cd => Ok(LaunchOutcome::Completed(cd(args))),
        Builtin::Pwd => Ok(LaunchOutcome::Completed(pwd())),
        Builtin::Exit => Ok(exit(args)),
        Builtin::Jobs => Ok(LaunchOutcome::Completed(jobs(state))),
        Builtin::Fg => fg(state, args),
        Builtin::Bg => bg(state, args),
        Builtin::Kill => kill(state, args),
        Builtin::History => Ok(LaunchOutcome::Completed(history(state))),
        Builtin::Rehash => {
            state.search_cache.rehash();
            Ok(LaunchOutcome::Completed(0))
        }
    }
}

fn cd(args: &[String]) -> i32 {
    let target = match args.get(1) {
        Some(arg) => arg.clone(),
        None => match env::var("HOME") {
            Ok(home) => home,
            Err(_) => ".".to_string(),
        },
    };
    match unistd::chdir(Path::new(&target)) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("msh: cd: {}: {}", target, e);
            1
        }
    }
}

fn pwd() -> i32 {
    match unistd::getcwd() {
        Ok(path) => {
            println!("{}", path.display());
            0
        }
        Err(e) => {
            eprintln!("msh: pwd: {}", e);
            1
        }
    }
}

fn exit(args: &[String]) -> LaunchOutcome {
    match args.get(1) {
        None => LaunchOutcome::Exit(0),
        Some(s) => match s.parse() {
            Ok(code) => LaunchOutcome::Exit(code),
            Err(_) => {
                eprintln!("msh: exit: {}: numeric argument required", s);
                LaunchOutcome::Exit(2)
            }
        },
    }
}

fn jobs(state: &State) -> i32 {
    for job in state.jobs.iter_active() {
        println!("{}", job);
    }
    0
}

fn history(state: &State) -> i32 {
    for (i, line) in state.history.iter().enumerate() {
        println!("{:>5}  {}", i + 1, line);
    }
    0
}

fn parse_job_id(args: &[String]) -> Option<usize> {
    args.get(1)?.trim_start_matches('%').parse().ok()
}

/// Continues a stopped job in the foreground: terminal to the group,
/// SIGCONT, then the same group wait the launcher uses. The terminal
/// guard restores ownership on every path out.
fn fg(state: &mut State, args: &[String]) -> Result<LaunchOutcome, ShellError> {
    let id = match parse_job_id(args) {
        Some(id) => id,
        None => {
            eprintln!("msh: usage: fg <job-id>");
            return Ok(LaunchOutcome::Completed(1));
        }
    };
    // Blocked before SIGCONT so the resulting statuses reach our wait,
    // not the asynchronous reaper.
    let _mask = ChldMask::block()?;
    let job = state.jobs.get_mut(id).ok_or(ShellError::NoSuchJob(id))?;
    let pgid = job.pgid;
    match killpg(pgid, Signal::SIGCONT) {
        Err(nix::Error::ESRCH) => {
            job.mark_done();
            return Ok(LaunchOutcome::Completed(0));
        }
        Err(e) => return Err(ShellError::SignalDelivery(e)),
        Ok(()) => {}
    }
    job.state = JobState::Running;
    debug!(%pgid, id, "continuing job in foreground");

    let _fg = state.term.foreground(pgid);
    match wait_group(pgid, job.members().to_vec()) {
        GroupWait::Exited(code) => {
            job.mark_done();
            Ok(LaunchOutcome::Completed(code))
        }
        GroupWait::Stopped(rest) => {
            job.set_members(rest);
            job.state = JobState::Stopped;
            println!("\n[stopped] {}", job.cmdline);
            Ok(LaunchOutcome::Stopped)
        }
    }
}

fn bg(state: &mut State, args: &[String]) -> Result<LaunchOutcome, ShellError> {
    let id = match parse_job_id(args) {
        Some(id) => id,
        None => {
            eprintln!("msh: usage: bg <job-id>");
            return Ok(LaunchOutcome::Completed(1));
        }
    };
    let job = state.jobs.get_mut(id).ok_or(ShellError::NoSuchJob(id))?;
    match killpg(job.pgid, Signal::SIGCONT) {
        Ok(()) => {
            job.state = JobState::Running;
            Ok(LaunchOutcome::Completed(0))
        }
        Err(nix::Error::ESRCH) => {
            job.mark_done();
            Ok(LaunchOutcome::Completed(0))
        }
        Err(e) => Err(ShellError::SignalDelivery(e)),
    }
}

fn kill(state: &mut State, args: &[String]) -> Result<LaunchOutcome, ShellError> {
    let id = match parse_job_id(args) {
        Some(id) => id,
        None => {
            eprintln!("msh: usage: kill <job-id>");
            return Ok(LaunchOutcome::Completed(1));
        }
    };
    let job = state.jobs.get_mut(id).ok_or(ShellError::NoSuchJob(id))?;
    match killpg(job.pgid, Signal::SIGTERM) {
        Ok(()) => {
            // Optimistic; the reaper confirms once the members are gone.
            job.state = JobState::Done;
            Ok(LaunchOutcome::Completed(0))
        }
        Err(nix::Error::ESRCH) => {
            job.mark_done();
            Ok(LaunchOutcome::Completed(0))
        }
        Err(e) => Err(ShellError::SignalDelivery(e)),
    }
}
