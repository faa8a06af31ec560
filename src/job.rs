//! The job table: one entry per launched process group still of interest.
//!
//! Entries are mutated from exactly two places: the reaper drain applying
//! child state changes, and the dispatcher forcing transitions (`bg`,
//! `kill`). Both run on the control thread; the asynchronous signal path
//! never touches this structure (see `reaper`).

use std::fmt;

use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

pub const MAX_JOBS: usize = 64;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum JobState {
    Running,
    Stopped,
    Done,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            JobState::Running => "Running",
            JobState::Stopped => "Stopped",
            JobState::Done => "Done",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct Job {
    pub id: usize,
    pub pgid: Pid,
    pub cmdline: String,
    pub state: JobState,
    /// Pids of group members not yet observed to have exited. The job is
    /// Done once this is empty (or once `kill` marks it so optimistically).
    members: Vec<Pid>,
}

impl Job {
    pub fn contains(&self, pid: Pid) -> bool {
        self.members.contains(&pid)
    }

    pub fn members(&self) -> &[Pid] {
        &self.members
    }

    /// Replaces the live-member list after a foreground wait consumed some
    /// of the group's statuses directly.
    pub fn set_members(&mut self, members: Vec<Pid>) {
        self.members = members;
    }

    /// Marks the job finished with no members left to reap.
    pub fn mark_done(&mut self) {
        self.members.clear();
        self.state = JobState::Done;
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{}] {}  {:<8} {}",
            self.id, self.pgid, self.state, self.cmdline
        )
    }
}

/// Insertion-ordered, capacity-bounded collection of jobs.
///
/// Ids are monotonic for the whole session and never reused. Display order
/// is insertion order.
#[derive(Debug)]
pub struct JobTable {
    jobs: Vec<Job>,
    next_id: usize,
}

impl JobTable {
    pub fn new() -> JobTable {
        JobTable {
            jobs: Vec::new(),
            next_id: 1,
        }
    }

    /// Registers a job; `None` when the table is full (the pipeline keeps
    /// running untracked, which the caller reports).
    pub fn push(
        &mut self,
        pgid: Pid,
        cmdline: &str,
        members: Vec<Pid>,
        state: JobState,
    ) -> Option<&Job> {
        if self.jobs.len() >= MAX_JOBS {
            return None;
        }
        debug_assert!(self.jobs.iter().all(|j| j.pgid != pgid || j.state == JobState::Done));
        let id = self.next_id;
        self.next_id += 1;
        self.jobs.push(Job {
            id,
            pgid,
            cmdline: cmdline.to_string(),
            state,
            members,
        });
        self.jobs.last()
    }

    pub fn get(&self, id: usize) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    /// Non-Done entries in insertion order. Does not mutate.
    pub fn iter_active(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter().filter(|j| j.state != JobState::Done)
    }

    /// Drops Done entries, preserving the relative order of the rest.
    pub fn compact(&mut self) {
        self.jobs.retain(|j| j.state != JobState::Done);
    }

    /// Applies one reaped child status to whichever job owns the pid.
    /// Returns false when no tracked job does (discarded silently by the
    /// drain; happens for untracked foreground pipelines and compacted
    /// jobs).
    pub fn apply(&mut self, status: WaitStatus) -> bool {
        let pid = match status.pid() {
            Some(pid) => pid,
            None => return false,
        };
        let job = match self.jobs.iter_mut().find(|j| j.contains(pid)) {
            Some(job) => job,
            None => return false,
        };
        apply_to_job(job, pid, status);
        true
    }
}

fn apply_to_job(job: &mut Job, pid: Pid, status: WaitStatus) {
    match status {
        WaitStatus::Stopped(..) => job.state = JobState::Stopped,
        WaitStatus::Continued(..) => job.state = JobState::Running,
        WaitStatus::Exited(..) | WaitStatus::Signaled(..) => {
            job.members.retain(|&p| p != pid);
            if job.members.is_empty() {
                job.state = JobState::Done;
            }
        }
        _ => {}
    }
}
