//! Parent-side failure taxonomy. Child-side failures (redirection, exec)
//! never cross the process boundary: they are reported on the child's
//! stderr and become its exit status.

use std::ffi;
use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("no such job: {0}")]
    NoSuchJob(usize),
    #[error("pipe creation failed: {0}")]
    PipeCreation(nix::Error),
    #[error("process creation failed: {0}")]
    ProcessCreation(nix::Error),
    #[error("signal delivery failed: {0}")]
    SignalDelivery(nix::Error),
    #[error("pipeline too long: {0} stages")]
    TooManyStages(usize),
    #[error("system error: {0}")]
    Sys(#[from] nix::Error),
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("nul byte in argument: {0}")]
    Nul(#[from] ffi::NulError),
}
