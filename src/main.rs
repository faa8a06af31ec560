mod builtin;
mod error;
mod eval;
mod global;
mod history;
mod job;
mod parser;
mod reaper;
mod search;
mod term;
mod types;

use std::io::{self, BufRead, Write};

use nix::sys::signal::{signal, SigHandler, Signal};
use nix::unistd::{self, getpid, setpgid};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::eval::LaunchOutcome;
use crate::global::State;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("MSH_LOG"))
        .with_writer(io::stderr)
        .init();

    if let Err(e) = bootstrap() {
        eprintln!("msh: failed to initialize: {}", e);
        std::process::exit(1);
    }
    let mut state = State::new();
    if let Err(e) = state.term.claim() {
        debug!(error = %e, "could not claim terminal");
    }

    let code = repl(&mut state);
    state.history.save();
    std::process::exit(code);
}

fn bootstrap() -> nix::Result<()> {
    reaper::install()?;
    // The shell relinquishes the terminal's interrupt/stop keys to
    // whichever group owns the terminal; children restore the defaults.
    unsafe {
        for sig in [
            Signal::SIGINT,
            Signal::SIGTSTP,
            Signal::SIGQUIT,
            Signal::SIGTTOU,
            Signal::SIGTTIN,
        ] {
            signal(sig, SigHandler::SigIgn)?;
        }
    }
    let shell = getpid();
    // Fails when the shell is already a session leader; that is fine.
    let _ = setpgid(shell, shell);
    Ok(())
}

fn repl(state: &mut State) -> i32 {
    let stdin = io::stdin();
    let mut stdin = stdin.lock();
    loop {
        // The one synchronous point where asynchronous child events reach
        // the job table.
        reaper::drain(&mut state.jobs);
        state.jobs.compact();

        prompt();
        let mut line = String::new();
        match stdin.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("msh: read error: {}", e);
                break;
            }
        }
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        state.history.add(text);

        let pipeline = match parser::parse(text) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                eprintln!("msh: parse error: {}", e);
                continue;
            }
        };
        match eval::launch(state, &pipeline, text) {
            Ok(LaunchOutcome::Exit(code)) => return code,
            Ok(outcome) => debug!(?outcome, "pipeline finished"),
            Err(e) => eprintln!("msh: {}", e),
        }
    }
    0
}

fn prompt() {
    let cwd = unistd::getcwd()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    print!("msh:{}$ ", cwd);
    let _ = io::stdout().flush();
}
