//! Interactive job-control checks under a real terminal, driven through
//! tmux control mode. Ignored by default: they need tmux installed and a
//! usable server. The tests share one tmux server, so run them serially:
//! `cargo test --test tmux -- --ignored --test-threads=1`.

use std::io::{BufRead, BufReader, Write};
use std::process;
use std::time::Duration;

struct TmuxHandler {
    stdin: process::ChildStdin,
    stdout: BufReader<process::ChildStdout>,
    window: String,
}

fn sleep_little() {
    std::thread::sleep(Duration::from_millis(500));
}

impl TmuxHandler {
    fn new(name: &str) -> std::io::Result<TmuxHandler> {
        let child = process::Command::new("tmux")
            .args(["-L", "msh-test", "-C", "-f", "/dev/null"])
            .stdin(process::Stdio::piped())
            .stdout(process::Stdio::piped())
            .spawn()?;
        let mut t = TmuxHandler {
            stdin: child.stdin.unwrap(),
            stdout: BufReader::new(child.stdout.unwrap()),
            window: name.to_string(),
        };
        t.send(&format!(
            "new-window -n {} {}",
            t.window,
            env!("CARGO_BIN_EXE_msh")
        ));
        sleep_little();
        Ok(t)
    }

    fn send(&mut self, msg: &str) {
        let _ = self.stdin.write_all(msg.as_bytes());
        let _ = self.stdin.write_all(b"\n");
        let _ = self.stdin.flush();
    }

    /// Reads one %begin/%end-delimited command reply.
    fn read_reply(&mut self) -> Vec<String> {
        let mut reply = Vec::new();
        let mut in_reply = false;
        let mut line = String::new();
        loop {
            line.clear();
            match self.stdout.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let trimmed = line.trim_end();
            if trimmed.starts_with("%begin") {
                in_reply = true;
            } else if trimmed.starts_with("%end") || trimmed.starts_with("%error") {
                if in_reply {
                    break;
                }
            } else if in_reply {
                reply.push(trimmed.to_string());
            }
        }
        reply
    }

    fn input(&mut self, line: &str) {
        self.send(&format!(
            "send-keys -t {} {} Enter",
            self.window,
            shell_words(line)
        ));
        sleep_little();
    }

    fn press(&mut self, key: &str) {
        self.send(&format!("send-keys -t {} {}", self.window, key));
        sleep_little();
    }

    fn capture(&mut self) -> String {
        // Drain any pending replies first so the capture is the next one.
        self.send(&format!("capture-pane -p -t {} -S-", self.window));
        loop {
            let reply = self.read_reply();
            if !reply.is_empty() {
                return reply.join("\n");
            }
        }
    }

    fn shutdown(&mut self) {
        self.send("kill-server");
    }
}

fn shell_words(line: &str) -> String {
    let mut out = String::new();
    for c in line.chars() {
        match c {
            ' ' => out.push_str("Space "),
            _ => {
                out.push(c);
                out.push(' ');
            }
        }
    }
    out
}

#[test]
#[ignore]
fn ctrl_z_stops_foreground_job_and_returns_the_prompt() {
    let mut t = TmuxHandler::new("stop").unwrap();
    t.input("sleep 100");
    t.press("C-z");
    t.input("jobs");
    let screen = t.capture();
    t.shutdown();
    assert!(screen.contains("[stopped] sleep 100"), "screen: {screen}");
    assert!(screen.contains("Stopped"), "screen: {screen}");
    assert!(screen.contains("msh:"), "screen: {screen}");
}

#[test]
#[ignore]
fn bg_resumes_a_stopped_job() {
    let mut t = TmuxHandler::new("bg").unwrap();
    t.input("sleep 100");
    t.press("C-z");
    t.input("bg 1");
    t.input("jobs");
    let screen = t.capture();
    t.shutdown();
    assert!(screen.contains("Running"), "screen: {screen}");
}

#[test]
#[ignore]
fn fg_brings_a_stopped_job_back_and_ctrl_c_kills_it() {
    let mut t = TmuxHandler::new("fg").unwrap();
    t.input("sleep 100");
    t.press("C-z");
    t.input("fg 1");
    t.press("C-c");
    t.input("jobs");
    let screen = t.capture();
    t.shutdown();
    // The interrupted job is gone; only the prompt's jobs output remains.
    assert!(!screen.contains("Running"), "screen: {screen}");
}
