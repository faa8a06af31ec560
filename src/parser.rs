//! Splits a command line into a [`Pipeline`] of [`Command`] stages.
//!
//! Tokens are separated by whitespace; `|`, `&`, `<` and `>` delimit
//! themselves. There is no quoting or escaping. A redirection operator with
//! no following filename is silently dropped (long-standing permissive
//! behavior, kept as documented).

use crate::types::{Builtin, Command, Pipeline, RedirectMode};

pub type ParseResult<T> = Result<T, String>;

struct Parser<'a> {
    line: &'a [u8],
    i: usize,
}

impl<'a> Parser<'a> {
    fn proceed_while<F>(&mut self, f: F)
    where
        F: Fn(u8) -> bool,
    {
        while let Some(&c) = self.line.get(self.i) {
            if !f(c) {
                break;
            }
            self.i += 1;
        }
    }

    fn is_whitespace(c: u8) -> bool {
        matches!(c, b' ' | b'\t' | b'\n')
    }

    fn is_word(c: u8) -> bool {
        match c {
            b'>' | b'<' | b'&' | b'|' => false,
            _ => !Parser::is_whitespace(c),
        }
    }

    fn skip_whitespace(&mut self) {
        self.proceed_while(Parser::is_whitespace);
    }

    fn peek(&self) -> Option<u8> {
        self.line.get(self.i).copied()
    }

    fn read_word(&mut self) -> Option<String> {
        let orig = self.i;
        self.proceed_while(Parser::is_word);
        if orig == self.i {
            None
        } else {
            Some(String::from_utf8_lossy(&self.line[orig..self.i]).into_owned())
        }
    }

    /// Reads the filename after a redirection operator. `None` means the
    /// operator dangled at the end of the stage and is dropped.
    fn read_redirect_target(&mut self) -> Option<String> {
        self.skip_whitespace();
        self.read_word()
    }

    fn parse_stage(&mut self) -> Command {
        let mut command = Command::default();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'<') => {
                    self.i += 1;
                    if let Some(target) = self.read_redirect_target() {
                        command.stdin_redirect = Some(target);
                    }
                }
                Some(b'>') => {
                    let mode = if self.line.get(self.i + 1) == Some(&b'>') {
                        self.i += 2;
                        RedirectMode::Append
                    } else {
                        self.i += 1;
                        RedirectMode::Truncate
                    };
                    if let Some(target) = self.read_redirect_target() {
                        command.stdout_redirect = Some((target, mode));
                    }
                }
                Some(b'|') | Some(b'&') | None => break,
                Some(_) => {
                    if let Some(word) = self.read_word() {
                        command.args.push(word);
                    }
                }
            }
        }
        command.builtin = command.name().and_then(Builtin::lookup);
        command
    }

    fn parse_pipeline(&mut self) -> ParseResult<Pipeline> {
        let mut pipeline = Pipeline::default();
        loop {
            pipeline.stages.push(self.parse_stage());
            match self.peek() {
                Some(b'|') => {
                    self.i += 1;
                }
                Some(b'&') => {
                    self.i += 1;
                    pipeline.background = true;
                    self.skip_whitespace();
                    if let Some(c) = self.peek() {
                        return Err(format!("unexpected character after '&': '{}'", c as char));
                    }
                    break;
                }
                None => break,
                Some(c) => return Err(format!("unexpected character: '{}'", c as char)),
            }
        }
        Ok(pipeline)
    }
}

pub fn parse(line: &str) -> ParseResult<Pipeline> {
    let mut parser = Parser {
        line: line.as_bytes(),
        i: 0,
    };
    parser.parse_pipeline()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(command: &Command) -> Vec<&str> {
        command.args.iter().map(|s| s.as_str()).collect()
    }

    #[test]
    fn single_command() {
        let p = parse("ls -l /tmp").unwrap();
        assert_eq!(p.stages.len(), 1);
        assert!(!p.background);
        assert_eq!(args(&p.stages[0]), ["ls", "-l", "/tmp"]);
        assert_eq!(p.stages[0].builtin, None);
    }

    #[test]
    fn three_stage_pipeline() {
        let p = parse("cat notes.txt | grep todo | wc -l").unwrap();
        assert_eq!(p.stages.len(), 3);
        assert_eq!(args(&p.stages[0]), ["cat", "notes.txt"]);
        assert_eq!(args(&p.stages[1]), ["grep", "todo"]);
        assert_eq!(args(&p.stages[2]), ["wc", "-l"]);
    }

    #[test]
    fn trailing_ampersand_marks_background() {
        let p = parse("sleep 100 &").unwrap();
        assert!(p.background);
        assert_eq!(args(&p.stages[0]), ["sleep", "100"]);
    }

    #[test]
    fn text_after_ampersand_is_an_error() {
        assert!(parse("sleep 100 & echo hi").is_err());
    }

    #[test]
    fn redirections() {
        let p = parse("sort < in.txt > out.txt").unwrap();
        let c = &p.stages[0];
        assert_eq!(args(c), ["sort"]);
        assert_eq!(c.stdin_redirect.as_deref(), Some("in.txt"));
        assert_eq!(
            c.stdout_redirect,
            Some(("out.txt".to_string(), RedirectMode::Truncate))
        );
    }

    #[test]
    fn append_redirection() {
        let p = parse("echo hi >> log.txt").unwrap();
        assert_eq!(
            p.stages[0].stdout_redirect,
            Some(("log.txt".to_string(), RedirectMode::Append))
        );
    }

    #[test]
    fn dangling_redirect_ignored() {
        let p = parse("cat file.txt >").unwrap();
        let c = &p.stages[0];
        assert_eq!(args(c), ["cat", "file.txt"]);
        assert_eq!(c.stdout_redirect, None);
        assert_eq!(c.stdin_redirect, None);
    }

    #[test]
    fn builtin_resolved_in_sole_stage() {
        let p = parse("jobs").unwrap();
        assert_eq!(p.stages[0].builtin, Some(Builtin::Jobs));
    }

    #[test]
    fn builtin_tag_present_mid_pipeline_but_only_by_name() {
        // Resolution is per stage; the builder ignores the tag for
        // multi-stage pipelines, so "cd" here runs as an external lookup.
        let p = parse("echo /tmp | cd").unwrap();
        assert_eq!(p.stages[1].builtin, Some(Builtin::Cd));
        assert_eq!(p.stages.len(), 2);
    }

    #[test]
    fn empty_stage_between_pipes() {
        let p = parse("echo hi | | wc -c").unwrap();
        assert_eq!(p.stages.len(), 3);
        assert!(p.stages[1].args.is_empty());
    }

    #[test]
    fn empty_line_is_empty_pipeline() {
        let p = parse("").unwrap();
        assert!(p.is_empty());
        let p = parse("   ").unwrap();
        assert!(p.is_empty());
    }
}
