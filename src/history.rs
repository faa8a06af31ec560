//! Bounded command history: oldest entry evicted at capacity, duplicates
//! suppressed only against the immediately preceding entry, persisted one
//! line per entry.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

pub const MAX_HISTORY: usize = 200;

pub struct History {
    entries: Vec<String>,
    path: Option<PathBuf>,
}

impl History {
    pub fn new(path: Option<PathBuf>) -> History {
        let mut this = History {
            entries: Vec::new(),
            path,
        };
        this.load();
        this
    }

    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".msh_history"))
    }

    pub fn add(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }
        if self.entries.last().map(|s| s.as_str()) == Some(line) {
            return;
        }
        if self.entries.len() == MAX_HISTORY {
            self.entries.remove(0);
        }
        self.entries.push(line.to_string());
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|s| s.as_str())
    }

    fn load(&mut self) {
        let path = match &self.path {
            Some(path) => path,
            None => return,
        };
        let file = match File::open(path) {
            Ok(file) => file,
            Err(_) => return,
        };
        for line in BufReader::new(file).lines().map_while(Result::ok) {
            self.add(line.trim_end());
        }
    }

    pub fn save(&self) {
        let path = match &self.path {
            Some(path) => path,
            None => return,
        };
        let mut out = String::with_capacity(self.entries.len() * 16);
        for line in &self.entries {
            out.push_str(line);
            out.push('\n');
        }
        if let Ok(mut file) = File::create(path) {
            let _ = file.write_all(out.as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppresses_consecutive_duplicates_only() {
        let mut h = History::new(None);
        h.add("ls");
        h.add("ls");
        h.add("pwd");
        h.add("ls");
        let got: Vec<&str> = h.iter().collect();
        assert_eq!(got, ["ls", "pwd", "ls"]);
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let mut h = History::new(None);
        for i in 0..MAX_HISTORY + 5 {
            h.add(&format!("cmd {i}"));
        }
        assert_eq!(h.iter().count(), MAX_HISTORY);
        assert_eq!(h.iter().next(), Some("cmd 5"));
    }

    #[test]
    fn roundtrips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history");
        let mut h = History::new(Some(path.clone()));
        h.add("echo one");
        h.add("echo two");
        h.save();

        let reloaded = History::new(Some(path));
        let got: Vec<&str> = reloaded.iter().collect();
        assert_eq!(got, ["echo one", "echo two"]);
    }
}
