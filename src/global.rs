//! Shared shell state, passed explicitly to every component that needs it.

use crate::history::History;
use crate::job::JobTable;
use crate::search::SearchCache;
use crate::term::Terminal;

pub struct State {
    pub search_cache: SearchCache,
    pub jobs: JobTable,
    pub history: History,
    pub term: Terminal,
}

impl State {
    pub fn new() -> State {
        State {
            search_cache: SearchCache::new(),
            jobs: JobTable::new(),
            history: History::new(History::default_path()),
            term: Terminal::new(),
        }
    }
}
