//! Executable lookup cache over `$PATH`, refreshed by the `rehash`
//! builtin. Earlier `$PATH` entries win. Names containing `/` bypass the
//! cache entirely (the builder handles those).

use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::{env, fs, io};

pub struct SearchCache {
    imp: HashMap<CString, CString>,
}

impl SearchCache {
    pub fn new() -> SearchCache {
        let mut this = SearchCache {
            imp: HashMap::new(),
        };
        this.rehash();
        this
    }

    fn add_entry(&mut self, entry: io::Result<fs::DirEntry>) -> io::Result<()> {
        use std::os::unix::ffi::OsStringExt;
        let e = entry?;
        let file_name = CString::new(e.file_name().into_vec())?;
        let path = CString::new(e.path().into_os_string().into_vec())?;
        self.imp.entry(file_name).or_insert(path);
        Ok(())
    }

    pub fn rehash(&mut self) {
        self.imp.clear();
        let paths = match env::var_os("PATH") {
            Some(paths) => paths,
            None => return,
        };
        for dir in env::split_paths(&paths) {
            if let Ok(entries) = fs::read_dir(dir) {
                for entry in entries {
                    let _ = self.add_entry(entry);
                }
            }
        }
    }

    pub fn lookup(&self, name: &CStr) -> Option<&CString> {
        self.imp.get(name)
    }
}
