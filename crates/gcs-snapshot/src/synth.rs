//! Directory synthesis for flat object listings.
//!
//! A bucket has no directories, only keys. The importer must still hand the
//! snapshot engine a tree in which every directory is announced before
//! anything beneath it. [`TreeSynthesizer`] remembers which directories
//! have been announced and, for each new file path, yields the missing
//! ancestors in root-to-leaf order. Each directory is yielded once per
//! scan, whatever order the listing arrives in.

use std::collections::HashSet;

use crate::record::{parent_dir, FileRecord};

/// Single-pass directory synthesizer.
#[derive(Debug, Default)]
pub struct TreeSynthesizer {
    emitted: HashSet<String>,
}

impl TreeSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records for the scan root and its ancestors up to `/`, each once.
    pub fn emit_root(&mut self, root: &str) -> Vec<FileRecord> {
        self.climb(root)
    }

    /// Records for the not-yet-emitted ancestors of `path`, root first.
    pub fn ancestors_of(&mut self, path: &str) -> Vec<FileRecord> {
        self.climb(parent_dir(path))
    }

    /// Whether `dir` has been emitted.
    pub fn is_emitted(&self, dir: &str) -> bool {
        self.emitted.contains(dir)
    }

    /// Number of directories emitted so far.
    pub fn len(&self) -> usize {
        self.emitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emitted.is_empty()
    }

    fn climb(&mut self, start: &str) -> Vec<FileRecord> {
        let mut missing = Vec::new();
        let mut dir = start;
        while !self.emitted.contains(dir) {
            missing.push(dir.to_string());
            if dir == "/" {
                break;
            }
            dir = parent_dir(dir);
        }

        missing
            .into_iter()
            .rev()
            .map(|dir| {
                self.emitted.insert(dir.clone());
                FileRecord::directory(dir)
            })
            .collect()
    }
}
