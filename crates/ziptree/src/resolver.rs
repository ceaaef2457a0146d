//! Turns flat paths into a shared in-memory directory tree.

use crate::codec::{path_segments, to_platform_path};
use crate::entry::{FileInfo, Timestamps};
use crate::error::ArchiveError;
use crate::memory::InMemoryDirectory;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::trace;

/// Resolves paths to [`InMemoryDirectory`] nodes, creating each directory
/// once.
///
/// Paths are split on `/` and `\`; full names are joined with the platform
/// separator. Resolving the same path twice returns the same `Rc`.
#[derive(Debug)]
pub struct DirectoryTreeResolver {
    timestamps: Timestamps,
    cache: HashMap<String, Rc<InMemoryDirectory>>,
    roots: Vec<Rc<InMemoryDirectory>>,
}

impl DirectoryTreeResolver {
    /// Every directory created by this resolver gets `timestamps`.
    pub fn new(timestamps: Timestamps) -> Self {
        Self {
            timestamps,
            cache: HashMap::new(),
            roots: Vec::new(),
        }
    }

    /// Returns the directory for `path`, creating it and any missing
    /// ancestors.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::InvalidPath`] when `path` has no segments.
    pub fn resolve_leaf(&mut self, path: &str) -> Result<Rc<InMemoryDirectory>, ArchiveError> {
        let segments = path_segments(path);
        self.resolve_segments(&segments)?
            .ok_or_else(|| ArchiveError::InvalidPath(format!("'{}' has no path segments", path)))
    }

    /// Resolves the directory part of `path` and builds the file for its last
    /// segment with `factory`.
    ///
    /// The factory receives the file name and the resolved directory, `None`
    /// when `path` has a single segment. A file with a directory is added to
    /// that directory's file list.
    pub fn resolve_file_with_path<F>(
        &mut self,
        path: &str,
        factory: F,
    ) -> Result<Rc<dyn FileInfo>, ArchiveError>
    where
        F: FnOnce(&str, Option<&Rc<InMemoryDirectory>>) -> Result<Rc<dyn FileInfo>, ArchiveError>,
    {
        let segments = path_segments(path);
        let (file_name, directory_segments) = segments
            .split_last()
            .ok_or_else(|| ArchiveError::InvalidPath(format!("'{}' has no path segments", path)))?;

        let directory = self.resolve_segments(directory_segments)?;
        let file = factory(file_name, directory.as_ref())?;
        if let Some(directory) = &directory {
            directory.push_file(Rc::clone(&file));
        }
        Ok(file)
    }

    /// Top-level directories, in the order they were first seen.
    pub fn root_directories(&self) -> &[Rc<InMemoryDirectory>] {
        &self.roots
    }

    fn resolve_segments(
        &mut self,
        segments: &[&str],
    ) -> Result<Option<Rc<InMemoryDirectory>>, ArchiveError> {
        let mut current: Option<Rc<InMemoryDirectory>> = None;
        for depth in 1..=segments.len() {
            let full_name = to_platform_path(&segments[..depth]);
            let directory = match self.cache.get(&full_name) {
                Some(directory) => Rc::clone(directory),
                None => {
                    let directory =
                        InMemoryDirectory::new(full_name.clone(), current.as_ref(), self.timestamps)?;
                    match &current {
                        Some(parent) => parent.push_directory(Rc::clone(&directory)),
                        None => self.roots.push(Rc::clone(&directory)),
                    }
                    trace!(directory = %full_name, "Created directory node");
                    self.cache.insert(full_name, Rc::clone(&directory));
                    directory
                }
            };
            current = Some(directory);
        }
        Ok(current)
    }
}
