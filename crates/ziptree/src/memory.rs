//! In-memory files and directories.
//!
//! Used to hand byte buffers to the builder and to synthesize the directory
//! tree of an opened archive.

use crate::entry::{
    ensure_read_only_access, last_segment, DirectoryInfo, FileAccess, FileInfo, FileMode,
    FileShare, FileSystemInfo, Timestamps,
};
use crate::error::ArchiveError;
use crate::stream::ByteSource;
use std::cell::RefCell;
use std::io::{self, Cursor};
use std::rc::{Rc, Weak};

/// Downgrades an in-memory directory to a weak parent reference.
pub(crate) fn weak_parent(directory: &Rc<InMemoryDirectory>) -> Weak<dyn DirectoryInfo> {
    let directory: Rc<dyn DirectoryInfo> = directory.clone();
    Rc::downgrade(&directory)
}

/// A read-only file backed by a byte buffer.
///
/// Every [`open`](FileInfo::open) yields a fresh reader positioned at the
/// start of the buffer.
#[derive(Debug)]
pub struct InMemoryFile {
    full_name: String,
    content: Rc<[u8]>,
    directory: Option<Weak<dyn DirectoryInfo>>,
    timestamps: Timestamps,
}

impl InMemoryFile {
    /// Creates a file named `full_name`.
    ///
    /// The file is not added to `directory`'s file list; callers building a
    /// tree do that with [`InMemoryDirectory::push_file`].
    pub fn new(
        full_name: impl Into<String>,
        content: impl Into<Rc<[u8]>>,
        directory: Option<&Rc<InMemoryDirectory>>,
        timestamps: Timestamps,
    ) -> Result<Self, ArchiveError> {
        let full_name = full_name.into();
        if full_name.is_empty() {
            return Err(ArchiveError::InvalidPath(
                "file name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            full_name,
            content: content.into(),
            directory: directory.map(weak_parent),
            timestamps,
        })
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }
}

impl FileSystemInfo for InMemoryFile {
    fn full_name(&self) -> &str {
        &self.full_name
    }

    fn name(&self) -> &str {
        last_segment(&self.full_name)
    }

    fn exists(&self) -> bool {
        true
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn timestamps(&self) -> Timestamps {
        self.timestamps
    }
}

impl FileInfo for InMemoryFile {
    fn len(&self) -> u64 {
        self.content.len() as u64
    }

    fn directory(&self) -> Option<Rc<dyn DirectoryInfo>> {
        self.directory.as_ref().and_then(Weak::upgrade)
    }

    fn open(
        &self,
        _mode: FileMode,
        access: FileAccess,
        _share: FileShare,
    ) -> io::Result<Box<dyn ByteSource>> {
        ensure_read_only_access(&self.full_name, access)?;
        Ok(Box::new(Cursor::new(Rc::clone(&self.content))))
    }
}

/// A directory whose children are explicit lists.
///
/// The lists are filled once while a tree is put together (by
/// [`DirectoryTreeResolver`](crate::resolver::DirectoryTreeResolver) or by a
/// caller); a child added here must name this directory as its parent.
#[derive(Debug)]
pub struct InMemoryDirectory {
    full_name: String,
    parent: Option<Weak<dyn DirectoryInfo>>,
    timestamps: Timestamps,
    files: RefCell<Vec<Rc<dyn FileInfo>>>,
    directories: RefCell<Vec<Rc<InMemoryDirectory>>>,
}

impl InMemoryDirectory {
    pub fn new(
        full_name: impl Into<String>,
        parent: Option<&Rc<InMemoryDirectory>>,
        timestamps: Timestamps,
    ) -> Result<Rc<Self>, ArchiveError> {
        let full_name = full_name.into();
        if full_name.is_empty() {
            return Err(ArchiveError::InvalidPath(
                "directory name must not be empty".to_string(),
            ));
        }
        Ok(Rc::new(Self {
            full_name,
            parent: parent.map(weak_parent),
            timestamps,
            files: RefCell::new(Vec::new()),
            directories: RefCell::new(Vec::new()),
        }))
    }

    pub fn push_file(&self, file: Rc<dyn FileInfo>) {
        self.files.borrow_mut().push(file);
    }

    pub fn push_directory(&self, directory: Rc<InMemoryDirectory>) {
        self.directories.borrow_mut().push(directory);
    }

    /// Finds a direct subdirectory by its full name.
    pub fn find_directory(&self, full_name: &str) -> Option<Rc<InMemoryDirectory>> {
        self.directories
            .borrow()
            .iter()
            .find(|directory| directory.full_name == full_name)
            .cloned()
    }

    /// Direct subdirectories with their concrete type.
    pub fn subdirectories(&self) -> Vec<Rc<InMemoryDirectory>> {
        self.directories.borrow().clone()
    }
}

impl FileSystemInfo for InMemoryDirectory {
    fn full_name(&self) -> &str {
        &self.full_name
    }

    fn name(&self) -> &str {
        last_segment(&self.full_name)
    }

    fn extension(&self) -> Option<&str> {
        None
    }

    fn exists(&self) -> bool {
        true
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn timestamps(&self) -> Timestamps {
        self.timestamps
    }
}

impl DirectoryInfo for InMemoryDirectory {
    fn parent(&self) -> Option<Rc<dyn DirectoryInfo>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    fn files(&self) -> io::Result<Vec<Rc<dyn FileInfo>>> {
        Ok(self.files.borrow().clone())
    }

    fn directories(&self) -> io::Result<Vec<Rc<dyn DirectoryInfo>>> {
        Ok(self
            .directories
            .borrow()
            .iter()
            .map(|directory| Rc::clone(directory) as Rc<dyn DirectoryInfo>)
            .collect())
    }
}
