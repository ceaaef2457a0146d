//! Files and directories on the physical file system.
//!
//! Attributes are read from disk metadata, cached, and re-read by
//! [`refresh`](FileSystemInfo::refresh). Directory enumeration always hits
//! the file system.

use crate::entry::{
    DirectoryInfo, FileAccess, FileInfo, FileMode, FileShare, FileSystemInfo, Timestamps,
};
use crate::stream::ByteSource;
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::fs::{self, File, FileTimes, Metadata, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;
use std::time::SystemTime;
use walkdir::WalkDir;

/// Absolute form of `path` with `.`, `..` and trailing separators folded
/// away lexically.
fn absolutize(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Last path component; empty for a root.
fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn parent_of(path: &Path) -> Option<Rc<dyn DirectoryInfo>> {
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(|parent| Rc::new(DiskDirectory::new(parent)) as Rc<dyn DirectoryInfo>)
}

/// Builds the `OpenOptions` for a mode and access pair.
pub(crate) fn open_options(mode: FileMode, access: FileAccess, share: FileShare) -> OpenOptions {
    let mut options = OpenOptions::new();
    options.read(access.can_read()).write(access.can_write());
    match mode {
        FileMode::Open => {}
        FileMode::OpenOrCreate => {
            options.create(true);
        }
        FileMode::Create => {
            options.create(true).truncate(true);
        }
        FileMode::CreateNew => {
            options.create_new(true);
        }
        FileMode::Truncate => {
            options.truncate(true);
        }
        FileMode::Append => {
            options.append(true).create(true);
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::fs::OpenOptionsExt;
        options.share_mode(share.bits());
    }
    #[cfg(not(windows))]
    let _ = share;

    options
}

/// A file on disk.
#[derive(Debug)]
pub struct DiskFile {
    path: PathBuf,
    full_name: String,
    name: String,
    metadata: RefCell<Option<Metadata>>,
}

impl DiskFile {
    /// Wraps `path`. Relative paths are made absolute against the current
    /// directory; the file need not exist.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = absolutize(path.as_ref());
        Self {
            full_name: path.to_string_lossy().into_owned(),
            name: file_name_of(&path),
            metadata: RefCell::new(fs::metadata(&path).ok()),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sets the last-write time and refreshes the cached metadata.
    pub fn set_last_write_time_utc(&self, time: DateTime<Utc>) -> io::Result<()> {
        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_times(FileTimes::new().set_modified(SystemTime::from(time)))?;
        drop(file);
        self.refresh();
        Ok(())
    }
}

impl FileSystemInfo for DiskFile {
    fn physical_path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn full_name(&self) -> &str {
        &self.full_name
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn exists(&self) -> bool {
        self.metadata
            .borrow()
            .as_ref()
            .is_some_and(Metadata::is_file)
    }

    fn is_read_only(&self) -> bool {
        self.metadata
            .borrow()
            .as_ref()
            .is_some_and(|metadata| metadata.permissions().readonly())
    }

    fn timestamps(&self) -> Timestamps {
        self.metadata
            .borrow()
            .as_ref()
            .map(Timestamps::from_metadata)
            .unwrap_or_default()
    }

    fn refresh(&self) {
        *self.metadata.borrow_mut() = fs::metadata(&self.path).ok();
    }
}

impl FileInfo for DiskFile {
    fn len(&self) -> u64 {
        self.metadata
            .borrow()
            .as_ref()
            .map_or(0, Metadata::len)
    }

    fn directory(&self) -> Option<Rc<dyn DirectoryInfo>> {
        parent_of(&self.path)
    }

    fn open(
        &self,
        mode: FileMode,
        access: FileAccess,
        share: FileShare,
    ) -> io::Result<Box<dyn ByteSource>> {
        let file: File = open_options(mode, access, share).open(&self.path)?;
        Ok(Box::new(file))
    }
}

/// A directory on disk.
#[derive(Debug)]
pub struct DiskDirectory {
    path: PathBuf,
    full_name: String,
    name: String,
    metadata: RefCell<Option<Metadata>>,
}

impl DiskDirectory {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = absolutize(path.as_ref());
        Self {
            full_name: path.to_string_lossy().into_owned(),
            name: file_name_of(&path),
            metadata: RefCell::new(fs::metadata(&path).ok()),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Direct children sorted by file name.
    fn children(&self) -> io::Result<Vec<walkdir::DirEntry>> {
        WalkDir::new(&self.path)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .map(|entry| entry.map_err(io::Error::from))
            .collect()
    }
}

impl FileSystemInfo for DiskDirectory {
    fn physical_path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn full_name(&self) -> &str {
        &self.full_name
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn extension(&self) -> Option<&str> {
        None
    }

    fn exists(&self) -> bool {
        self.metadata.borrow().as_ref().is_some_and(Metadata::is_dir)
    }

    fn is_read_only(&self) -> bool {
        self.metadata
            .borrow()
            .as_ref()
            .is_some_and(|metadata| metadata.permissions().readonly())
    }

    fn timestamps(&self) -> Timestamps {
        self.metadata
            .borrow()
            .as_ref()
            .map(Timestamps::from_metadata)
            .unwrap_or_default()
    }

    fn refresh(&self) {
        *self.metadata.borrow_mut() = fs::metadata(&self.path).ok();
    }
}

impl DirectoryInfo for DiskDirectory {
    fn parent(&self) -> Option<Rc<dyn DirectoryInfo>> {
        parent_of(&self.path)
    }

    fn files(&self) -> io::Result<Vec<Rc<dyn FileInfo>>> {
        Ok(self
            .children()?
            .into_iter()
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| Rc::new(DiskFile::new(entry.into_path())) as Rc<dyn FileInfo>)
            .collect())
    }

    fn directories(&self) -> io::Result<Vec<Rc<dyn DirectoryInfo>>> {
        Ok(self
            .children()?
            .into_iter()
            .filter(|entry| entry.file_type().is_dir())
            .map(|entry| Rc::new(DiskDirectory::new(entry.into_path())) as Rc<dyn DirectoryInfo>)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::{Read, Write};
    use tempfile::TempDir;

    #[test]
    fn test_disk_file_attributes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.txt");
        fs::write(&path, b"hello").unwrap();

        let file = DiskFile::new(&path);
        assert!(file.exists());
        assert_eq!(file.len(), 5);
        assert_eq!(file.name(), "notes.txt");
        assert_eq!(file.extension(), Some("txt"));
        assert_eq!(file.physical_path(), Some(path.as_path()));
        assert!(!file.is_read_only());

        let directory = file.directory().unwrap();
        assert_eq!(directory.physical_path(), Some(temp.path()));
    }

    #[test]
    fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        let file = DiskFile::new(temp.path().join("missing.bin"));

        assert!(!file.exists());
        assert_eq!(file.len(), 0);
        let err = file
            .open(FileMode::Open, FileAccess::Read, FileShare::READ)
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_refresh_rereads_metadata() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("grow.txt");
        let file = DiskFile::new(&path);
        assert!(!file.exists());

        fs::write(&path, b"abc").unwrap();
        assert!(!file.exists());
        file.refresh();
        assert!(file.exists());
        assert_eq!(file.len(), 3);
    }

    #[test]
    fn test_open_modes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("modes.txt");
        let file = DiskFile::new(&path);

        let mut created = file
            .open(FileMode::CreateNew, FileAccess::Write, FileShare::NONE)
            .unwrap();
        created.as_writer().unwrap().write_all(b"first").unwrap();
        drop(created);

        let err = file
            .open(FileMode::CreateNew, FileAccess::Write, FileShare::NONE)
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);

        let mut appended = file
            .open(FileMode::Append, FileAccess::Write, FileShare::NONE)
            .unwrap();
        appended.as_writer().unwrap().write_all(b"+more").unwrap();
        drop(appended);

        let mut reader = file
            .open(FileMode::Open, FileAccess::Read, FileShare::READ)
            .unwrap();
        assert_eq!(reader.declared_len(), Some(10));
        let mut content = String::new();
        reader.read_to_string(&mut content).unwrap();
        assert_eq!(content, "first+more");
    }

    #[test]
    fn test_set_last_write_time() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dated.txt");
        fs::write(&path, b"x").unwrap();
        let file = DiskFile::new(&path);

        let time = Utc.with_ymd_and_hms(2010, 5, 4, 3, 2, 0).unwrap();
        file.set_last_write_time_utc(time).unwrap();

        assert_eq!(file.timestamps().modified, time);
    }

    #[test]
    fn test_disk_directory_enumeration() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.txt"), b"b").unwrap();
        fs::write(temp.path().join("a.txt"), b"a").unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();
        fs::write(temp.path().join("sub").join("c.txt"), b"c").unwrap();

        let directory = DiskDirectory::new(temp.path());
        assert!(directory.exists());

        let names: Vec<String> = directory
            .files()
            .unwrap()
            .iter()
            .map(|file| file.name().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);

        let subdirectories = directory.directories().unwrap();
        assert_eq!(subdirectories.len(), 1);
        assert_eq!(subdirectories[0].name(), "sub");
        assert_eq!(
            subdirectories[0].parent().unwrap().physical_path(),
            Some(temp.path())
        );
        assert_eq!(subdirectories[0].files().unwrap().len(), 1);
    }

    #[test]
    fn test_directory_path_is_normalized() {
        let temp = TempDir::new().unwrap();
        let photos = temp.path().join("photos");
        fs::create_dir_all(photos.join("sub")).unwrap();

        let trailing = DiskDirectory::new(format!("{}{}", photos.display(), std::path::MAIN_SEPARATOR));
        assert_eq!(trailing.name(), "photos");
        assert_eq!(trailing.path(), photos.as_path());

        let dotted = DiskDirectory::new(photos.join(".").join("sub").join(".."));
        assert_eq!(dotted.name(), "photos");
        assert_eq!(dotted.path(), photos.as_path());
        assert!(dotted.exists());

        let file = DiskFile::new(photos.join("sub").join("..").join("a.jpg"));
        assert_eq!(file.path(), photos.join("a.jpg").as_path());
        assert_eq!(file.directory().unwrap().name(), "photos");
    }

    #[cfg(unix)]
    #[test]
    fn test_backslash_is_part_of_a_unix_file_name() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a\\b.txt");
        fs::write(&path, b"x").unwrap();

        let file = DiskFile::new(&path);
        assert_eq!(file.name(), "a\\b.txt");

        let directory = DiskDirectory::new(temp.path());
        assert_eq!(directory.files().unwrap()[0].name(), "a\\b.txt");
    }

    #[test]
    fn test_enumeration_is_live() {
        let temp = TempDir::new().unwrap();
        let directory = DiskDirectory::new(temp.path());
        assert!(directory.files().unwrap().is_empty());

        fs::write(temp.path().join("late.txt"), b"").unwrap();
        assert_eq!(directory.files().unwrap().len(), 1);
    }
}
