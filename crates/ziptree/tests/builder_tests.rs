use chrono::{TimeZone, Utc};
use std::cell::Cell;
use std::fs;
use std::io::{self, Cursor, Read};
use std::rc::Rc;
use tempfile::TempDir;
use ziptree::{
    AbortKind, ArchiveBuilder, ArchiveError, ArchiveExtractor, BuildOptions, BuildProgress,
    ByteSource, Compression, CopyControl, DirectoryInfo, DiskDirectory, DiskFile, FileAccess,
    FileInfo, FileMode, FileOpenFailure, FileShare, FileSystemInfo, InMemoryFile, RecoveryAction,
    Timestamps,
};

/// Reads the whole content of a file.
fn read_all(file: &dyn FileInfo) -> Vec<u8> {
    let mut content = Vec::new();
    file.open(FileMode::Open, FileAccess::Read, FileShare::READ)
        .unwrap()
        .read_to_end(&mut content)
        .unwrap();
    content
}

fn memory_file(name: &str, content: Vec<u8>) -> Rc<dyn FileInfo> {
    Rc::new(InMemoryFile::new(name, content, None, Timestamps::now()).unwrap())
}

fn stored_names(archive: fs::File) -> Vec<String> {
    ArchiveExtractor::new(archive)
        .unwrap()
        .entries()
        .iter()
        .map(|entry| entry.stored_name().to_string())
        .collect()
}

#[derive(Debug)]
enum Behaviour {
    /// The first n opens fail
    FailOpens(usize),
    /// The stream declares more bytes than it yields
    Truncate(u64),
    /// The second read fails
    FailAfterFirstRead,
}

/// A file whose open and read behaviour is scripted.
#[derive(Debug)]
struct ScriptedFile {
    name: String,
    content: Vec<u8>,
    behaviour: Behaviour,
    opens: Cell<usize>,
}

impl ScriptedFile {
    fn new(name: &str, content: &[u8], behaviour: Behaviour) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_string(),
            content: content.to_vec(),
            behaviour,
            opens: Cell::new(0),
        })
    }
}

struct DeclaredSource {
    inner: Cursor<Vec<u8>>,
    declared: u64,
}

impl Read for DeclaredSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl ByteSource for DeclaredSource {
    fn declared_len(&mut self) -> Option<u64> {
        Some(self.declared)
    }
}

struct FailingSource {
    inner: Cursor<Vec<u8>>,
    reads: usize,
}

impl Read for FailingSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.reads > 0 {
            return Err(io::Error::new(io::ErrorKind::Other, "disk failure"));
        }
        self.reads += 1;
        self.inner.read(buf)
    }
}

impl ByteSource for FailingSource {
    fn declared_len(&mut self) -> Option<u64> {
        None
    }
}

impl FileSystemInfo for ScriptedFile {
    fn full_name(&self) -> &str {
        &self.name
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn exists(&self) -> bool {
        true
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn timestamps(&self) -> Timestamps {
        Timestamps::default()
    }
}

impl FileInfo for ScriptedFile {
    fn len(&self) -> u64 {
        self.content.len() as u64
    }

    fn directory(&self) -> Option<Rc<dyn DirectoryInfo>> {
        None
    }

    fn open(
        &self,
        _mode: FileMode,
        _access: FileAccess,
        _share: FileShare,
    ) -> io::Result<Box<dyn ByteSource>> {
        self.opens.set(self.opens.get() + 1);
        let inner = Cursor::new(self.content.clone());
        match self.behaviour {
            Behaviour::FailOpens(failures) if self.opens.get() <= failures => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file is locked",
            )),
            Behaviour::FailOpens(_) => Ok(Box::new(inner)),
            Behaviour::Truncate(declared) => Ok(Box::new(DeclaredSource { inner, declared })),
            Behaviour::FailAfterFirstRead => Ok(Box::new(FailingSource { inner, reads: 0 })),
        }
    }
}

#[test]
fn test_build_with_disk_files() {
    let temp = TempDir::new().unwrap();
    let first = temp.path().join("file1.txt");
    let second = temp.path().join("file2.txt");
    fs::write(&first, b"first content").unwrap();
    fs::write(&second, b"second").unwrap();

    let mut builder = ArchiveBuilder::new();
    builder.add_file(Rc::new(DiskFile::new(&first)));
    builder.add_file(Rc::new(DiskFile::new(&second)));
    assert_eq!(builder.estimated_file_count(), 2);

    let archive = builder.build(temp.path().join("out.zip")).unwrap();
    let extractor = ArchiveExtractor::new(archive).unwrap();

    let files = extractor.files();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].name(), "file1.txt");
    assert_eq!(read_all(files[0].as_ref()), b"first content");
    assert_eq!(files[1].name(), "file2.txt");
    assert_eq!(read_all(files[1].as_ref()), b"second");
}

#[test]
fn test_build_with_empty_files() {
    let temp = TempDir::new().unwrap();
    let empty_on_disk = temp.path().join("empty.txt");
    fs::write(&empty_on_disk, b"").unwrap();

    let mut builder = ArchiveBuilder::new();
    builder.add_file(Rc::new(DiskFile::new(&empty_on_disk)));
    builder.add_file(memory_file("empty.bin", Vec::new()));

    let archive = builder.build(temp.path().join("out.zip")).unwrap();
    let extractor = ArchiveExtractor::new(archive).unwrap();

    assert_eq!(extractor.len(), 2);
    for file in extractor.files() {
        assert_eq!(file.len(), 0);
        assert!(read_all(file.as_ref()).is_empty());
    }
}

#[test]
fn test_build_keeps_non_ascii_names() {
    let temp = TempDir::new().unwrap();
    let mut builder = ArchiveBuilder::new();
    builder.add_file(memory_file("Ümläut_Größe.txt", b"umlaut".to_vec()));

    let archive = builder.build(temp.path().join("out.zip")).unwrap();

    assert_eq!(stored_names(archive), vec!["Ümläut_Größe.txt"]);
}

#[test]
fn test_round_trip_preserves_every_byte_value() {
    let temp = TempDir::new().unwrap();
    let all_bytes: Vec<u8> = (0..=255u8).collect();
    let large: Vec<u8> = (0..50_000u32).map(|i| (i * 7 % 256) as u8).collect();

    for compression in [Compression::Stored, Compression::Deflated] {
        let mut builder = ArchiveBuilder::with_options(BuildOptions {
            compression,
            ..BuildOptions::default()
        });
        builder.add_file(memory_file("bytes.bin", all_bytes.clone()));
        builder.add_file(memory_file("large.bin", large.clone()));
        builder.add_file(memory_file("empty.bin", Vec::new()));

        let archive = builder.build(temp.path().join("round_trip.zip")).unwrap();
        let extractor = ArchiveExtractor::new(archive).unwrap();

        let files = extractor.files();
        assert_eq!(files.len(), 3);
        assert_eq!(read_all(files[0].as_ref()), all_bytes);
        assert_eq!(read_all(files[1].as_ref()), large);
        assert!(read_all(files[2].as_ref()).is_empty());
    }
}

#[test]
fn test_missing_file_without_handler_fails() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("missing.txt");

    let mut builder = ArchiveBuilder::new();
    builder.add_file(Rc::new(DiskFile::new(&missing)));

    match builder.build(temp.path().join("out.zip")) {
        Err(ArchiveError::FileOpen { path, source }) => {
            assert_eq!(path, missing.to_string_lossy());
            assert_eq!(source.kind(), io::ErrorKind::NotFound);
        }
        other => panic!("expected FileOpen error, got {:?}", other),
    }
}

#[test]
fn test_abort_recovery_action() {
    let temp = TempDir::new().unwrap();
    let mut builder = ArchiveBuilder::new();
    builder.add_file(Rc::new(DiskFile::new(temp.path().join("missing.txt"))));

    let mut failures = Vec::new();
    let result = builder.build_with(
        temp.path().join("out.zip"),
        &mut |_| CopyControl::Continue,
        Some(&mut |failure: &FileOpenFailure<'_>| {
            failures.push(failure.error.kind());
            RecoveryAction::Abort
        }),
    );

    let err = result.unwrap_err();
    let abort = err.as_abort().expect("abort error");
    assert_eq!(abort.kind(), AbortKind::RecoveryAbort);
    assert!(abort.cause().is_none());
    assert!(abort.path().unwrap().ends_with("missing.txt"));
    assert_eq!(failures, vec![io::ErrorKind::NotFound]);
}

#[test]
fn test_default_recovery_action_aborts() {
    let temp = TempDir::new().unwrap();
    let mut builder = ArchiveBuilder::new();
    builder.add_file(Rc::new(DiskFile::new(temp.path().join("missing.txt"))));

    let err = builder
        .build_with(
            temp.path().join("out.zip"),
            &mut |_| CopyControl::Continue,
            Some(&mut |_: &FileOpenFailure<'_>| RecoveryAction::default()),
        )
        .unwrap_err();

    assert_eq!(err.as_abort().unwrap().kind(), AbortKind::RecoveryAbort);
}

#[test]
fn test_ignore_recovery_action_skips_file() {
    let temp = TempDir::new().unwrap();
    let present = temp.path().join("present.txt");
    fs::write(&present, b"here").unwrap();

    let mut builder = ArchiveBuilder::new();
    builder.add_file(Rc::new(DiskFile::new(&present)));
    builder.add_file(Rc::new(DiskFile::new(temp.path().join("missing.txt"))));

    let mut handler_calls = 0;
    let mut indices = Vec::new();
    let archive = builder
        .build_with(
            temp.path().join("out.zip"),
            &mut |progress| {
                indices.push(progress.file_index);
                CopyControl::Continue
            },
            Some(&mut |_: &FileOpenFailure<'_>| {
                handler_calls += 1;
                RecoveryAction::Ignore
            }),
        )
        .unwrap();

    assert_eq!(handler_calls, 1);
    assert_eq!(indices, vec![0]);
    let extractor = ArchiveExtractor::new(archive).unwrap();
    assert_eq!(extractor.len(), 1);
    assert_eq!(extractor.files()[0].name(), "present.txt");
}

#[test]
fn test_ignored_file_still_counts_as_attempt() {
    let temp = TempDir::new().unwrap();
    let mut builder = ArchiveBuilder::new();
    builder.add_file(Rc::new(DiskFile::new(temp.path().join("missing.txt"))));
    builder.add_file(memory_file("after.txt", b"after".to_vec()));

    let mut indices = Vec::new();
    builder
        .build_with(
            temp.path().join("out.zip"),
            &mut |progress| {
                indices.push(progress.file_index);
                CopyControl::Continue
            },
            Some(&mut |_: &FileOpenFailure<'_>| RecoveryAction::Ignore),
        )
        .unwrap();

    assert_eq!(indices, vec![1]);
}

#[test]
fn test_retry_recovery_action_reopens_file() {
    let temp = TempDir::new().unwrap();
    let flaky = ScriptedFile::new("flaky.txt", b"eventually readable", Behaviour::FailOpens(1));

    let mut builder = ArchiveBuilder::new();
    builder.add_file(flaky.clone());

    let mut handler_calls = 0;
    let archive = builder
        .build_with(
            temp.path().join("out.zip"),
            &mut |_| CopyControl::Continue,
            Some(&mut |failure: &FileOpenFailure<'_>| {
                handler_calls += 1;
                assert_eq!(failure.path, "flaky.txt");
                assert_eq!(failure.error.kind(), io::ErrorKind::PermissionDenied);
                RecoveryAction::Retry
            }),
        )
        .unwrap();

    assert_eq!(handler_calls, 1);
    assert_eq!(flaky.opens.get(), 2);
    let extractor = ArchiveExtractor::new(archive).unwrap();
    assert_eq!(read_all(extractor.files()[0].as_ref()), b"eventually readable");
}

#[test]
fn test_retry_until_handler_gives_up() {
    let temp = TempDir::new().unwrap();
    let locked = ScriptedFile::new("locked.txt", b"x", Behaviour::FailOpens(usize::MAX));

    let mut builder = ArchiveBuilder::new();
    builder.add_file(locked.clone());

    let mut handler_calls = 0;
    let err = builder
        .build_with(
            temp.path().join("out.zip"),
            &mut |_| CopyControl::Continue,
            Some(&mut |_: &FileOpenFailure<'_>| {
                handler_calls += 1;
                if handler_calls < 5 {
                    RecoveryAction::Retry
                } else {
                    RecoveryAction::Abort
                }
            }),
        )
        .unwrap_err();

    assert_eq!(handler_calls, 5);
    assert_eq!(locked.opens.get(), 5);
    assert_eq!(err.as_abort().unwrap().kind(), AbortKind::RecoveryAbort);
}

#[test]
fn test_build_with_directory_stores_paths_below_directory_name() {
    let temp = TempDir::new().unwrap();
    let directory = temp.path().join("Directory1");
    fs::create_dir_all(directory.join("Sub")).unwrap();
    fs::write(directory.join("file2.txt"), b"2").unwrap();
    fs::write(directory.join("Sub").join("file3.txt"), b"3").unwrap();

    let mut builder = ArchiveBuilder::new();
    builder.add_directory(Rc::new(DiskDirectory::new(&directory)));
    let archive = builder.build(temp.path().join("out.zip")).unwrap();

    assert_eq!(
        stored_names(archive),
        vec!["Directory1/file2.txt", "Directory1/Sub/file3.txt"]
    );
}

#[test]
fn test_directory_with_trailing_separator_keeps_its_name() {
    let temp = TempDir::new().unwrap();
    let photos = temp.path().join("photos");
    fs::create_dir(&photos).unwrap();
    fs::write(photos.join("a.jpg"), b"jpeg").unwrap();

    let mut builder = ArchiveBuilder::new();
    builder.add_directory(Rc::new(DiskDirectory::new(format!(
        "{}{}",
        photos.display(),
        std::path::MAIN_SEPARATOR
    ))));
    let archive = builder.build(temp.path().join("out.zip")).unwrap();

    assert_eq!(stored_names(archive), vec!["photos/a.jpg"]);
}

#[test]
fn test_directory_with_parent_component_is_resolved() {
    let temp = TempDir::new().unwrap();
    let photos = temp.path().join("photos");
    fs::create_dir_all(photos.join("sub")).unwrap();
    fs::write(photos.join("a.jpg"), b"jpeg").unwrap();

    let mut builder = ArchiveBuilder::new();
    builder.add_directory(Rc::new(DiskDirectory::new(photos.join("sub").join(".."))));
    let archive_path = temp.path().join("out.zip");
    let archive = builder.build(&archive_path).unwrap();
    assert_eq!(stored_names(archive), vec!["photos/a.jpg"]);

    let out = temp.path().join("extracted");
    ziptree::open_archive(&archive_path)
        .unwrap()
        .extract_to(&out)
        .unwrap();
    assert_eq!(fs::read(out.join("photos").join("a.jpg")).unwrap(), b"jpeg");
}

#[test]
fn test_entry_keeps_source_last_write_time() {
    let temp = TempDir::new().unwrap();
    let modified = Utc.with_ymd_and_hms(2021, 6, 7, 8, 9, 10).unwrap();
    let dated = InMemoryFile::new("dated.txt", b"dated".to_vec(), None, Timestamps::uniform(modified))
        .unwrap();

    let mut builder = ArchiveBuilder::new();
    builder.add_file(Rc::new(dated));
    let archive = builder.build(temp.path().join("out.zip")).unwrap();
    let extractor = ArchiveExtractor::new(archive).unwrap();

    assert_eq!(extractor.files()[0].timestamps().modified, modified);

    extractor.extract_to(temp.path().join("out")).unwrap();
    let on_disk = fs::metadata(temp.path().join("out").join("dated.txt"))
        .unwrap()
        .modified()
        .unwrap();
    assert_eq!(chrono::DateTime::<Utc>::from(on_disk), modified);
}

#[test]
fn test_size_is_read_when_the_file_is_written() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("growing.log");
    fs::write(&path, b"abc").unwrap();

    let mut builder = ArchiveBuilder::new();
    builder.add_file(Rc::new(DiskFile::new(&path)));
    fs::write(&path, b"abcdefghij").unwrap();

    let mut sizes = Vec::new();
    let archive = builder
        .build_with(
            temp.path().join("out.zip"),
            &mut |progress| {
                sizes.push((progress.current_file_bytes, progress.estimated_file_size));
                CopyControl::Continue
            },
            None,
        )
        .unwrap();

    assert_eq!(sizes, vec![(10, 10)]);
    let extractor = ArchiveExtractor::new(archive).unwrap();
    assert_eq!(read_all(extractor.files()[0].as_ref()), b"abcdefghij");
}

#[test]
fn test_traversal_writes_files_before_subdirectories() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("root");
    fs::create_dir_all(root.join("a").join("deep")).unwrap();
    fs::create_dir_all(root.join("b")).unwrap();
    fs::write(root.join("a").join("deep").join("d.txt"), b"d").unwrap();
    fs::write(root.join("a").join("a.txt"), b"a").unwrap();
    fs::write(root.join("b").join("b.txt"), b"b").unwrap();
    fs::write(root.join("z.txt"), b"z").unwrap();

    let mut builder = ArchiveBuilder::new();
    builder.add_directory(Rc::new(DiskDirectory::new(&root)));
    let archive = builder.build(temp.path().join("out.zip")).unwrap();

    assert_eq!(
        stored_names(archive),
        vec!["root/z.txt", "root/a/a.txt", "root/a/deep/d.txt", "root/b/b.txt"]
    );
}

#[test]
fn test_multiple_roots_are_flattened_independently() {
    let first_root = TempDir::new().unwrap();
    let second_root = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();

    let dir_a = first_root.path().join("nested").join("DirA");
    fs::create_dir_all(&dir_a).unwrap();
    fs::write(dir_a.join("a.txt"), b"a").unwrap();

    let dir_b = second_root.path().join("DirB");
    fs::create_dir_all(&dir_b).unwrap();
    fs::write(dir_b.join("b.txt"), b"b").unwrap();
    let loose = second_root.path().join("loose.txt");
    fs::write(&loose, b"loose").unwrap();

    let mut builder = ArchiveBuilder::new();
    builder.add_directory(Rc::new(DiskDirectory::new(&dir_a)));
    builder.add_directory(Rc::new(DiskDirectory::new(&dir_b)));
    builder.add_file(Rc::new(DiskFile::new(&loose)));
    let archive = builder.build(output.path().join("out.zip")).unwrap();

    assert_eq!(
        stored_names(archive),
        vec!["DirA/a.txt", "DirB/b.txt", "loose.txt"]
    );
}

#[test]
fn test_add_path_classifies_entries() {
    let temp = TempDir::new().unwrap();
    let directory = temp.path().join("docs");
    fs::create_dir(&directory).unwrap();
    fs::write(directory.join("readme.md"), b"# docs").unwrap();
    let file = temp.path().join("single.txt");
    fs::write(&file, b"single").unwrap();

    let mut builder = ArchiveBuilder::new();
    builder.add_path(&directory).unwrap();
    builder.add_path(&file).unwrap();
    assert_eq!(builder.len(), 2);
    assert_eq!(builder.estimated_file_count(), 1);

    assert!(matches!(
        builder.add_path(temp.path().join("missing")),
        Err(ArchiveError::Io(_))
    ));

    let archive = builder.build(temp.path().join("out.zip")).unwrap();
    assert_eq!(stored_names(archive), vec!["docs/readme.md", "single.txt"]);
}

#[test]
fn test_progress_is_cumulative_across_files() {
    let temp = TempDir::new().unwrap();
    let mut builder = ArchiveBuilder::with_options(BuildOptions {
        copy_buffer_size: 4096,
        ..BuildOptions::default()
    });
    builder.add_file(memory_file("big.bin", vec![1u8; 10_000]));
    builder.add_file(memory_file("small.bin", vec![2u8; 100]));

    let mut events: Vec<(usize, String, u64, u64, u64)> = Vec::new();
    builder
        .build_with(
            temp.path().join("out.zip"),
            &mut |progress: &BuildProgress<'_>| {
                events.push((
                    progress.file_index,
                    progress.current_file.to_string(),
                    progress.current_file_bytes,
                    progress.total_bytes,
                    progress.estimated_file_size,
                ));
                CopyControl::Continue
            },
            None,
        )
        .unwrap();

    assert_eq!(
        events,
        vec![
            (0, "big.bin".to_string(), 4096, 4096, 10_000),
            (0, "big.bin".to_string(), 8192, 8192, 10_000),
            (0, "big.bin".to_string(), 10_000, 10_000, 10_000),
            (1, "small.bin".to_string(), 100, 10_100, 100),
        ]
    );
}

#[test]
fn test_cancel_aborts_without_cause() {
    let temp = TempDir::new().unwrap();
    let mut builder = ArchiveBuilder::new();
    builder.add_file(memory_file("big.bin", vec![0u8; 10_000]));
    builder.add_file(memory_file("never.bin", vec![0u8; 10]));

    let mut events = 0;
    let err = builder
        .build_with(
            temp.path().join("out.zip"),
            &mut |_| {
                events += 1;
                CopyControl::Cancel
            },
            None,
        )
        .unwrap_err();

    assert_eq!(events, 1);
    let abort = err.as_abort().unwrap();
    assert_eq!(abort.kind(), AbortKind::Cancelled);
    assert!(abort.is_cancellation());
    assert!(abort.cause().is_none());
    assert_eq!(abort.path(), Some("big.bin"));
}

#[test]
fn test_mid_copy_failure_aborts_with_cause() {
    let temp = TempDir::new().unwrap();
    let mut builder = ArchiveBuilder::with_options(BuildOptions {
        copy_buffer_size: 4,
        ..BuildOptions::default()
    });
    builder.add_file(ScriptedFile::new(
        "failing.bin",
        b"0123456789",
        Behaviour::FailAfterFirstRead,
    ));

    let mut handler_calls = 0;
    let err = builder
        .build_with(
            temp.path().join("out.zip"),
            &mut |_| CopyControl::Continue,
            Some(&mut |_: &FileOpenFailure<'_>| {
                handler_calls += 1;
                RecoveryAction::Retry
            }),
        )
        .unwrap_err();

    assert_eq!(handler_calls, 0);
    let abort = err.as_abort().unwrap();
    assert_eq!(abort.kind(), AbortKind::CopyFailed);
    assert!(!abort.is_cancellation());
    assert_eq!(abort.path(), Some("failing.bin"));
    assert_eq!(abort.cause().unwrap().to_string(), "disk failure");
    assert!(err.to_string().contains("failing.bin"));
}

#[test]
fn test_truncated_source_aborts_with_unexpected_eof() {
    let temp = TempDir::new().unwrap();
    let mut builder = ArchiveBuilder::new();
    builder.add_file(ScriptedFile::new("short.bin", b"12345", Behaviour::Truncate(10)));

    let err = builder.build(temp.path().join("out.zip")).unwrap_err();

    let abort = err.as_abort().unwrap();
    assert_eq!(abort.kind(), AbortKind::CopyFailed);
    assert_eq!(abort.cause().unwrap().kind(), io::ErrorKind::UnexpectedEof);
}

#[test]
fn test_overlong_source_aborts_with_invalid_data() {
    let temp = TempDir::new().unwrap();
    let mut builder = ArchiveBuilder::new();
    builder.add_file(ScriptedFile::new("long.bin", b"0123456789", Behaviour::Truncate(4)));

    let err = builder.build(temp.path().join("out.zip")).unwrap_err();

    let cause = err.as_abort().unwrap().cause().unwrap();
    assert_eq!(cause.kind(), io::ErrorKind::InvalidData);
    assert_eq!(
        cause.to_string(),
        "The stream returned more data than the stream length (4 bytes) specified."
    );
}

#[test]
fn test_estimated_file_count_grows_during_traversal() {
    let temp = TempDir::new().unwrap();
    let directory = temp.path().join("five");
    fs::create_dir(&directory).unwrap();
    for i in 0..5 {
        fs::write(directory.join(format!("{}.txt", i)), b"data").unwrap();
    }

    let mut builder = ArchiveBuilder::new();
    builder.add_file(memory_file("first.txt", b"first".to_vec()));
    builder.add_directory(Rc::new(DiskDirectory::new(&directory)));
    assert_eq!(builder.estimated_file_count(), 1);

    let mut estimates = Vec::new();
    builder
        .build_with(
            temp.path().join("out.zip"),
            &mut |progress| {
                estimates.push(progress.estimated_file_count);
                CopyControl::Continue
            },
            None,
        )
        .unwrap();

    assert_eq!(estimates, vec![1, 6, 6, 6, 6, 6]);
    assert_eq!(builder.estimated_file_count(), 0);
}

#[test]
fn test_builder_is_reusable() {
    let temp = TempDir::new().unwrap();
    let mut builder = ArchiveBuilder::new();

    builder.add_file(memory_file("first.txt", b"1".to_vec()));
    let first = builder.build(temp.path().join("first.zip")).unwrap();
    assert!(builder.is_empty());
    assert_eq!(builder.estimated_file_count(), 0);

    builder.add_file(memory_file("second.txt", b"2".to_vec()));
    let second = builder.build(temp.path().join("second.zip")).unwrap();

    assert_eq!(stored_names(first), vec!["first.txt"]);
    assert_eq!(stored_names(second), vec!["second.txt"]);
}

#[test]
fn test_failed_build_clears_work_list() {
    let temp = TempDir::new().unwrap();
    let mut builder = ArchiveBuilder::new();
    builder.add_file(Rc::new(DiskFile::new(temp.path().join("missing.txt"))));

    assert!(builder.build(temp.path().join("failed.zip")).is_err());
    assert!(builder.is_empty());
    assert_eq!(builder.estimated_file_count(), 0);

    builder.add_file(memory_file("ok.txt", b"ok".to_vec()));
    let archive = builder.build(temp.path().join("ok.zip")).unwrap();
    assert_eq!(stored_names(archive), vec!["ok.txt"]);
}

#[test]
fn test_in_memory_tree_is_written_like_a_disk_tree() {
    use ziptree::InMemoryDirectory;

    let temp = TempDir::new().unwrap();
    let root = InMemoryDirectory::new("Root", None, Timestamps::now()).unwrap();
    let child = InMemoryDirectory::new("Root/Child", Some(&root), Timestamps::now()).unwrap();
    root.push_directory(Rc::clone(&child));
    root.push_file(Rc::new(
        InMemoryFile::new("Root/top.txt", b"top".to_vec(), Some(&root), Timestamps::now()).unwrap(),
    ));
    child.push_file(Rc::new(
        InMemoryFile::new("Root/Child/leaf.txt", b"leaf".to_vec(), Some(&child), Timestamps::now())
            .unwrap(),
    ));

    let mut builder = ArchiveBuilder::new();
    builder.add_directory(root);
    let archive = builder.build(temp.path().join("out.zip")).unwrap();

    assert_eq!(stored_names(archive), vec!["Root/top.txt", "Root/Child/leaf.txt"]);
}
