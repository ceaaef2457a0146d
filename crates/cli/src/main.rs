//! Command-line interface for building and browsing ZIP archives.
//!
//! This CLI tool builds archives from files and directories, lists the
//! content of an archive and extracts it to disk.

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use ziptree::{
    open_archive, AbortKind, ArchiveBuilder, BuildOptions, BuildProgress, Compression, CopyControl,
    DirectoryInfo, FileInfo, FileOpenFailure, FileSummary, FileSystem, FileSystemInfo, OsFileSystem,
    RecoveryAction, TemporaryFile,
};

#[derive(Parser)]
#[command(name = "ziptree")]
#[command(version, about = "Build, list and extract ZIP archives", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an archive from files and directories
    Create {
        /// Files and directories to add
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Archive to write
        #[arg(short, long)]
        out: PathBuf,

        /// What to do with a file that cannot be opened
        #[arg(long, value_enum, default_value_t = OnError::Abort)]
        on_error: OnError,

        /// Attempts per file before giving up when retrying
        #[arg(long, default_value = "3")]
        max_retries: u32,

        /// Copy buffer size in bytes
        #[arg(long, default_value = "4096")]
        buffer_size: usize,

        /// Store entries without compression
        #[arg(long)]
        stored: bool,
    },

    /// List the files of an archive
    List {
        /// Archive file to list
        archive: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Extract an archive
    Extract {
        /// Archive file to extract
        archive: PathBuf,

        /// Output directory
        #[arg(short, long)]
        out: PathBuf,

        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OnError {
    /// Stop the build
    Abort,
    /// Leave the file out
    Ignore,
    /// Open the file again, up to --max-retries times
    Retry,
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Create {
            inputs,
            out,
            on_error,
            max_retries,
            buffer_size,
            stored,
        } => handle_create(inputs, out, on_error, max_retries, buffer_size, stored),
        Commands::List { archive, json } => handle_list(archive, json),
        Commands::Extract { archive, out, json } => handle_extract(archive, out, json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn handle_create(
    inputs: Vec<PathBuf>,
    out: PathBuf,
    on_error: OnError,
    max_retries: u32,
    buffer_size: usize,
    stored: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = BuildOptions {
        copy_buffer_size: buffer_size,
        compression: if stored {
            Compression::Stored
        } else {
            Compression::Deflated
        },
        ..BuildOptions::default()
    };
    let mut builder = ArchiveBuilder::with_options(options);
    for input in &inputs {
        builder.add_path(input)?;
    }

    let cancel_flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&cancel_flag);
    ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst))?;

    // Build next to the destination, then move into place
    let file_system = OsFileSystem::new();
    let out_dir = match out.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let out_name = out
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or("output path has no file name")?;
    let partial =
        file_system.make_unique_and_valid_file_name(&out_dir, &format!("{}.partial", out_name))?;
    debug!(partial = %partial.display(), "Writing temporary archive");

    let bar = ProgressBar::new(builder.estimated_file_count() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let mut on_progress = |progress: &BuildProgress<'_>| {
        bar.set_length(progress.estimated_file_count as u64);
        bar.set_position(progress.file_index as u64);
        bar.set_message(progress.current_file.to_string());
        if cancel_flag.load(Ordering::SeqCst) {
            CopyControl::Cancel
        } else {
            CopyControl::Continue
        }
    };

    let mut attempts: HashMap<String, u32> = HashMap::new();
    let mut on_open_error = |failure: &FileOpenFailure<'_>| match on_error {
        OnError::Abort => RecoveryAction::Abort,
        OnError::Ignore => {
            bar.println(format!("Skipping {}: {}", failure.path, failure.error));
            RecoveryAction::Ignore
        }
        OnError::Retry => {
            let count = attempts.entry(failure.path.to_string()).or_insert(0);
            *count += 1;
            if *count > max_retries {
                warn!(file = failure.path, attempts = *count, "Giving up");
                RecoveryAction::Abort
            } else {
                RecoveryAction::Retry
            }
        }
    };

    let result = builder.build_with(&partial, &mut on_progress, Some(&mut on_open_error));
    match result {
        Ok(archive) => {
            // Deleted unless the move succeeds
            TemporaryFile::new(archive, &partial, file_system.clone()).persist(&out)?;
            bar.finish_and_clear();
            println!("Created {}", out.display());
            Ok(())
        }
        Err(e) => {
            bar.abandon();
            // No archive handle to own the partial file here
            if file_system.file_exists(&partial) {
                file_system.delete_file(&partial)?;
            }
            if e.as_abort().is_some_and(|abort| abort.kind() == AbortKind::Cancelled) {
                eprintln!("Cancelled");
            }
            Err(e.into())
        }
    }
}

fn handle_list(archive: PathBuf, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let extractor = open_archive(&archive)?;

    if json {
        let summaries: Vec<FileSummary> = extractor
            .files()
            .iter()
            .map(|file| FileSummary::of(file.as_ref()))
            .collect();
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        println!("{}", archive.display());
        print_tree(extractor.as_directory(), 1)?;
        println!("{} files", extractor.len());
    }

    Ok(())
}

fn print_tree(directory: Rc<dyn DirectoryInfo>, depth: usize) -> std::io::Result<()> {
    let indent = "  ".repeat(depth);
    for subdirectory in directory.directories()? {
        println!("{}{}/", indent, subdirectory.name());
        print_tree(subdirectory, depth + 1)?;
    }
    for file in directory.files()? {
        println!(
            "{}{}  {} bytes  {}",
            indent,
            file.name(),
            file.len(),
            file.timestamps().modified.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

fn handle_extract(
    archive: PathBuf,
    out: PathBuf,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let stats = open_archive(&archive)?.extract_to(&out)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!(
            "Extracted {} files ({} bytes) to {} in {:.2}s",
            stats.files_extracted,
            stats.bytes_written,
            out.display(),
            stats.duration.as_secs_f64()
        );
    }

    Ok(())
}
