//! Conversions between the engine's model and the ZIP codec.
//!
//! ZIP stores `/`-separated paths and local DOS timestamps with two-second
//! resolution. Timestamps are written and read as UTC so a round trip keeps
//! the wall-clock value.

use crate::types::Compression;
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use std::path::MAIN_SEPARATOR_STR;
use std::time::SystemTime;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

/// Both separators are accepted when splitting stored or caller paths.
pub(crate) const SEPARATORS: &[char] = &['/', '\\'];

/// Entries at or above this size need the ZIP64 extension.
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// Entry options for a file of `size` bytes last written at `modified`.
pub(crate) fn entry_options(
    compression: Compression,
    modified: DateTime<Utc>,
    size: u64,
) -> SimpleFileOptions {
    let method = match compression {
        Compression::Stored => CompressionMethod::Stored,
        Compression::Deflated => CompressionMethod::Deflated,
    };
    SimpleFileOptions::default()
        .compression_method(method)
        .last_modified_time(to_zip_time(modified))
        .large_file(size >= ZIP64_THRESHOLD)
}

/// Times outside the DOS range (1980..=2107) fall back to 1980-01-01.
pub(crate) fn to_zip_time(time: DateTime<Utc>) -> zip::DateTime {
    let year = match u16::try_from(time.year()) {
        Ok(year) => year,
        Err(_) => return zip::DateTime::default(),
    };
    zip::DateTime::from_date_and_time(
        year,
        time.month() as u8,
        time.day() as u8,
        time.hour() as u8,
        time.minute() as u8,
        time.second() as u8,
    )
    .unwrap_or_default()
}

/// Missing or invalid times map to the Unix epoch.
pub(crate) fn from_zip_time(time: Option<zip::DateTime>) -> DateTime<Utc> {
    time.and_then(|time| {
        NaiveDate::from_ymd_opt(
            i32::from(time.year()),
            u32::from(time.month()),
            u32::from(time.day()),
        )?
        .and_hms_opt(
            u32::from(time.hour()),
            u32::from(time.minute()),
            u32::from(time.second()),
        )
    })
    .map(|naive| naive.and_utc())
    .unwrap_or_else(|| DateTime::<Utc>::from(SystemTime::UNIX_EPOCH))
}

/// Splits a path on either separator, dropping empty segments.
pub(crate) fn path_segments(path: &str) -> Vec<&str> {
    path.split(SEPARATORS)
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Joins segments with `/`, the separator stored in archives.
pub(crate) fn to_archive_path<S: AsRef<str>>(segments: &[S]) -> String {
    join(segments, "/")
}

/// Joins segments with the platform separator.
pub(crate) fn to_platform_path<S: AsRef<str>>(segments: &[S]) -> String {
    join(segments, MAIN_SEPARATOR_STR)
}

fn join<S: AsRef<str>>(segments: &[S], separator: &str) -> String {
    let mut joined = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            joined.push_str(separator);
        }
        joined.push_str(segment.as_ref());
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_zip_time_round_trip_on_even_seconds() {
        let time = Utc.with_ymd_and_hms(2021, 6, 15, 13, 45, 30).unwrap();
        assert_eq!(from_zip_time(Some(to_zip_time(time))), time);
    }

    #[test]
    fn test_zip_time_before_1980_falls_back() {
        let time = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        let converted = to_zip_time(time);
        assert_eq!(converted.year(), 1980);
        assert_eq!(converted.month(), 1);
        assert_eq!(converted.day(), 1);
    }

    #[test]
    fn test_missing_zip_time_is_epoch() {
        assert_eq!(
            from_zip_time(None),
            DateTime::<Utc>::from(SystemTime::UNIX_EPOCH)
        );
    }

    #[test]
    fn test_path_segments() {
        assert_eq!(path_segments("a/b/c.txt"), vec!["a", "b", "c.txt"]);
        assert_eq!(path_segments("a\\b\\c.txt"), vec!["a", "b", "c.txt"]);
        assert_eq!(path_segments("/a//b/"), vec!["a", "b"]);
        assert!(path_segments("").is_empty());
        assert!(path_segments("//").is_empty());
    }

    #[test]
    fn test_join() {
        assert_eq!(to_archive_path(&["dir", "sub", "file"]), "dir/sub/file");
        assert_eq!(to_archive_path::<&str>(&[]), "");
        assert_eq!(
            to_platform_path(&["dir", "file"]),
            format!("dir{}file", MAIN_SEPARATOR_STR)
        );
    }
}
