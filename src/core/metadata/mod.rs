//! # Metadata Module
//!
//! Extracts the capture timestamp of a photo.
//!
//! ## Extraction Modes
//! - **Strict** - EXIF `DateTimeOriginal` only
//! - **Normal** - `DateTimeOriginal`, then the image `DateTime` tag
//! - **Flexible** - any of the above, then the file modification time
//!
//! The organizer only consumes the chosen timestamp (or its absence)
//! through the [`TimestampExtractor`] trait, so tests and callers with
//! their own metadata source can plug in a closure.

use crate::error::MetadataError;
use chrono::{DateTime, Local, NaiveDateTime};
use exif::{In, Reader, Tag, Value};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

/// How hard to look for a capture timestamp
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    Strict,
    #[default]
    Normal,
    Flexible,
}

impl ExtractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Normal => "normal",
            Self::Flexible => "flexible",
        }
    }

    /// Pick a timestamp from the candidates according to this mode
    pub fn select(&self, times: &CaptureTimes) -> Option<NaiveDateTime> {
        match self {
            Self::Strict => times.original,
            Self::Normal => times.original.or(times.digitized),
            Self::Flexible => times.original.or(times.digitized).or(times.modified),
        }
    }
}

/// All timestamp candidates found for a file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureTimes {
    /// EXIF `DateTimeOriginal`
    pub original: Option<NaiveDateTime>,
    /// EXIF image `DateTime`
    pub digitized: Option<NaiveDateTime>,
    /// File modification time, in local time
    pub modified: Option<NaiveDateTime>,
}

/// Source of capture timestamps consumed by the organizer
pub trait TimestampExtractor: Send + Sync {
    /// Best-effort capture timestamp for `path`, `None` when unknown
    fn extract(
        &self,
        path: &Path,
        mode: ExtractionMode,
    ) -> Result<Option<NaiveDateTime>, MetadataError>;
}

impl<F> TimestampExtractor for F
where
    F: Fn(&Path, ExtractionMode) -> Result<Option<NaiveDateTime>, MetadataError> + Send + Sync,
{
    fn extract(
        &self,
        path: &Path,
        mode: ExtractionMode,
    ) -> Result<Option<NaiveDateTime>, MetadataError> {
        self(path, mode)
    }
}

/// Reads timestamps from EXIF tags with a file-time fallback
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifExtractor;

impl ExifExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Collect every timestamp candidate for a file.
    ///
    /// Files without EXIF data are not an error; they simply have no EXIF
    /// candidates. A file that cannot be opened at all is.
    pub fn read_capture_times(&self, path: &Path) -> Result<CaptureTimes, MetadataError> {
        let file = File::open(path).map_err(|source| MetadataError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut times = CaptureTimes::default();

        let mut bufreader = BufReader::new(&file);
        match Reader::new().read_from_container(&mut bufreader) {
            Ok(exif) => {
                times.original = exif
                    .get_field(Tag::DateTimeOriginal, In::PRIMARY)
                    .and_then(|f| parse_exif_datetime(&f.value));
                times.digitized = exif
                    .get_field(Tag::DateTime, In::PRIMARY)
                    .and_then(|f| parse_exif_datetime(&f.value));
            }
            Err(exif::Error::NotFound(_)) | Err(exif::Error::InvalidFormat(_)) => {}
            Err(e) => {
                tracing::debug!("Unreadable EXIF in {}: {}", path.display(), e);
            }
        }

        times.modified = fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .map(|t| DateTime::<Local>::from(t).naive_local());

        Ok(times)
    }
}

impl TimestampExtractor for ExifExtractor {
    fn extract(
        &self,
        path: &Path,
        mode: ExtractionMode,
    ) -> Result<Option<NaiveDateTime>, MetadataError> {
        Ok(mode.select(&self.read_capture_times(path)?))
    }
}

/// Parse an EXIF ASCII datetime ("YYYY:MM:DD HH:MM:SS")
fn parse_exif_datetime(value: &Value) -> Option<NaiveDateTime> {
    let Value::Ascii(ref vec) = value else {
        return None;
    };
    let s = std::str::from_utf8(vec.first()?).ok()?;
    parse_datetime_str(s)
}

fn parse_datetime_str(s: &str) -> Option<NaiveDateTime> {
    let trimmed = s.trim_end_matches('\0').trim();
    NaiveDateTime::parse_from_str(trimmed, "%Y:%m:%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S"))
        .ok()
}
