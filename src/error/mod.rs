//! # Error Module
//!
//! Error types for the photo organizer.
//!
//! ## Design Principles
//! - **Never panic** on user data - return errors instead
//! - **Include context** - paths, file names, what went wrong
//! - **Per-entry vs run-level** - a bad file is recorded and skipped,
//!   an unwritable journal stops the run

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum OrbitError {
    #[error("Scanning error: {0}")]
    Scan(#[from] ScanError),

    #[error("Invalid date pattern: {0}")]
    Pattern(#[from] PatternError),

    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("Report generation error: {0}")]
    Report(#[from] ReportError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Destination {path} is not writable: {source}")]
    DestinationUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Run aborted after {completed} completed operations ({pending} pending): {source}. \
         Completed work is recorded; run `resume` once the problem is fixed."
    )]
    RunAborted {
        completed: usize,
        pending: usize,
        #[source]
        source: JournalError,
    },
}

/// Errors that occur while discovering source files
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("Failed to read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk directory tree: {0}")]
    Walk(String),
}

/// Errors from capture timestamp extraction. Never fatal: the timestamp is
/// treated as absent.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that occur while computing a content digest
#[derive(Error, Debug)]
pub enum HashError {
    #[error("Failed to read {path} for hashing: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors in a destination date pattern
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("pattern is empty")]
    Empty,

    #[error("unsupported format code '{code}' in '{pattern}'")]
    UnsupportedCode { pattern: String, code: String },

    #[error("pattern '{0}' must be relative and must not contain '.' or '..' segments")]
    NotRelative(String),
}

/// Errors while computing a destination for a single entry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("{path} has no file name")]
    MissingFileName { path: PathBuf },

    #[error("no free name for {destination} after {attempts} numeric suffixes")]
    PathConflictUnresolvable { destination: PathBuf, attempts: u32 },
}

/// Errors from the operation journal. Write failures are fatal to a run.
#[derive(Error, Debug)]
pub enum JournalError {
    #[error("Failed to write journal {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read journal {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode journal record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Operation {id} was never planned in this journal")]
    UnknownOperation { id: u64 },

    #[error("No journal found at {path}. Nothing to resume or undo.")]
    NotFound { path: PathBuf },

    #[error(
        "Journal {path} has {pending} unfinished operations. Run `resume` or `undo` before starting a new run."
    )]
    UnfinishedRun { path: PathBuf, pending: usize },

    #[error("Another run holds the lock on {path}")]
    Locked { path: PathBuf },
}

/// Errors from a single copy/move. Recorded as `failed`; the run continues.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Source file not found: {path}")]
    SourceMissing { path: PathBuf },

    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove source {path} after move: {source}")]
    RemoveSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("verification-mismatch: {destination} does not match {source_path}")]
    VerificationMismatch {
        source_path: PathBuf,
        destination: PathBuf,
    },

    #[error("Failed to hash during verification: {0}")]
    Hash(#[from] HashError),
}

/// Errors that occur during report generation
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("No trace found at {path}. Run a simulation first to create one.")]
    TraceNotFound { path: PathBuf },

    #[error("Failed to read trace {path}: {reason}")]
    TraceUnreadable { path: PathBuf, reason: String },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write duplicate CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Stage at which a per-entry problem was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStage {
    Scan,
    Metadata,
    Hash,
    PathMapping,
    Execution,
    Undo,
}

/// A non-fatal problem tied to one file, kept for the summary and trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingError {
    pub path: PathBuf,
    pub stage: ErrorStage,
    pub message: String,
}

impl ProcessingError {
    pub fn new(path: impl Into<PathBuf>, stage: ErrorStage, message: impl ToString) -> Self {
        Self {
            path: path.into(),
            stage,
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}: {}", self.stage, self.path.display(), self.message)
    }
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, OrbitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_error_includes_path() {
        let error = ScanError::DirectoryNotFound {
            path: PathBuf::from("/photos/vacation"),
        };
        assert!(error.to_string().contains("/photos/vacation"));
    }

    #[test]
    fn verification_mismatch_is_distinct() {
        let error = ExecutionError::VerificationMismatch {
            source_path: PathBuf::from("/src/a.jpg"),
            destination: PathBuf::from("/dst/2024/a.jpg"),
        };
        let message = error.to_string();
        assert!(message.starts_with("verification-mismatch"));
        assert!(message.contains("/dst/2024/a.jpg"));
    }

    #[test]
    fn unfinished_run_suggests_recovery() {
        let error = JournalError::UnfinishedRun {
            path: PathBuf::from("/dst/.orbit_journal.jsonl"),
            pending: 3,
        };
        let message = error.to_string();
        assert!(message.contains("resume"));
        assert!(message.contains("undo"));
    }

    #[test]
    fn run_aborted_reports_progress() {
        let error = OrbitError::RunAborted {
            completed: 7,
            pending: 5,
            source: JournalError::Write {
                path: PathBuf::from("/dst/.orbit_journal.jsonl"),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            },
        };
        let message = error.to_string();
        assert!(message.contains("7 completed"));
        assert!(message.contains("5 pending"));
    }

    #[test]
    fn processing_error_display_includes_stage() {
        let error = ProcessingError::new("/a/b.jpg", ErrorStage::Hash, "permission denied");
        assert_eq!(error.to_string(), "[Hash] /a/b.jpg: permission denied");
    }
}
