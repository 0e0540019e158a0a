//! Event type definitions for progress reporting.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// All events emitted while organizing photos
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Source discovery
    Scan(ScanEvent),
    /// Metadata lookups, hashing and path mapping
    Plan(PlanEvent),
    /// Copy/move execution
    Execute(ExecuteEvent),
    /// Reversal of a previous run
    Undo(UndoEvent),
    /// Run-level events
    Pipeline(PipelineEvent),
}

/// Events during the scanning phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScanEvent {
    /// Scanning has started
    Started { paths: Vec<PathBuf> },
    /// Progress update during scanning
    Progress(ScanProgress),
    /// An error occurred but scanning continues
    Error { path: PathBuf, message: String },
    /// Scanning completed
    Completed { total_photos: usize },
}

/// Progress information during scanning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanProgress {
    /// Number of photos found so far
    pub photos_found: usize,
    /// Most recent photo found
    pub current_path: PathBuf,
}

/// Events while building the plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PlanEvent {
    /// Parallel lookups started (metadata, and digests when needed)
    LookupStarted { total_photos: usize },
    /// One more file looked up
    LookupProgress { completed: usize, total: usize },
    /// Duplicate detection finished
    DuplicatesFound {
        groups: usize,
        redundant_files: usize,
    },
    /// The plan is complete
    Completed {
        total_files: usize,
        to_process: usize,
        skipped: usize,
    },
}

/// Events during execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecuteEvent {
    /// Execution started; `already_done` entries will not be repeated
    Started { total: usize, already_done: usize },
    /// Progress update after each entry
    Progress(ExecuteProgress),
    /// An entry failed; execution continues
    EntryFailed { path: PathBuf, reason: String },
    /// Execution finished or stopped
    Completed { processed: usize, failed: usize },
}

/// Progress information during execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteProgress {
    /// Entries finished in this invocation
    pub completed: usize,
    /// Entries to run in this invocation
    pub total: usize,
    /// Source of the entry just finished
    pub current_path: PathBuf,
    /// Bytes copied or moved so far
    pub bytes_processed: u64,
}

/// Events during undo
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UndoEvent {
    /// Undo started over `total` completed operations
    Started { total: usize },
    /// One record handled
    Progress { completed: usize, total: usize },
    /// A record could not be undone; undo continues
    RecordFailed { path: PathBuf, reason: String },
    /// Undo finished
    Completed { undone: usize, failed: usize },
}

/// Run-level events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// Run has started
    Started,
    /// Moving to a new phase
    PhaseChanged { phase: PipelinePhase },
    /// Run completed
    Completed { summary: PipelineSummary },
    /// Run was stopped between entries
    Cancelled,
    /// Run hit a fatal error
    Error { message: String },
}

/// Phases of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelinePhase {
    Scanning,
    Analyzing,
    Planning,
    Executing,
    Undoing,
    Reporting,
}

/// Summary of a finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Files discovered
    pub total_files: usize,
    /// Files copied or moved
    pub processed: usize,
    /// Files skipped (duplicates, missing metadata, unresolvable names)
    pub skipped: usize,
    /// Entries that failed
    pub failed: usize,
    /// Bytes copied or moved
    pub bytes_processed: u64,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl std::fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelinePhase::Scanning => write!(f, "Scanning"),
            PipelinePhase::Analyzing => write!(f, "Analyzing"),
            PipelinePhase::Planning => write!(f, "Planning"),
            PipelinePhase::Executing => write!(f, "Executing"),
            PipelinePhase::Undoing => write!(f, "Undoing"),
            PipelinePhase::Reporting => write!(f, "Reporting"),
        }
    }
}
