//! # Core Module
//!
//! The UI-agnostic organizing engine.
//!
//! ## Modules
//! - `scanner` - Discovers photos in source directories
//! - `metadata` - Reads capture timestamps from EXIF data
//! - `hasher` - Computes content digests
//! - `duplicates` - Groups byte-identical files
//! - `mapper` - Maps photos to dated destinations and resolves name conflicts
//! - `plan` - The immutable set of operations for one run
//! - `journal` - Append-only record of every operation
//! - `executor` - Performs one copy, move or skip
//! - `orchestrator` - Runs, resumes and undoes plans
//! - `reporter` - Renders the HTML report

pub mod duplicates;
pub mod executor;
pub mod hasher;
pub mod journal;
pub mod mapper;
pub mod metadata;
pub mod orchestrator;
pub mod plan;
pub mod reporter;
pub mod scanner;

// Re-export commonly used types
pub use duplicates::{DuplicateGroup, DuplicateStrategy};
pub use mapper::{DatePattern, PathMapper};
pub use metadata::{ExtractionMode, TimestampExtractor};
pub use orchestrator::{CancellationToken, Organizer, RunResult, RunState, UndoReport};
pub use plan::{OperationMode, Plan, PlanEntry};
