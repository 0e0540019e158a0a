//! # Orchestrator
//!
//! Drives a run through `planning → executing → completed`, or
//! `interrupted` when stopped between entries. `resume` re-enters
//! execution from the journal; `undo` reverses whatever the journal says
//! was done.
//!
//! ## Example
//! ```rust,ignore
//! use photo_orbit::core::orchestrator::{CancellationToken, Organizer};
//! use photo_orbit::events::EventSender;
//!
//! let organizer = Organizer::builder()
//!     .source("/Volumes/card/DCIM")
//!     .destination("/Users/me/Pictures/Library")
//!     .pattern("%Y/%m")
//!     .build()?;
//! let result = organizer.run(&EventSender::disabled(), &CancellationToken::new())?;
//! println!("{} photos organized", result.processed);
//! ```

mod lock;
mod organizer;
mod trace;
mod undo;

pub use lock::{RunLock, LOCK_FILE_NAME};
pub use organizer::{
    Artifacts, CancellationToken, Organizer, OrganizerBuilder, OrganizerConfig, RunResult,
    RunState, DUPLICATES_FILE_NAME,
};
pub use trace::{Trace, TRACE_FILE_NAME};
pub use undo::{UndoOutcome, UndoRecord, UndoReport};
