//! # orbit CLI
//!
//! Command-line interface for the photo organizer.
//!
//! ## Usage
//! ```bash
//! orbit simulate ~/Card --dest ~/Pictures/Library --pattern "%Y/%m"
//! orbit copy ~/Card --dest ~/Pictures/Library --duplicates skip --verify
//! orbit resume --dest ~/Pictures/Library
//! orbit undo --dest ~/Pictures/Library
//! ```

mod cli;

use std::process::ExitCode;

fn main() -> ExitCode {
    cli::run()
}
