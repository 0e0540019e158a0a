//! # Photo Orbit
//!
//! Organizes photos into date-based folders with runs that can be
//! simulated, resumed after a crash, and undone.
//!
//! ## Safety
//! - **Plan first** - nothing is touched until the whole plan is known
//! - **Journal everything** - every operation is durably recorded before
//!   and after it happens
//! - **Always reversible** - the journal drives `resume` and `undo`
//!
//! ## Architecture
//! - `core` - The organizing engine
//! - `events` - Event-driven progress reporting
//! - `error` - Error types
//! - `cli` - Command-line interface (binary only)

pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use error::{OrbitError, Result};

/// Initialize tracing for the binary.
///
/// Logs go to stderr. `RUST_LOG` overrides the default level, which is
/// `warn`, or `debug` when `verbose` is set. Calling it twice is harmless.
pub fn init_tracing(verbose: bool) {
    let default = if verbose {
        "photo_orbit=debug"
    } else {
        "photo_orbit=warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
