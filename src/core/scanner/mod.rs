//! # Scanner Module
//!
//! Discovers photo files in source directories.
//!
//! ## Supported Formats
//! - JPEG (.jpg, .jpeg), PNG, TIFF
//! - HEIC (.heic, .heif) - iPhone photos
//! - Camera RAW (.nef, .cr2, .arw, .dng, .raf, .raw)
//!
//! ## Example
//! ```rust,ignore
//! use photo_orbit::core::scanner::{ScanConfig, WalkDirScanner};
//!
//! let scanner = WalkDirScanner::new(ScanConfig { recursive: true, ..Default::default() });
//! for path in scanner.scan(&["/Users/photos".into()]) {
//!     println!("{:?}", path);
//! }
//! ```

mod filter;
mod walker;

pub use filter::{PhotoFilter, DEFAULT_EXTENSIONS};
pub use walker::WalkDirScanner;

/// Configuration for the directory scanner
#[derive(Debug, Clone, Default)]
pub struct ScanConfig {
    /// Descend into subdirectories (otherwise only the roots' direct children)
    pub recursive: bool,
    /// Whether to follow symbolic links
    pub follow_symlinks: bool,
    /// Whether to include hidden files and directories
    pub include_hidden: bool,
    /// Custom extensions to include (None = use defaults)
    pub extensions: Option<Vec<String>>,
}
