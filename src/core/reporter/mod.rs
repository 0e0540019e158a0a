//! # Reporter Module
//!
//! Renders the HTML report of a run from its trace. The journal is never
//! consulted, so a report can be regenerated at any time without
//! rescanning the sources.

mod html;

pub use html::write_html;

use crate::core::orchestrator::Trace;
use crate::error::ReportError;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Report file name inside the destination root
pub const REPORT_FILE_NAME: &str = ".orbit_report.html";

/// Render `trace` to the report file in `destination` and return its path
pub fn render(trace: &Trace, destination: &Path) -> Result<PathBuf, ReportError> {
    let path = destination.join(REPORT_FILE_NAME);
    let write_error = |source| ReportError::Write {
        path: path.clone(),
        source,
    };

    let file = File::create(&path).map_err(write_error)?;
    let mut writer = BufWriter::new(file);
    write_html(trace, &mut writer).map_err(write_error)?;
    writer.flush().map_err(write_error)?;

    tracing::info!("Report written to {}", path.display());
    Ok(path)
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
