//! The trace: a JSON snapshot of a plan, written once planning completes.
//!
//! Reports are rendered from the trace, never from the journal, so they can
//! be regenerated without rescanning the sources.

use super::OrganizerConfig;
use crate::core::duplicates::DuplicateGroup;
use crate::core::plan::{Plan, PlanEntry, PlanSummary};
use crate::error::{ProcessingError, ReportError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use uuid::Uuid;

/// Trace file name inside the destination root
pub const TRACE_FILE_NAME: &str = ".orbit_trace.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// `true` for a dry run
    pub simulated: bool,
    pub settings: OrganizerConfig,
    pub summary: PlanSummary,
    pub entries: Vec<PlanEntry>,
    pub duplicate_groups: Vec<DuplicateGroup>,
    pub errors: Vec<ProcessingError>,
}

impl Trace {
    pub fn new(plan: &Plan, settings: &OrganizerConfig, simulated: bool) -> Self {
        Self {
            run_id: plan.run_id,
            created_at: plan.created_at,
            simulated,
            settings: settings.clone(),
            summary: plan.summary(),
            entries: plan.entries.clone(),
            duplicate_groups: plan.duplicate_groups.clone(),
            errors: plan.errors.clone(),
        }
    }

    /// Write the trace, replacing any previous one in a single rename
    pub fn write(&self, path: &Path) -> Result<(), ReportError> {
        let json = serde_json::to_vec_pretty(self).map_err(|e| ReportError::TraceUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let staging = path.with_extension("json.tmp");
        fs::write(&staging, json)
            .and_then(|_| fs::rename(&staging, path))
            .map_err(|source| ReportError::Write {
                path: path.to_path_buf(),
                source,
            })?;

        tracing::debug!("Trace written to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ReportError> {
        let content = fs::read(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ReportError::TraceNotFound {
                path: path.to_path_buf(),
            },
            _ => ReportError::TraceUnreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
        })?;

        serde_json::from_slice(&content).map_err(|e| ReportError::TraceUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
