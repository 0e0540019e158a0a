//! # Plan Types
//!
//! The immutable plan built before any file is touched: one [`PlanEntry`]
//! per discovered file, in scan order, plus the duplicate groups and the
//! per-file problems found while planning.

use crate::core::duplicates::DuplicateGroup;
use crate::core::hasher::ContentDigest;
use crate::error::ProcessingError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// What a run does with the files it keeps
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperationMode {
    /// Copy files to destination (keep originals)
    #[default]
    Copy,
    /// Move files to destination
    Move,
}

/// Kind of a single journaled operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Copy,
    Move,
    Skip,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Move => "move",
            Self::Skip => "skip",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<OperationMode> for OperationKind {
    fn from(mode: OperationMode) -> Self {
        match mode {
            OperationMode::Copy => Self::Copy,
            OperationMode::Move => Self::Move,
        }
    }
}

/// Why an entry is not copied or moved
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    Duplicate,
    MetadataMissingInStrictMode,
    NameUnresolvable,
    Unreadable,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::MetadataMissingInStrictMode => "metadata-missing-in-strict-mode",
            Self::NameUnresolvable => "name-unresolvable",
            Self::Unreadable => "unreadable",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discovered source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Absolute source path
    pub path: PathBuf,
    pub size: u64,
    pub captured: Option<NaiveDateTime>,
    /// Only computed when duplicate detection or verification needs it
    pub digest: Option<ContentDigest>,
}

impl FileEntry {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
            captured: None,
            digest: None,
        }
    }
}

/// The action planned for an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanAction {
    Copy,
    Move,
    Skip { reason: SkipReason },
}

impl PlanAction {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Copy => OperationKind::Copy,
            Self::Move => OperationKind::Move,
            Self::Skip { .. } => OperationKind::Skip,
        }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Skip { reason } => Some(*reason),
            _ => None,
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip { .. })
    }
}

impl From<OperationMode> for PlanAction {
    fn from(mode: OperationMode) -> Self {
        match mode {
            OperationMode::Copy => Self::Copy,
            OperationMode::Move => Self::Move,
        }
    }
}

/// One planned operation. Ids are the entry's position in scan order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub id: u64,
    pub source: FileEntry,
    /// Absolute destination path
    pub destination: PathBuf,
    pub action: PlanAction,
    pub duplicate_group: Option<usize>,
}

impl PlanEntry {
    pub fn kind(&self) -> OperationKind {
        self.action.kind()
    }

    pub fn operation(&self) -> Operation {
        Operation {
            id: self.id,
            source: self.source.path.clone(),
            destination: self.destination.clone(),
            kind: self.kind(),
            expected_digest: self.source.digest.clone(),
        }
    }
}

/// What the executor needs to perform one entry.
///
/// Built from a fresh [`PlanEntry`], or from journal records on resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub id: u64,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub kind: OperationKind,
    /// Digest of the source, when already known
    pub expected_digest: Option<ContentDigest>,
}

/// Counts and byte totals over a plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub total_files: usize,
    pub total_bytes: u64,
    pub to_process: usize,
    pub to_process_bytes: u64,
    pub skipped: usize,
    pub skipped_bytes: u64,
    pub duplicates: usize,
    pub duplicate_bytes: u64,
    pub unsorted: usize,
    pub duplicate_groups: usize,
    pub errors: usize,
}

/// The complete set of intended operations for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub destination: PathBuf,
    pub entries: Vec<PlanEntry>,
    pub duplicate_groups: Vec<DuplicateGroup>,
    pub errors: Vec<ProcessingError>,
}

impl Plan {
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary {
            total_files: self.entries.len(),
            duplicate_groups: self.duplicate_groups.len(),
            errors: self.errors.len(),
            ..Default::default()
        };

        for entry in &self.entries {
            let size = entry.source.size;
            summary.total_bytes += size;
            if entry.source.captured.is_none() && !entry.action.is_skip() {
                summary.unsorted += 1;
            }
            match entry.action {
                PlanAction::Skip { reason } => {
                    summary.skipped += 1;
                    summary.skipped_bytes += size;
                    if reason == SkipReason::Duplicate {
                        summary.duplicates += 1;
                        summary.duplicate_bytes += size;
                    }
                }
                PlanAction::Copy | PlanAction::Move => {
                    summary.to_process += 1;
                    summary.to_process_bytes += size;
                }
            }
        }

        summary
    }

    pub fn operations(&self) -> impl Iterator<Item = Operation> + '_ {
        self.entries.iter().map(PlanEntry::operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u64, size: u64, action: PlanAction) -> PlanEntry {
        PlanEntry {
            id,
            source: FileEntry::new(format!("/src/{}.jpg", id), size),
            destination: PathBuf::from(format!("/dst/Unsorted/{}.jpg", id)),
            action,
            duplicate_group: None,
        }
    }

    #[test]
    fn summary_splits_processed_and_skipped() {
        let plan = Plan {
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            destination: PathBuf::from("/dst"),
            entries: vec![
                entry(0, 100, PlanAction::Copy),
                entry(
                    1,
                    100,
                    PlanAction::Skip {
                        reason: SkipReason::Duplicate,
                    },
                ),
                entry(
                    2,
                    50,
                    PlanAction::Skip {
                        reason: SkipReason::MetadataMissingInStrictMode,
                    },
                ),
            ],
            duplicate_groups: Vec::new(),
            errors: Vec::new(),
        };

        let summary = plan.summary();
        assert_eq!(summary.total_files, 3);
        assert_eq!(summary.total_bytes, 250);
        assert_eq!(summary.to_process, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.duplicate_bytes, 100);
        assert_eq!(summary.unsorted, 1);
    }

    #[test]
    fn skip_reasons_use_kebab_case() {
        let json = serde_json::to_string(&SkipReason::MetadataMissingInStrictMode).unwrap();
        assert_eq!(json, "\"metadata-missing-in-strict-mode\"");
        assert_eq!(
            SkipReason::MetadataMissingInStrictMode.as_str(),
            "metadata-missing-in-strict-mode"
        );
    }

    #[test]
    fn action_is_tagged_by_kind() {
        let json = serde_json::to_value(PlanAction::Skip {
            reason: SkipReason::Duplicate,
        })
        .unwrap();
        assert_eq!(json["kind"], "skip");
        assert_eq!(json["reason"], "duplicate");
        assert_eq!(serde_json::to_value(PlanAction::Move).unwrap()["kind"], "move");
    }

    #[test]
    fn operation_carries_known_digest() {
        let mut e = entry(4, 10, PlanAction::Move);
        e.source.digest = Some(crate::core::hasher::hash_reader(&b"abc"[..]).unwrap());
        let op = e.operation();
        assert_eq!(op.id, 4);
        assert_eq!(op.kind, OperationKind::Move);
        assert!(op.expected_digest.is_some());
    }
}
