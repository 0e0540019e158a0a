//! Reversal of a journaled run.
//!
//! Records are undone newest first. Each record is all-or-nothing; a
//! failure is reported and the remaining records are still attempted.

use crate::core::hasher::hash_file;
use crate::core::journal::{JournalState, OperationState, RecordState};
use crate::core::plan::OperationKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// What happened to one journal record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum UndoOutcome {
    Undone,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoRecord {
    pub id: u64,
    pub kind: OperationKind,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub outcome: UndoOutcome,
}

/// Result of undoing a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UndoReport {
    pub records: Vec<UndoRecord>,
    /// The journal was deleted (only when nothing failed)
    pub journal_removed: bool,
    /// Empty directories removed from the destination
    pub directories_removed: usize,
    pub duration_ms: u64,
}

impl UndoReport {
    pub fn undone(&self) -> usize {
        self.count(|o| matches!(o, UndoOutcome::Undone))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, UndoOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, UndoOutcome::Failed(_)))
    }

    fn count(&self, predicate: impl Fn(&UndoOutcome) -> bool) -> usize {
        self.records.iter().filter(|r| predicate(&r.outcome)).count()
    }
}

/// Records to reverse, newest first.
///
/// `done` copies and moves, plus `in-progress` ones whose effect may
/// already be on disk. Skips have nothing to reverse.
pub(crate) fn undoable(state: &JournalState) -> Vec<&OperationState> {
    state
        .latest_first()
        .into_iter()
        .filter(|op| op.kind != OperationKind::Skip)
        .filter(|op| matches!(op.state, RecordState::Done | RecordState::InProgress))
        .collect()
}

/// Reverse one record
pub(crate) fn undo_record(op: &OperationState) -> UndoOutcome {
    let finished = op.state == RecordState::Done;
    match op.kind {
        OperationKind::Skip => UndoOutcome::Skipped("nothing to undo".to_string()),
        OperationKind::Copy => undo_copy(&op.destination),
        OperationKind::Move => undo_move(&op.source, &op.destination, finished),
    }
}

fn undo_copy(destination: &Path) -> UndoOutcome {
    if !destination.exists() {
        return UndoOutcome::Skipped("destination not found".to_string());
    }
    match fs::remove_file(destination) {
        Ok(()) => {
            tracing::info!("Undo copy: deleted {}", destination.display());
            UndoOutcome::Undone
        }
        Err(e) => UndoOutcome::Failed(format!("cannot delete {}: {}", destination.display(), e)),
    }
}

fn undo_move(source: &Path, destination: &Path, finished: bool) -> UndoOutcome {
    if source.exists() {
        return if !destination.exists() {
            UndoOutcome::Skipped("already restored".to_string())
        } else if finished {
            UndoOutcome::Failed(format!("{} already exists", source.display()))
        } else {
            // Interrupted between the copy and the source removal
            undo_copy(destination)
        };
    }
    if !destination.exists() {
        return UndoOutcome::Skipped("destination not found".to_string());
    }

    match restore(destination, source) {
        Ok(()) => {
            tracing::info!("Undo move: {} -> {}", destination.display(), source.display());
            UndoOutcome::Undone
        }
        Err(e) => UndoOutcome::Failed(format!(
            "cannot restore {} to {}: {}",
            destination.display(),
            source.display(),
            e
        )),
    }
}

/// Rename back, or copy-verify-delete when the rename crosses devices
fn restore(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }

    fs::copy(from, to)?;
    let original = hash_file(from).map_err(io::Error::other)?;
    let restored = hash_file(to).map_err(io::Error::other)?;
    if original != restored {
        let _ = fs::remove_file(to);
        return Err(io::Error::other("restored copy does not match"));
    }
    fs::remove_file(from)
}

/// Remove directories left empty under `root`, walking up from each
/// starting point. `root` itself is never removed.
pub(crate) fn prune_empty_dirs<'a>(
    root: &Path,
    starts: impl IntoIterator<Item = &'a Path>,
) -> usize {
    let mut dirs: Vec<&Path> = starts.into_iter().collect();
    dirs.sort_by(|a, b| {
        b.components()
            .count()
            .cmp(&a.components().count())
            .then_with(|| a.cmp(b))
    });
    dirs.dedup();

    let mut removed = 0;
    for start in dirs {
        let mut current = Some(start);
        while let Some(dir) = current {
            if dir == root || !dir.starts_with(root) {
                break;
            }
            if fs::remove_dir(dir).is_err() {
                break;
            }
            tracing::debug!("Removed empty directory {}", dir.display());
            removed += 1;
            current = dir.parent();
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn state(
        kind: OperationKind,
        record: RecordState,
        source: &Path,
        destination: &Path,
    ) -> OperationState {
        OperationState {
            id: 0,
            state: record,
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            kind,
            digest: None,
            reason: None,
            sequence: 0,
        }
    }

    #[test]
    fn copy_undo_deletes_destination() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.jpg");
        let destination = dir.path().join("out/a.jpg");
        fs::write(&source, b"x").unwrap();
        fs::create_dir_all(destination.parent().unwrap()).unwrap();
        fs::write(&destination, b"x").unwrap();

        let outcome = undo_record(&state(OperationKind::Copy, RecordState::Done, &source, &destination));

        assert_eq!(outcome, UndoOutcome::Undone);
        assert!(!destination.exists());
        assert!(source.exists());
    }

    #[test]
    fn move_undo_restores_source() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("in/deep/a.jpg");
        let destination = dir.path().join("out/a.jpg");
        fs::create_dir_all(destination.parent().unwrap()).unwrap();
        fs::write(&destination, b"moved").unwrap();

        let outcome = undo_record(&state(OperationKind::Move, RecordState::Done, &source, &destination));

        assert_eq!(outcome, UndoOutcome::Undone);
        assert_eq!(fs::read(&source).unwrap(), b"moved");
        assert!(!destination.exists());
    }

    #[test]
    fn move_undo_refuses_to_overwrite_source() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.jpg");
        let destination = dir.path().join("b.jpg");
        fs::write(&source, b"new").unwrap();
        fs::write(&destination, b"old").unwrap();

        let outcome = undo_record(&state(OperationKind::Move, RecordState::Done, &source, &destination));

        assert!(matches!(outcome, UndoOutcome::Failed(_)));
        assert_eq!(fs::read(&source).unwrap(), b"new");
    }

    #[test]
    fn unfinished_move_drops_its_copy() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.jpg");
        let destination = dir.path().join("out/a.jpg");
        fs::write(&source, b"original").unwrap();
        fs::create_dir_all(destination.parent().unwrap()).unwrap();
        fs::write(&destination, b"original").unwrap();

        let outcome = undo_record(&state(
            OperationKind::Move,
            RecordState::InProgress,
            &source,
            &destination,
        ));

        assert_eq!(outcome, UndoOutcome::Undone);
        assert!(!destination.exists());
        assert_eq!(fs::read(&source).unwrap(), b"original");
    }

    #[test]
    fn restored_move_is_skipped_on_retry() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.jpg");
        fs::write(&source, b"back").unwrap();

        let outcome = undo_record(&state(
            OperationKind::Move,
            RecordState::Done,
            &source,
            &dir.path().join("out/a.jpg"),
        ));

        assert_eq!(outcome, UndoOutcome::Skipped("already restored".to_string()));
        assert_eq!(fs::read(&source).unwrap(), b"back");
    }

    #[test]
    fn missing_destination_is_skipped() {
        let dir = TempDir::new().unwrap();
        let outcome = undo_record(&state(
            OperationKind::Copy,
            RecordState::Done,
            &dir.path().join("a.jpg"),
            &dir.path().join("gone.jpg"),
        ));
        assert!(matches!(outcome, UndoOutcome::Skipped(_)));
    }

    #[test]
    fn prune_stops_at_root_and_non_empty_dirs() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let empty = root.join("2024/05/01");
        let kept = root.join("2023/12");
        fs::create_dir_all(&empty).unwrap();
        fs::create_dir_all(&kept).unwrap();
        fs::write(kept.join("keep.jpg"), b"x").unwrap();

        let removed = prune_empty_dirs(root, [empty.as_path(), kept.as_path()]);

        assert_eq!(removed, 3);
        assert!(!root.join("2024").exists());
        assert!(kept.exists());
        assert!(root.exists());
    }
}
