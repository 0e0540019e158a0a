//! The organizer: builds a plan, executes it under the journal, resumes
//! and undoes it.

use super::lock::RunLock;
use super::trace::{Trace, TRACE_FILE_NAME};
use super::undo::{self, UndoOutcome, UndoRecord, UndoReport};
use crate::core::duplicates::{
    export_csv, DuplicateDecision, DuplicateDetector, DuplicateGroup, DuplicateStrategy,
};
use crate::core::executor::{EntryOutcome, FileExecutor};
use crate::core::journal::{self, Journal, JOURNAL_FILE_NAME};
use crate::core::mapper::{resolve_conflicts, DatePattern, PathMapper, DEFAULT_PATTERN};
use crate::core::metadata::{ExifExtractor, ExtractionMode, TimestampExtractor};
use crate::core::plan::{
    FileEntry, Operation, OperationKind, OperationMode, Plan, PlanAction, PlanEntry, PlanSummary,
    SkipReason,
};
use crate::core::reporter::{self, REPORT_FILE_NAME};
use crate::core::scanner::{ScanConfig, WalkDirScanner};
use crate::error::{ErrorStage, JournalError, OrbitError, ProcessingError, Result, ScanError};
use crate::events::{
    Event, EventSender, ExecuteEvent, ExecuteProgress, PipelineEvent, PipelinePhase,
    PipelineSummary, PlanEvent, ScanEvent, ScanProgress, UndoEvent,
};
use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Duplicate CSV file name inside the destination root
pub const DUPLICATES_FILE_NAME: &str = ".orbit_duplicates.csv";

/// Settings of one organizer, recorded in the trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizerConfig {
    /// Source roots, scanned in this order
    pub sources: Vec<PathBuf>,
    pub destination: PathBuf,
    pub pattern: DatePattern,
    pub recursive: bool,
    pub extraction_mode: ExtractionMode,
    pub operation: OperationMode,
    /// Re-hash every copied file
    pub verify: bool,
    /// `None` disables duplicate detection
    pub duplicates: Option<DuplicateStrategy>,
    pub ignore_empty: bool,
    /// Threads for metadata and digest lookups
    pub workers: usize,
    pub include_hidden: bool,
    pub generate_report: bool,
}

impl Default for OrganizerConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            destination: PathBuf::new(),
            pattern: DatePattern::default(),
            recursive: true,
            extraction_mode: ExtractionMode::default(),
            operation: OperationMode::default(),
            verify: false,
            duplicates: None,
            ignore_empty: false,
            workers: default_workers(),
            include_hidden: false,
            generate_report: false,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Stops a run between two entries
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Planning only, nothing was touched
    Simulated,
    Completed,
    /// Stopped between entries; `resume` continues it
    Interrupted,
}

/// Files written to the destination root
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Artifacts {
    pub journal: Option<PathBuf>,
    pub trace: Option<PathBuf>,
    pub duplicates: Option<PathBuf>,
    pub report: Option<PathBuf>,
}

/// Summary of a run, a resume or a simulation.
///
/// For a simulation `processed` counts what would be copied or moved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub state: RunState,
    pub files_found: usize,
    pub processed: usize,
    /// Entries the journal already had as done (resume only)
    pub already_done: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub total_bytes: u64,
    pub processed_bytes: u64,
    pub skipped_bytes: u64,
    pub duplicate_bytes: u64,
    pub duration_ms: u64,
    pub artifacts: Artifacts,
    pub errors: Vec<ProcessingError>,
}

impl RunResult {
    fn from_summary(state: RunState, summary: &PlanSummary) -> Self {
        Self {
            state,
            files_found: summary.total_files,
            processed: 0,
            already_done: 0,
            skipped: summary.skipped,
            duplicates: summary.duplicates,
            failed: 0,
            total_bytes: summary.total_bytes,
            processed_bytes: 0,
            skipped_bytes: summary.skipped_bytes,
            duplicate_bytes: summary.duplicate_bytes,
            duration_ms: 0,
            artifacts: Artifacts::default(),
            errors: Vec::new(),
        }
    }

    fn pipeline_summary(&self) -> PipelineSummary {
        PipelineSummary {
            total_files: self.files_found,
            processed: self.processed,
            skipped: self.skipped,
            failed: self.failed,
            bytes_processed: self.processed_bytes,
            duration_ms: self.duration_ms,
        }
    }
}

/// Builder for an [`Organizer`]
pub struct OrganizerBuilder {
    config: OrganizerConfig,
    pattern: String,
    extractor: Option<Arc<dyn TimestampExtractor>>,
}

impl OrganizerBuilder {
    pub fn new() -> Self {
        Self {
            config: OrganizerConfig::default(),
            pattern: DEFAULT_PATTERN.to_string(),
            extractor: None,
        }
    }

    /// Source directories, scanned in the given order
    pub fn sources<I, P>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.config.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    pub fn source(mut self, source: impl Into<PathBuf>) -> Self {
        self.config.sources.push(source.into());
        self
    }

    pub fn destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.config.destination = destination.into();
        self
    }

    /// Date pattern such as `%Y/%m/%d`, validated by [`build`](Self::build)
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.config.recursive = recursive;
        self
    }

    pub fn extraction_mode(mut self, mode: ExtractionMode) -> Self {
        self.config.extraction_mode = mode;
        self
    }

    pub fn operation(mut self, operation: OperationMode) -> Self {
        self.config.operation = operation;
        self
    }

    pub fn verify(mut self, verify: bool) -> Self {
        self.config.verify = verify;
        self
    }

    /// Enable duplicate detection with a strategy, or disable it with `None`
    pub fn duplicates(mut self, strategy: Option<DuplicateStrategy>) -> Self {
        self.config.duplicates = strategy;
        self
    }

    pub fn ignore_empty(mut self, ignore: bool) -> Self {
        self.config.ignore_empty = ignore;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn include_hidden(mut self, include: bool) -> Self {
        self.config.include_hidden = include;
        self
    }

    pub fn generate_report(mut self, generate: bool) -> Self {
        self.config.generate_report = generate;
        self
    }

    /// Replace the EXIF reader, e.g. with a closure in tests
    pub fn extractor(mut self, extractor: impl TimestampExtractor + 'static) -> Self {
        self.extractor = Some(Arc::new(extractor));
        self
    }

    /// Validate the settings and build the organizer
    pub fn build(self) -> Result<Organizer> {
        let mut config = self.config;
        config.pattern = DatePattern::new(&self.pattern)?;

        if config.destination.as_os_str().is_empty() {
            return Err(OrbitError::Config(
                "a destination directory is required".to_string(),
            ));
        }
        if config.workers == 0 {
            return Err(OrbitError::Config(
                "worker count must be at least 1".to_string(),
            ));
        }

        config.destination = absolute(&config.destination);
        let mut seen = HashSet::new();
        config.sources = config
            .sources
            .iter()
            .map(|source| absolute(source))
            .filter(|source| seen.insert(source.clone()))
            .collect();

        for source in &config.sources {
            if *source == config.destination {
                return Err(OrbitError::Config(format!(
                    "source and destination are the same directory: {}",
                    source.display()
                )));
            }
            if config.recursive && config.destination.starts_with(source) {
                return Err(OrbitError::Config(format!(
                    "destination {} is inside source {}",
                    config.destination.display(),
                    source.display()
                )));
            }
        }

        let extractor: Arc<dyn TimestampExtractor> = match self.extractor {
            Some(extractor) => extractor,
            None => Arc::new(ExifExtractor::new()),
        };

        Ok(Organizer {
            mapper: PathMapper::new(config.pattern.clone()),
            config,
            extractor,
        })
    }
}

impl Default for OrganizerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn absolute(path: &Path) -> PathBuf {
    fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// One scanned file before lookups
struct Discovered {
    entry: FileEntry,
    readable: bool,
}

#[derive(Default)]
struct Tally {
    processed: usize,
    skipped: usize,
    failed: usize,
    bytes: u64,
    interrupted: bool,
    errors: Vec<ProcessingError>,
}

/// Organizes photos from source directories into a dated destination tree
pub struct Organizer {
    config: OrganizerConfig,
    mapper: PathMapper,
    extractor: Arc<dyn TimestampExtractor>,
}

impl Organizer {
    pub fn builder() -> OrganizerBuilder {
        OrganizerBuilder::new()
    }

    pub fn config(&self) -> &OrganizerConfig {
        &self.config
    }

    pub fn journal_path(&self) -> PathBuf {
        self.config.destination.join(JOURNAL_FILE_NAME)
    }

    pub fn trace_path(&self) -> PathBuf {
        self.config.destination.join(TRACE_FILE_NAME)
    }

    /// Scan, look up timestamps and digests in parallel, then map every
    /// file to its destination. Touches nothing on disk.
    pub fn plan(&self, events: &EventSender) -> Result<Plan> {
        if self.config.sources.is_empty() {
            return Err(OrbitError::Config(
                "at least one source directory is required".to_string(),
            ));
        }

        let mut errors = Vec::new();

        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Scanning,
        }));
        let mut found = self.discover(events, &mut errors);

        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Analyzing,
        }));
        errors.extend(self.look_up(&mut found, events)?);

        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Planning,
        }));
        let (files, readable): (Vec<FileEntry>, Vec<bool>) =
            found.into_iter().map(|d| (d.entry, d.readable)).unzip();

        let groups = match self.config.duplicates {
            Some(_) => DuplicateDetector::new()
                .ignore_empty(self.config.ignore_empty)
                .group(&files),
            None => Vec::new(),
        };
        events.send(Event::Plan(PlanEvent::DuplicatesFound {
            groups: groups.len(),
            redundant_files: groups.iter().map(|g| g.members.len() - 1).sum(),
        }));

        let entries = self.assign(files, &readable, &groups, &mut errors);
        let plan = Plan {
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            destination: self.config.destination.clone(),
            entries,
            duplicate_groups: groups,
            errors,
        };

        let summary = plan.summary();
        tracing::info!(
            "Plan {}: {} files, {} to {}, {} skipped",
            plan.run_id,
            summary.total_files,
            summary.to_process,
            OperationKind::from(self.config.operation),
            summary.skipped
        );
        events.send(Event::Plan(PlanEvent::Completed {
            total_files: summary.total_files,
            to_process: summary.to_process,
            skipped: summary.skipped,
        }));

        Ok(plan)
    }

    /// Plan and write the trace, the duplicate CSV and optionally the
    /// report. Sources are never touched and no journal is created.
    pub fn simulate(&self, events: &EventSender) -> Result<RunResult> {
        let start = Instant::now();
        events.send(Event::Pipeline(PipelineEvent::Started));

        let plan = self.plan(events)?;
        self.ensure_destination()?;
        let artifacts = self.write_artifacts(&plan, true, events)?;

        let summary = plan.summary();
        let mut result = RunResult::from_summary(RunState::Simulated, &summary);
        result.processed = summary.to_process;
        result.processed_bytes = summary.to_process_bytes;
        result.artifacts = artifacts;
        result.errors = plan.errors;
        result.duration_ms = start.elapsed().as_millis() as u64;

        events.send(Event::Pipeline(PipelineEvent::Completed {
            summary: result.pipeline_summary(),
        }));
        Ok(result)
    }

    /// Plan, journal and execute a fresh run
    pub fn run(&self, events: &EventSender, cancel: &CancellationToken) -> Result<RunResult> {
        let start = Instant::now();
        events.send(Event::Pipeline(PipelineEvent::Started));

        self.ensure_destination()?;
        let _lock = RunLock::acquire(&self.config.destination)?;

        let journal_path = self.journal_path();
        if journal_path.exists() {
            let state = journal::replay(&journal_path)?;
            if !state.is_finished() {
                return Err(JournalError::UnfinishedRun {
                    path: journal_path,
                    pending: state.pending_count(),
                }
                .into());
            }
            tracing::info!(
                "Replacing finished journal of the previous run ({} operations)",
                state.len()
            );
        }

        let plan = self.plan(events)?;
        let mut artifacts = self.write_artifacts(&plan, false, events)?;

        let mut journal = Journal::create(&journal_path)?;
        journal
            .record_plan(&plan.entries)
            .map_err(|source| OrbitError::RunAborted {
                completed: 0,
                pending: plan.entries.len(),
                source,
            })?;
        artifacts.journal = Some(journal_path);

        let work: Vec<(Operation, u64)> = plan
            .entries
            .iter()
            .map(|entry| (entry.operation(), entry.source.size))
            .collect();
        let tally = self.execute(&work, &mut journal, 0, events, cancel)?;

        let summary = plan.summary();
        let mut result = RunResult::from_summary(tally.state(), &summary);
        result.processed = tally.processed;
        result.processed_bytes = tally.bytes;
        result.failed = tally.failed;
        result.artifacts = artifacts;
        result.errors = plan.errors;
        result.errors.extend(tally.errors);
        result.duration_ms = start.elapsed().as_millis() as u64;

        self.finish(&result, events);
        Ok(result)
    }

    /// Continue the run recorded in the destination's journal.
    ///
    /// Operations already `done` are not repeated; `in-progress` and
    /// `failed` ones are attempted again.
    pub fn resume(&self, events: &EventSender, cancel: &CancellationToken) -> Result<RunResult> {
        let start = Instant::now();
        let journal_path = self.journal_path();
        if !journal_path.exists() {
            return Err(JournalError::NotFound { path: journal_path }.into());
        }

        events.send(Event::Pipeline(PipelineEvent::Started));
        let _lock = RunLock::acquire(&self.config.destination)?;

        let state = journal::replay(&journal_path)?;
        let mut journal = Journal::open(&journal_path)?;
        let already_done = state.done_count();

        let work: Vec<(Operation, u64)> = state
            .pending()
            .map(|op| (op.operation(), size_of(&op.source, &op.destination)))
            .collect();
        tracing::info!(
            "Resuming {}: {} done, {} pending",
            journal_path.display(),
            already_done,
            work.len()
        );

        // Plan-level counts come from the trace of the same run when present
        let summary = Trace::load(&self.trace_path())
            .ok()
            .filter(|trace| !trace.simulated)
            .map(|trace| trace.summary)
            .unwrap_or_else(|| PlanSummary {
                total_files: state.len(),
                skipped: state
                    .operations()
                    .filter(|op| op.kind == OperationKind::Skip)
                    .count(),
                ..Default::default()
            });

        let tally = self.execute(&work, &mut journal, already_done, events, cancel)?;

        let mut result = RunResult::from_summary(tally.state(), &summary);
        result.files_found = state.len();
        result.already_done = already_done;
        result.processed = tally.processed;
        result.processed_bytes = tally.bytes;
        result.failed = tally.failed;
        result.artifacts = Artifacts {
            journal: Some(journal_path),
            trace: Some(self.trace_path()).filter(|p| p.exists()),
            duplicates: Some(self.config.destination.join(DUPLICATES_FILE_NAME))
                .filter(|p| p.exists()),
            report: Some(self.config.destination.join(REPORT_FILE_NAME)).filter(|p| p.exists()),
        };
        result.errors = tally.errors;
        result.duration_ms = start.elapsed().as_millis() as u64;

        self.finish(&result, events);
        Ok(result)
    }

    /// Reverse the journaled run, newest operation first.
    ///
    /// Copies are deleted, moves are put back. A record that cannot be
    /// undone is reported and the rest continue; the journal is only
    /// deleted when nothing failed, so undo can be retried.
    pub fn undo(&self, events: &EventSender) -> Result<UndoReport> {
        let start = Instant::now();
        let destination = &self.config.destination;
        let journal_path = self.journal_path();
        if !journal_path.exists() {
            return Err(JournalError::NotFound { path: journal_path }.into());
        }

        let _lock = RunLock::acquire(destination)?;
        let state = journal::replay(&journal_path)?;
        let records = undo::undoable(&state);
        let total = records.len();

        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Undoing,
        }));
        events.send(Event::Undo(UndoEvent::Started { total }));

        let mut report = UndoReport::default();
        for (index, op) in records.into_iter().enumerate() {
            let outcome = undo::undo_record(op);
            if let UndoOutcome::Failed(reason) = &outcome {
                tracing::warn!("Could not undo {}: {}", op.destination.display(), reason);
                events.send(Event::Undo(UndoEvent::RecordFailed {
                    path: op.destination.clone(),
                    reason: reason.clone(),
                }));
            }
            report.records.push(UndoRecord {
                id: op.id,
                kind: op.kind,
                source: op.source.clone(),
                destination: op.destination.clone(),
                outcome,
            });
            events.send(Event::Undo(UndoEvent::Progress {
                completed: index + 1,
                total,
            }));
        }

        if report.failed() == 0 {
            Journal::remove(&journal_path)?;
            report.journal_removed = true;
            let parents = report
                .records
                .iter()
                .filter(|r| r.outcome == UndoOutcome::Undone)
                .filter_map(|r| r.destination.parent());
            report.directories_removed = undo::prune_empty_dirs(destination, parents);
        } else {
            tracing::warn!(
                "{} records could not be undone; journal kept at {}",
                report.failed(),
                journal_path.display()
            );
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Undo finished: {} undone, {} skipped, {} failed",
            report.undone(),
            report.skipped(),
            report.failed()
        );
        events.send(Event::Undo(UndoEvent::Completed {
            undone: report.undone(),
            failed: report.failed(),
        }));
        Ok(report)
    }

    /// Re-render the HTML report from the trace saved in `destination`
    pub fn report(destination: &Path) -> Result<PathBuf> {
        let trace = Trace::load(&destination.join(TRACE_FILE_NAME))?;
        Ok(reporter::render(&trace, destination)?)
    }

    fn ensure_destination(&self) -> Result<()> {
        let destination = &self.config.destination;
        fs::create_dir_all(destination).map_err(|source| OrbitError::DestinationUnwritable {
            path: destination.clone(),
            source,
        })
    }

    fn discover(&self, events: &EventSender, errors: &mut Vec<ProcessingError>) -> Vec<Discovered> {
        events.send(Event::Scan(ScanEvent::Started {
            paths: self.config.sources.clone(),
        }));

        let scanner = WalkDirScanner::new(ScanConfig {
            recursive: self.config.recursive,
            follow_symlinks: false,
            include_hidden: self.config.include_hidden,
            extensions: None,
        });

        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for item in scanner.scan(&self.config.sources) {
            match item {
                Ok(path) => {
                    // Overlapping roots yield the same file twice
                    if !seen.insert(path.clone()) {
                        continue;
                    }
                    let (size, readable) = match fs::metadata(&path) {
                        Ok(meta) => (meta.len(), true),
                        Err(e) => {
                            tracing::warn!("Cannot read {}: {}", path.display(), e);
                            errors.push(ProcessingError::new(&path, ErrorStage::Scan, e));
                            (0, false)
                        }
                    };
                    events.send(Event::Scan(ScanEvent::Progress(ScanProgress {
                        photos_found: found.len() + 1,
                        current_path: path.clone(),
                    })));
                    found.push(Discovered {
                        entry: FileEntry::new(path, size),
                        readable,
                    });
                }
                Err(e) => {
                    tracing::warn!("{}", e);
                    let path = match &e {
                        ScanError::DirectoryNotFound { path } | ScanError::Unreadable { path, .. } => {
                            path.clone()
                        }
                        ScanError::Walk(_) => PathBuf::new(),
                    };
                    events.send(Event::Scan(ScanEvent::Error {
                        path: path.clone(),
                        message: e.to_string(),
                    }));
                    errors.push(ProcessingError::new(path, ErrorStage::Scan, e));
                }
            }
        }

        tracing::info!("Found {} photos", found.len());
        events.send(Event::Scan(ScanEvent::Completed {
            total_photos: found.len(),
        }));
        found
    }

    /// Timestamps, and digests when duplicates are detected, on a bounded
    /// pool. Returns once every lookup has finished.
    fn look_up(&self, found: &mut [Discovered], events: &EventSender) -> Result<Vec<ProcessingError>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()
            .map_err(|e| OrbitError::Config(format!("cannot start worker pool: {}", e)))?;

        let detector = self
            .config
            .duplicates
            .map(|_| DuplicateDetector::new().ignore_empty(self.config.ignore_empty));
        let mode = self.config.extraction_mode;
        let extractor = &self.extractor;
        let total = found.iter().filter(|d| d.readable).count();
        let completed = AtomicUsize::new(0);

        events.send(Event::Plan(PlanEvent::LookupStarted {
            total_photos: total,
        }));

        let errors = pool.install(|| {
            found
                .par_iter_mut()
                .filter(|d| d.readable)
                .flat_map_iter(|d| {
                    let mut problems = Vec::new();
                    match extractor.extract(&d.entry.path, mode) {
                        Ok(captured) => d.entry.captured = captured,
                        Err(e) => {
                            tracing::debug!("No timestamp for {}: {}", d.entry.path.display(), e);
                            problems.push(ProcessingError::new(&d.entry.path, ErrorStage::Metadata, e));
                        }
                    }
                    if let Some(detector) = &detector {
                        problems.extend(detector.digest_entry(&mut d.entry));
                    }

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    events.send(Event::Plan(PlanEvent::LookupProgress {
                        completed: done,
                        total,
                    }));
                    problems
                })
                .collect::<Vec<_>>()
        });

        Ok(errors)
    }

    /// Decide each entry's action and destination, in scan order
    fn assign(
        &self,
        files: Vec<FileEntry>,
        readable: &[bool],
        groups: &[DuplicateGroup],
        errors: &mut Vec<ProcessingError>,
    ) -> Vec<PlanEntry> {
        let strategy = self.config.duplicates.unwrap_or_default();
        let membership: HashMap<&Path, &DuplicateGroup> = groups
            .iter()
            .flat_map(|group| group.members.iter().map(move |m| (m.as_path(), group)))
            .collect();

        let mut actions: Vec<PlanAction> = files
            .iter()
            .zip(readable)
            .map(|(file, &ok)| {
                if !ok {
                    return PlanAction::Skip {
                        reason: SkipReason::Unreadable,
                    };
                }
                if file.captured.is_none() && self.config.extraction_mode == ExtractionMode::Strict {
                    return PlanAction::Skip {
                        reason: SkipReason::MetadataMissingInStrictMode,
                    };
                }
                if let Some(group) = membership.get(file.path.as_path()) {
                    if group.decision(strategy, &file.path) == DuplicateDecision::Skipped {
                        return PlanAction::Skip {
                            reason: SkipReason::Duplicate,
                        };
                    }
                }
                PlanAction::from(self.config.operation)
            })
            .collect();

        let mut mapped: Vec<Option<PathBuf>> = Vec::with_capacity(files.len());
        for (file, action) in files.iter().zip(actions.iter_mut()) {
            match self.mapper.map(&file.path, file.captured) {
                Ok(relative) => mapped.push(Some(relative)),
                Err(e) => {
                    errors.push(ProcessingError::new(&file.path, ErrorStage::PathMapping, e));
                    *action = PlanAction::Skip {
                        reason: SkipReason::NameUnresolvable,
                    };
                    mapped.push(None);
                }
            }
        }

        // Only entries that will write a file compete for names
        let participants: Vec<usize> = (0..files.len()).filter(|&i| !actions[i].is_skip()).collect();
        let candidates: Vec<(PathBuf, PathBuf)> = participants
            .iter()
            .map(|&i| (files[i].path.clone(), mapped[i].clone().unwrap_or_default()))
            .collect();

        // Files already in the destination keep their names
        let destination = &self.config.destination;
        let on_disk =
            |relative: &Path| fs::symlink_metadata(destination.join(relative)).is_ok();

        let mut renamed = 0;
        let mut resolved = mapped.clone();
        for (&i, result) in participants
            .iter()
            .zip(resolve_conflicts(&candidates, on_disk))
        {
            match result {
                Ok(relative) => {
                    if Some(&relative) != mapped[i].as_ref() {
                        renamed += 1;
                    }
                    resolved[i] = Some(relative);
                }
                Err(e) => {
                    tracing::warn!("{}: {}", files[i].path.display(), e);
                    errors.push(ProcessingError::new(&files[i].path, ErrorStage::PathMapping, e));
                    actions[i] = PlanAction::Skip {
                        reason: SkipReason::NameUnresolvable,
                    };
                }
            }
        }
        if renamed > 0 {
            tracing::info!("Resolved {} destination name conflicts", renamed);
        }

        files
            .into_iter()
            .enumerate()
            .map(|(i, source)| PlanEntry {
                id: i as u64,
                destination: match &resolved[i] {
                    Some(relative) => destination.join(relative),
                    None => destination.clone(),
                },
                duplicate_group: membership.get(source.path.as_path()).map(|g| g.id),
                action: actions[i],
                source,
            })
            .collect()
    }

    fn write_artifacts(&self, plan: &Plan, simulated: bool, events: &EventSender) -> Result<Artifacts> {
        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Reporting,
        }));
        let destination = &self.config.destination;

        let trace = Trace::new(plan, &self.config, simulated);
        let trace_path = self.trace_path();
        trace.write(&trace_path)?;

        let duplicates = match self.config.duplicates {
            Some(strategy) => {
                let path = destination.join(DUPLICATES_FILE_NAME);
                export_csv(&plan.duplicate_groups, strategy, &path)?;
                Some(path)
            }
            None => None,
        };

        let report = if self.config.generate_report {
            Some(reporter::render(&trace, destination)?)
        } else {
            None
        };

        Ok(Artifacts {
            journal: None,
            trace: Some(trace_path),
            duplicates,
            report,
        })
    }

    /// The single writer loop: one entry at a time, journaled, with
    /// cancellation honored between entries.
    fn execute(
        &self,
        work: &[(Operation, u64)],
        journal: &mut Journal,
        already_done: usize,
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Result<Tally> {
        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Executing,
        }));
        events.send(Event::Execute(ExecuteEvent::Started {
            total: work.len(),
            already_done,
        }));

        let executor = FileExecutor::new().with_verification(self.config.verify);
        let mut tally = Tally::default();

        for (index, (operation, size)) in work.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::warn!("Stopped after {} of {} operations", index, work.len());
                tally.interrupted = true;
                events.send(Event::Pipeline(PipelineEvent::Cancelled));
                break;
            }

            match executor.apply(operation, journal) {
                Ok(EntryOutcome::Done { .. }) => {
                    if operation.kind == OperationKind::Skip {
                        tally.skipped += 1;
                    } else {
                        tally.processed += 1;
                        tally.bytes += size;
                    }
                }
                Ok(EntryOutcome::Failed { reason }) => {
                    tally.failed += 1;
                    events.send(Event::Execute(ExecuteEvent::EntryFailed {
                        path: operation.source.clone(),
                        reason: reason.clone(),
                    }));
                    tally
                        .errors
                        .push(ProcessingError::new(&operation.source, ErrorStage::Execution, reason));
                }
                Err(source) => {
                    let completed = already_done + tally.processed + tally.skipped;
                    let pending = already_done + work.len() - completed;
                    tracing::error!("Journal write failed, aborting run: {}", source);
                    events.send(Event::Pipeline(PipelineEvent::Error {
                        message: source.to_string(),
                    }));
                    return Err(OrbitError::RunAborted {
                        completed,
                        pending,
                        source,
                    });
                }
            }

            events.send(Event::Execute(ExecuteEvent::Progress(ExecuteProgress {
                completed: index + 1,
                total: work.len(),
                current_path: operation.source.clone(),
                bytes_processed: tally.bytes,
            })));
        }

        events.send(Event::Execute(ExecuteEvent::Completed {
            processed: tally.processed,
            failed: tally.failed,
        }));
        Ok(tally)
    }

    fn finish(&self, result: &RunResult, events: &EventSender) {
        tracing::info!(
            "Run {:?}: {} processed, {} skipped, {} failed in {}ms",
            result.state,
            result.processed,
            result.skipped,
            result.failed,
            result.duration_ms
        );
        if result.state == RunState::Completed {
            events.send(Event::Pipeline(PipelineEvent::Completed {
                summary: result.pipeline_summary(),
            }));
        }
    }
}

impl Tally {
    fn state(&self) -> RunState {
        if self.interrupted {
            RunState::Interrupted
        } else {
            RunState::Completed
        }
    }
}

/// Size for progress accounting; a completed move only has a destination
fn size_of(source: &Path, destination: &Path) -> u64 {
    fs::metadata(source)
        .or_else(|_| fs::metadata(destination))
        .map(|m| m.len())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::journal::{replay, RecordState};
    use crate::error::MetadataError;
    use chrono::{NaiveDate, NaiveDateTime};
    use tempfile::TempDir;

    fn may_first() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    /// Files named `nodate*` have no timestamp, everything else is May 1st
    fn by_name(path: &Path, _: ExtractionMode) -> std::result::Result<Option<NaiveDateTime>, MetadataError> {
        let undated = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("nodate"));
        Ok((!undated).then(may_first))
    }

    struct Fixture {
        _temp: TempDir,
        source: PathBuf,
        destination: PathBuf,
    }

    fn fixture(files: &[(&str, &str)]) -> Fixture {
        let temp = TempDir::new().unwrap();
        let root = fs::canonicalize(temp.path()).unwrap();
        let source = root.join("photos");
        fs::create_dir_all(&source).unwrap();
        for (name, bytes) in files {
            let path = source.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, bytes).unwrap();
        }
        Fixture {
            _temp: temp,
            source,
            destination: root.join("library"),
        }
    }

    impl Fixture {
        fn builder(&self) -> OrganizerBuilder {
            Organizer::builder()
                .source(&self.source)
                .destination(&self.destination)
                .pattern("%Y/%m")
                .workers(2)
                .extractor(by_name)
        }
    }

    #[test]
    fn build_rejects_bad_settings() {
        let f = fixture(&[("a.jpg", "a")]);

        assert!(matches!(
            Organizer::builder().source(&f.source).build(),
            Err(OrbitError::Config(_))
        ));
        assert!(matches!(
            f.builder().pattern("%Y/%q").build(),
            Err(OrbitError::Pattern(_))
        ));
        assert!(matches!(
            f.builder().workers(0).build(),
            Err(OrbitError::Config(_))
        ));
        assert!(matches!(
            f.builder().destination(&f.source).build(),
            Err(OrbitError::Config(_))
        ));
        assert!(matches!(
            f.builder().destination(f.source.join("sorted")).build(),
            Err(OrbitError::Config(_))
        ));
        assert!(f
            .builder()
            .destination(f.source.join("sorted"))
            .recursive(false)
            .build()
            .is_ok());
    }

    #[test]
    fn plan_without_sources_is_an_error() {
        let f = fixture(&[]);
        let organizer = Organizer::builder()
            .destination(&f.destination)
            .build()
            .unwrap();
        assert!(matches!(
            organizer.plan(&EventSender::disabled()),
            Err(OrbitError::Config(_))
        ));
    }

    #[test]
    fn plan_maps_dated_and_undated_files() {
        let f = fixture(&[("a.jpg", "a"), ("nodate.jpg", "b")]);
        let plan = f.builder().build().unwrap().plan(&EventSender::disabled()).unwrap();

        assert_eq!(plan.entries.len(), 2);
        assert_eq!(plan.entries[0].destination, f.destination.join("2024/05/a.jpg"));
        assert_eq!(plan.entries[0].action, PlanAction::Copy);
        assert_eq!(
            plan.entries[1].destination,
            f.destination.join("Unsorted/nodate.jpg")
        );
        assert_eq!(plan.summary().unsorted, 1);
    }

    #[test]
    fn strict_mode_skips_undated_files() {
        let f = fixture(&[("a.jpg", "a"), ("nodate.jpg", "b")]);
        let plan = f
            .builder()
            .extraction_mode(ExtractionMode::Strict)
            .build()
            .unwrap()
            .plan(&EventSender::disabled())
            .unwrap();

        assert_eq!(
            plan.entries[1].action,
            PlanAction::Skip {
                reason: SkipReason::MetadataMissingInStrictMode
            }
        );
    }

    #[test]
    fn skip_strategy_keeps_first_duplicate() {
        let f = fixture(&[("x/p.jpg", "same"), ("y/p.jpg", "same"), ("z/q.jpg", "other")]);
        let plan = f
            .builder()
            .duplicates(Some(DuplicateStrategy::Skip))
            .build()
            .unwrap()
            .plan(&EventSender::disabled())
            .unwrap();

        assert_eq!(plan.duplicate_groups.len(), 1);
        assert_eq!(plan.entries[0].action, PlanAction::Copy);
        assert_eq!(
            plan.entries[1].action,
            PlanAction::Skip {
                reason: SkipReason::Duplicate
            }
        );
        assert_eq!(plan.entries[0].duplicate_group, Some(1));
        // The skipped twin does not compete for the name
        assert_eq!(plan.entries[0].destination, f.destination.join("2024/05/p.jpg"));
    }

    #[test]
    fn simulate_writes_trace_but_no_journal() {
        let f = fixture(&[("a.jpg", "a")]);
        let organizer = f
            .builder()
            .duplicates(Some(DuplicateStrategy::All))
            .build()
            .unwrap();

        let result = organizer.simulate(&EventSender::disabled()).unwrap();

        assert_eq!(result.state, RunState::Simulated);
        assert_eq!(result.processed, 1);
        assert!(organizer.trace_path().exists());
        assert!(f.destination.join(DUPLICATES_FILE_NAME).exists());
        assert!(!organizer.journal_path().exists());
        assert!(!f.destination.join("2024").exists());
    }

    #[test]
    fn run_copies_and_journals_everything() {
        let f = fixture(&[("a.jpg", "a"), ("b.jpg", "bb")]);
        let organizer = f.builder().verify(true).build().unwrap();

        let result = organizer
            .run(&EventSender::disabled(), &CancellationToken::new())
            .unwrap();

        assert_eq!(result.state, RunState::Completed);
        assert_eq!(result.processed, 2);
        assert_eq!(result.processed_bytes, 3);
        assert!(f.source.join("a.jpg").exists());
        assert_eq!(fs::read(f.destination.join("2024/05/b.jpg")).unwrap(), b"bb");

        let state = replay(&organizer.journal_path()).unwrap();
        assert!(state.is_finished());
        assert!(state.operations().all(|op| op.digest.is_some()));
    }

    #[test]
    fn cancelled_run_is_interrupted_then_resumed() {
        let f = fixture(&[("a.jpg", "a"), ("b.jpg", "b")]);
        let organizer = f.builder().build().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = organizer.run(&EventSender::disabled(), &cancel).unwrap();
        assert_eq!(result.state, RunState::Interrupted);
        assert_eq!(result.processed, 0);

        // A new run must not start over an unfinished journal
        let again = organizer.run(&EventSender::disabled(), &CancellationToken::new());
        assert!(matches!(
            again,
            Err(OrbitError::Journal(JournalError::UnfinishedRun { pending: 2, .. }))
        ));

        let resumed = organizer
            .resume(&EventSender::disabled(), &CancellationToken::new())
            .unwrap();
        assert_eq!(resumed.state, RunState::Completed);
        assert_eq!(resumed.processed, 2);
        assert!(f.destination.join("2024/05/a.jpg").exists());
    }

    #[test]
    fn resume_skips_done_operations() {
        let f = fixture(&[("a.jpg", "a"), ("b.jpg", "b")]);
        let organizer = f.builder().build().unwrap();
        organizer
            .run(&EventSender::disabled(), &CancellationToken::new())
            .unwrap();

        let resumed = organizer
            .resume(&EventSender::disabled(), &CancellationToken::new())
            .unwrap();

        assert_eq!(resumed.already_done, 2);
        assert_eq!(resumed.processed, 0);
    }

    #[test]
    fn resume_without_journal_is_an_error() {
        let f = fixture(&[("a.jpg", "a")]);
        let organizer = f.builder().build().unwrap();
        let result = organizer.resume(&EventSender::disabled(), &CancellationToken::new());
        assert!(matches!(
            result,
            Err(OrbitError::Journal(JournalError::NotFound { .. }))
        ));
    }

    #[test]
    fn undo_removes_copies_and_journal() {
        let f = fixture(&[("a.jpg", "a"), ("nodate.jpg", "b")]);
        let organizer = f.builder().build().unwrap();
        organizer
            .run(&EventSender::disabled(), &CancellationToken::new())
            .unwrap();

        let report = organizer.undo(&EventSender::disabled()).unwrap();

        assert_eq!(report.undone(), 2);
        assert!(report.journal_removed);
        assert!(!organizer.journal_path().exists());
        assert!(!f.destination.join("2024").exists());
        assert!(!f.destination.join("Unsorted").exists());
        assert!(f.source.join("a.jpg").exists());
    }

    #[test]
    fn undo_reverses_newest_first() {
        let f = fixture(&[("a.jpg", "a"), ("b.jpg", "b")]);
        let organizer = f
            .builder()
            .operation(OperationMode::Move)
            .build()
            .unwrap();
        organizer
            .run(&EventSender::disabled(), &CancellationToken::new())
            .unwrap();
        assert!(!f.source.join("a.jpg").exists());

        let report = organizer.undo(&EventSender::disabled()).unwrap();

        let ids: Vec<u64> = report.records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 0]);
        assert!(f.source.join("a.jpg").exists());
        assert!(f.source.join("b.jpg").exists());
    }

    #[test]
    fn journal_write_failure_aborts_and_stays_resumable() {
        let f = fixture(&[("a.jpg", "a"), ("b.jpg", "bb"), ("c.jpg", "c")]);
        let organizer = f.builder().build().unwrap();
        let plan = organizer.plan(&EventSender::disabled()).unwrap();
        let work: Vec<(Operation, u64)> = plan
            .entries
            .iter()
            .map(|entry| (entry.operation(), entry.source.size))
            .collect();

        fs::create_dir_all(&f.destination).unwrap();
        let mut journal = Journal::create(&organizer.journal_path()).unwrap();
        journal.record_plan(&plan.entries).unwrap();
        organizer
            .execute(&work[..1], &mut journal, 0, &EventSender::disabled(), &CancellationToken::new())
            .unwrap();
        drop(journal);

        // From here on the journal cannot be appended to
        let mut broken = Journal::open_read_only(&organizer.journal_path()).unwrap();
        let aborted = organizer.execute(
            &work[1..],
            &mut broken,
            1,
            &EventSender::disabled(),
            &CancellationToken::new(),
        );
        drop(broken);

        assert!(matches!(
            aborted,
            Err(OrbitError::RunAborted {
                completed: 1,
                pending: 2,
                source: JournalError::Write { .. },
            })
        ));
        assert!(f.destination.join("2024/05/a.jpg").exists());
        assert!(!f.destination.join("2024/05/b.jpg").exists());

        let resumed = organizer
            .resume(&EventSender::disabled(), &CancellationToken::new())
            .unwrap();

        assert_eq!(resumed.state, RunState::Completed);
        assert_eq!(resumed.already_done, 1);
        assert_eq!(resumed.processed, 2);
        assert_eq!(fs::read(f.destination.join("2024/05/b.jpg")).unwrap(), b"bb");
        assert!(replay(&organizer.journal_path()).unwrap().is_finished());
    }

    #[test]
    fn later_run_never_overwrites_existing_files() {
        let f = fixture(&[("a.jpg", "new")]);
        fs::create_dir_all(f.destination.join("2024/05")).unwrap();
        fs::write(f.destination.join("2024/05/a.jpg"), b"old").unwrap();
        let organizer = f.builder().build().unwrap();

        let plan = organizer.plan(&EventSender::disabled()).unwrap();
        assert_eq!(plan.entries[0].destination, f.destination.join("2024/05/a_1.jpg"));

        organizer
            .run(&EventSender::disabled(), &CancellationToken::new())
            .unwrap();
        organizer.undo(&EventSender::disabled()).unwrap();

        assert_eq!(fs::read(f.destination.join("2024/05/a.jpg")).unwrap(), b"old");
        assert!(!f.destination.join("2024/05/a_1.jpg").exists());
    }

    #[test]
    fn in_progress_record_is_retried_on_resume() {
        let f = fixture(&[("a.jpg", "complete")]);
        let organizer = f.builder().build().unwrap();
        let plan = organizer.plan(&EventSender::disabled()).unwrap();

        // Crash right after the copy started: partial file, in-progress record
        fs::create_dir_all(f.destination.join("2024/05")).unwrap();
        fs::write(f.destination.join("2024/05/a.jpg"), b"comp").unwrap();
        let mut journal = Journal::create(&organizer.journal_path()).unwrap();
        journal.record_plan(&plan.entries).unwrap();
        journal.record_start(0).unwrap();
        drop(journal);

        let state = replay(&organizer.journal_path()).unwrap();
        assert_eq!(state.get(0).unwrap().state, RecordState::InProgress);

        organizer
            .resume(&EventSender::disabled(), &CancellationToken::new())
            .unwrap();

        assert_eq!(
            fs::read(f.destination.join("2024/05/a.jpg")).unwrap(),
            b"complete"
        );
        assert!(replay(&organizer.journal_path()).unwrap().is_finished());
    }
}
