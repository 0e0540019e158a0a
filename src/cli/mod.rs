//! # CLI Module
//!
//! Command-line interface for the photo organizer.
//!
//! ## Usage
//! ```bash
//! # Preview where everything would go
//! orbit simulate ~/Card --dest ~/Pictures/Library
//!
//! # Copy, skipping byte-identical duplicates and verifying every copy
//! orbit copy ~/Card ~/Phone --dest ~/Pictures/Library --duplicates skip --verify
//!
//! # Continue after a crash or Ctrl-C, or reverse the last run
//! orbit resume --dest ~/Pictures/Library
//! orbit undo --dest ~/Pictures/Library
//!
//! # JSON output
//! orbit simulate ~/Card --dest ~/Pictures/Library --output json
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use photo_orbit::core::duplicates::DuplicateStrategy;
use photo_orbit::core::mapper::DEFAULT_PATTERN;
use photo_orbit::core::metadata::ExtractionMode;
use photo_orbit::core::orchestrator::{
    CancellationToken, Organizer, OrganizerBuilder, RunResult, RunState, UndoOutcome, UndoReport,
};
use photo_orbit::core::plan::OperationMode;
use photo_orbit::core::reporter::format_bytes;
use photo_orbit::error::{OrbitError, Result};
use photo_orbit::events::{
    Event, EventChannel, EventReceiver, ExecuteEvent, PipelineEvent, PlanEvent, ScanEvent,
    UndoEvent,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;

/// Photo Orbit - organize photos by date, safely
#[derive(Parser, Debug)]
#[command(name = "orbit")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Plan a run and write the trace and reports without touching any photo
    Simulate(OrganizeArgs),
    /// Copy photos into the destination, keeping the originals
    Copy(OrganizeArgs),
    /// Move photos into the destination
    Move(OrganizeArgs),
    /// Continue an interrupted run from its journal
    Resume(ResumeArgs),
    /// Reverse the last run recorded in the destination
    Undo(DestinationArgs),
    /// Regenerate the HTML report from the saved trace
    Report(DestinationArgs),
}

#[derive(Args, Debug)]
struct OrganizeArgs {
    /// Source directories, scanned in order
    #[arg(required = true)]
    sources: Vec<PathBuf>,

    /// Destination root
    #[arg(short, long)]
    dest: PathBuf,

    /// Directory layout built from the capture date
    #[arg(short, long, default_value = DEFAULT_PATTERN)]
    pattern: String,

    /// Only look at files directly inside each source
    #[arg(long)]
    no_recursive: bool,

    /// Where capture timestamps may come from
    #[arg(short, long, default_value = "normal")]
    mode: Mode,

    /// Re-hash every copy and compare with its source
    #[arg(long)]
    verify: bool,

    /// Detect byte-identical files (`all` keeps every copy, `skip` keeps the first)
    #[arg(long, num_args = 0..=1, default_missing_value = "all")]
    duplicates: Option<Duplicates>,

    /// Never treat empty files as duplicates
    #[arg(long)]
    ignore_empty: bool,

    /// Worker threads for metadata and digest lookups
    #[arg(short, long)]
    workers: Option<usize>,

    /// Include hidden files and directories
    #[arg(long)]
    include_hidden: bool,

    /// Also write the HTML report
    #[arg(long)]
    report: bool,
}

#[derive(Args, Debug)]
struct ResumeArgs {
    /// Destination root of the interrupted run
    #[arg(short, long)]
    dest: PathBuf,

    /// Re-hash every copy and compare with its source
    #[arg(long)]
    verify: bool,
}

#[derive(Args, Debug)]
struct DestinationArgs {
    /// Destination root of the run
    #[arg(short, long)]
    dest: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// EXIF DateTimeOriginal only; undated photos are skipped
    Strict,
    /// EXIF DateTimeOriginal, then DateTime (default)
    Normal,
    /// Also fall back to the file modification time
    Flexible,
}

impl From<Mode> for ExtractionMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Strict => ExtractionMode::Strict,
            Mode::Normal => ExtractionMode::Normal,
            Mode::Flexible => ExtractionMode::Flexible,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Duplicates {
    /// Organize every copy, report the groups
    All,
    /// Organize the first copy only
    Skip,
}

impl From<Duplicates> for DuplicateStrategy {
    fn from(duplicates: Duplicates) -> Self {
        match duplicates {
            Duplicates::All => DuplicateStrategy::All,
            Duplicates::Skip => DuplicateStrategy::Skip,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
}

/// Run the CLI
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    photo_orbit::init_tracing(cli.verbose);
    let term = Term::stderr();

    let outcome = match cli.command {
        Commands::Simulate(args) => organize(&term, cli.output, args, None),
        Commands::Copy(args) => organize(&term, cli.output, args, Some(OperationMode::Copy)),
        Commands::Move(args) => organize(&term, cli.output, args, Some(OperationMode::Move)),
        Commands::Resume(args) => resume(&term, cli.output, args),
        Commands::Undo(args) => undo(&term, cli.output, args),
        Commands::Report(args) => report(&term, cli.output, args),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            term.write_line(&format!("{} {}", style("✗").red().bold(), e)).ok();
            if let OrbitError::RunAborted { .. } = e {
                term.write_line(&format!(
                    "  {}",
                    style("Fix the problem, then run `orbit resume`.").dim()
                ))
                .ok();
            }
            ExitCode::FAILURE
        }
    }
}

/// `None` simulates
fn organize(
    term: &Term,
    output: OutputFormat,
    args: OrganizeArgs,
    operation: Option<OperationMode>,
) -> Result<ExitCode> {
    let mut builder = Organizer::builder()
        .sources(args.sources)
        .destination(args.dest)
        .pattern(args.pattern)
        .recursive(!args.no_recursive)
        .extraction_mode(args.mode.into())
        .operation(operation.unwrap_or_default())
        .verify(args.verify)
        .duplicates(args.duplicates.map(Into::into))
        .ignore_empty(args.ignore_empty)
        .include_hidden(args.include_hidden)
        .generate_report(args.report);
    if let Some(workers) = args.workers {
        builder = builder.workers(workers);
    }
    let organizer = builder.build()?;

    print_header(term, output, &organizer);

    let (sender, receiver) = EventChannel::new();
    let progress = spawn_progress(output, receiver);

    let result = match operation {
        None => organizer.simulate(&sender),
        Some(_) => {
            let cancel = cancel_on_ctrl_c();
            organizer.run(&sender, &cancel)
        }
    };

    drop(sender);
    progress.join().ok();

    let result = result?;
    print_run_result(term, output, &result);
    Ok(exit_code(&result))
}

fn resume(term: &Term, output: OutputFormat, args: ResumeArgs) -> Result<ExitCode> {
    let organizer = destination_only(&args.dest).verify(args.verify).build()?;
    print_header(term, output, &organizer);

    let (sender, receiver) = EventChannel::new();
    let progress = spawn_progress(output, receiver);
    let cancel = cancel_on_ctrl_c();
    let result = organizer.resume(&sender, &cancel);
    drop(sender);
    progress.join().ok();

    let result = result?;
    print_run_result(term, output, &result);
    Ok(exit_code(&result))
}

fn undo(term: &Term, output: OutputFormat, args: DestinationArgs) -> Result<ExitCode> {
    let organizer = destination_only(&args.dest).build()?;

    let (sender, receiver) = EventChannel::new();
    let progress = spawn_progress(output, receiver);
    let report = organizer.undo(&sender);
    drop(sender);
    progress.join().ok();

    let report = report?;
    match output {
        OutputFormat::Pretty => print_undo_report(term, &report),
        OutputFormat::Json => print_json(&report),
    }
    Ok(if report.failed() == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn report(term: &Term, output: OutputFormat, args: DestinationArgs) -> Result<ExitCode> {
    let path = Organizer::report(&args.dest)?;
    match output {
        OutputFormat::Pretty => {
            term.write_line(&format!(
                "{} Report written to {}",
                style("✓").green().bold(),
                style(path.display()).cyan()
            ))
            .ok();
        }
        OutputFormat::Json => print_json(&serde_json::json!({ "report": path })),
    }
    Ok(ExitCode::SUCCESS)
}

fn destination_only(dest: &Path) -> OrganizerBuilder {
    Organizer::builder().destination(dest)
}

/// A token tripped by the first Ctrl-C; the run stops after the current entry
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let handle = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handle.cancel()) {
        tracing::warn!("Ctrl-C will not stop the run cleanly: {}", e);
    }
    cancel
}

fn exit_code(result: &RunResult) -> ExitCode {
    if result.state == RunState::Interrupted || result.failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Drive a progress bar from the event stream until the sender is dropped
fn spawn_progress(output: OutputFormat, receiver: EventReceiver) -> thread::JoinHandle<()> {
    let progress = matches!(output, OutputFormat::Pretty).then(|| {
        let pb = ProgressBar::new(0);
        let bar_style = ProgressStyle::default_bar()
            .template("{spinner:.green} {msg:<12} [{bar:40.cyan/blue}] {pos}/{len}")
            .map(|s| s.progress_chars("█▓░"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(bar_style);
        pb
    });

    thread::spawn(move || {
        for event in receiver.iter() {
            let Some(pb) = progress.as_ref() else {
                continue;
            };
            match event {
                Event::Pipeline(PipelineEvent::PhaseChanged { phase }) => {
                    pb.set_message(phase.to_string());
                }
                Event::Scan(ScanEvent::Progress(p)) => {
                    pb.set_position(p.photos_found as u64);
                }
                Event::Scan(ScanEvent::Error { path, message }) => {
                    pb.println(format!("  {} {}: {}", style("!").yellow(), path.display(), message));
                }
                Event::Plan(PlanEvent::LookupStarted { total_photos }) => {
                    pb.set_length(total_photos as u64);
                    pb.set_position(0);
                }
                Event::Plan(PlanEvent::LookupProgress { completed, .. }) => {
                    pb.set_position(completed as u64);
                }
                Event::Execute(ExecuteEvent::Started { total, .. }) => {
                    pb.set_length(total as u64);
                    pb.set_position(0);
                }
                Event::Execute(ExecuteEvent::Progress(p)) => {
                    pb.set_position(p.completed as u64);
                }
                Event::Execute(ExecuteEvent::EntryFailed { path, reason }) => {
                    pb.println(format!("  {} {}: {}", style("✗").red(), path.display(), reason));
                }
                Event::Undo(UndoEvent::Started { total }) => {
                    pb.set_length(total as u64);
                    pb.set_position(0);
                }
                Event::Undo(UndoEvent::Progress { completed, .. }) => {
                    pb.set_position(completed as u64);
                }
                Event::Pipeline(PipelineEvent::Cancelled) => {
                    pb.println(format!(
                        "  {} Stopping after the current file",
                        style("!").yellow()
                    ));
                }
                _ => {}
            }
        }
        if let Some(pb) = progress {
            pb.finish_and_clear();
        }
    })
}

fn print_header(term: &Term, output: OutputFormat, organizer: &Organizer) {
    if !matches!(output, OutputFormat::Pretty) {
        return;
    }
    term.write_line(&format!(
        "{} {}",
        style("Photo Orbit").bold().cyan(),
        style(concat!("v", env!("CARGO_PKG_VERSION"))).dim()
    ))
    .ok();
    term.write_line(&format!(
        "  {} {}",
        style("Destination:").dim(),
        organizer.config().destination.display()
    ))
    .ok();
    term.write_line("").ok();
}

fn print_run_result(term: &Term, output: OutputFormat, result: &RunResult) {
    match output {
        OutputFormat::Pretty => print_pretty_result(term, result),
        OutputFormat::Json => print_json(result),
    }
}

fn print_pretty_result(term: &Term, result: &RunResult) {
    let (marker, headline) = match result.state {
        RunState::Simulated => (style("✓").green().bold(), "Simulation Complete"),
        RunState::Completed => (style("✓").green().bold(), "Run Complete"),
        RunState::Interrupted => (style("!").yellow().bold(), "Run Interrupted"),
    };
    term.write_line(&format!("{} {}", marker, headline)).ok();
    term.write_line("").ok();

    let verb = if result.state == RunState::Simulated {
        "to organize"
    } else {
        "organized"
    };
    term.write_line(&format!(
        "  {} photos found ({})",
        style(result.files_found).cyan(),
        format_bytes(result.total_bytes)
    ))
    .ok();
    term.write_line(&format!(
        "  {} {} ({})",
        style(result.processed).cyan(),
        verb,
        format_bytes(result.processed_bytes)
    ))
    .ok();
    if result.already_done > 0 {
        term.write_line(&format!(
            "  {} already done before resuming",
            style(result.already_done).dim()
        ))
        .ok();
    }
    term.write_line(&format!(
        "  {} skipped, {} of them duplicates ({})",
        style(result.skipped).cyan(),
        style(result.duplicates).cyan(),
        format_bytes(result.duplicate_bytes)
    ))
    .ok();
    if result.failed > 0 {
        term.write_line(&format!("  {} failed", style(result.failed).red().bold()))
            .ok();
    }
    term.write_line(&format!(
        "  finished in {:.1}s",
        result.duration_ms as f64 / 1000.0
    ))
    .ok();

    if !result.errors.is_empty() {
        term.write_line("").ok();
        term.write_line(&format!("{}", style("Problems:").bold().underlined()))
            .ok();
        for error in &result.errors {
            term.write_line(&format!("  {} {}", style("○").dim(), error)).ok();
        }
    }

    let artifacts = &result.artifacts;
    let written: Vec<&PathBuf> = [
        &artifacts.journal,
        &artifacts.trace,
        &artifacts.duplicates,
        &artifacts.report,
    ]
    .into_iter()
    .flatten()
    .collect();
    if !written.is_empty() {
        term.write_line("").ok();
        for path in written {
            term.write_line(&format!("  {} {}", style("→").dim(), path.display()))
                .ok();
        }
    }

    if result.state == RunState::Interrupted {
        term.write_line("").ok();
        term.write_line(&format!(
            "{}",
            style("Run `orbit resume` to finish, or `orbit undo` to roll back.").dim()
        ))
        .ok();
    }
}

fn print_undo_report(term: &Term, report: &UndoReport) {
    let marker = if report.failed() == 0 {
        style("✓").green().bold()
    } else {
        style("!").yellow().bold()
    };
    term.write_line(&format!("{} Undo Complete", marker)).ok();
    term.write_line("").ok();
    term.write_line(&format!(
        "  {} undone, {} skipped, {} failed",
        style(report.undone()).cyan(),
        style(report.skipped()).dim(),
        style(report.failed()).red()
    ))
    .ok();

    for record in &report.records {
        if let UndoOutcome::Failed(reason) = &record.outcome {
            term.write_line(&format!(
                "  {} {}: {}",
                style("✗").red(),
                record.destination.display(),
                reason
            ))
            .ok();
        }
    }

    if report.journal_removed {
        term.write_line(&format!(
            "  {} empty directories removed, journal deleted",
            report.directories_removed
        ))
        .ok();
    } else {
        term.write_line(&format!(
            "{}",
            style("Journal kept; run `orbit undo` again once the problems are fixed.").dim()
        ))
        .ok();
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::error!("Cannot serialize output: {}", e),
    }
}
