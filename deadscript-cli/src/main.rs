//! deadscript CLI - dead code finder and safe remover for script projects.
//!
//! Features:
//! - Reachability from framework callbacks, triggers and protected names
//! - Bridge calls from HTML templates resolved to server functions
//! - Risk-gated deletion behind a verified snapshot
//! - Rollback to any snapshot
//! - JSON, markdown, tree, remediation script and DOT reports

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Component, PathBuf};

use deadscript_core::{
    init_structured_logging, remove_function, Confirm, Deadscript, DeadscriptError,
    DeadscriptResult, DeletionTarget, MutationReport, Pipeline, PipelineOptions, PipelineOutcome,
    PipelineState, RiskLevel,
};

/// Where `--auto` writes reports when `--report-dir` is not given.
const DEFAULT_REPORT_DIR: &str = ".deadscript/reports";

const EXIT_DONE: i32 = 0;
const EXIT_ABORTED: i32 = 1;
const EXIT_FATAL: i32 = 2;

#[derive(Parser, Debug)]
#[command(author, version, about = "Dead code finder and safe remover for script projects")]
pub struct Cli {
    /// Path to the root of the project
    #[arg(default_value = ".")]
    path: String,

    /// Analyse and report only; never touch the tree
    #[arg(long)]
    dry_run: bool,

    /// Highest risk level that may be deleted (low, medium, high)
    #[arg(long, default_value = "low", value_parser = parse_risk_level)]
    risk_level: RiskLevel,

    /// Do not ask before backing up and deleting
    #[arg(long)]
    non_interactive: bool,

    /// Non-interactive, and write every report form to disk
    #[arg(long)]
    auto: bool,

    /// Command run in the project root after deletion; non-zero exit fails
    #[arg(long, value_name = "CMD")]
    validate: Option<String>,

    /// Directory to write report.json, summary.md, tree.txt, remediate.sh
    /// and graph.dot into
    #[arg(long, value_name = "DIR")]
    report_dir: Option<PathBuf>,

    /// Print the JSON report to stdout instead of the summary
    #[arg(long)]
    json: bool,

    /// Print the Graphviz DOT graph to stdout instead of the summary
    #[arg(long, conflicts_with = "json")]
    dot: bool,

    /// Name patterns that are always live (`prefix*`, `*suffix`, exact)
    #[arg(long, num_args = 1..)]
    protect: Vec<String>,

    /// Directory names to skip while scanning
    #[arg(long, num_args = 1..)]
    exclude: Vec<String>,

    /// Snapshot directory, relative to the project root
    #[arg(long, value_name = "DIR")]
    backup_dir: Option<String>,

    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Take a snapshot of the project
    Backup {
        /// Recorded in the snapshot metadata and id
        #[arg(long, default_value = "manual")]
        purpose: String,
    },

    /// List snapshots, oldest first
    Backups,

    /// Restore the project to a snapshot
    Rollback {
        /// Snapshot id as printed by `backup` or a deletion run
        id: String,

        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Remove one function definition from one file
    RemoveFunction {
        /// File path relative to the project root
        #[arg(long)]
        file: String,

        /// Function name
        #[arg(long)]
        name: String,

        /// Report what would be removed without writing
        #[arg(long)]
        dry_run: bool,
    },
}

fn parse_risk_level(s: &str) -> std::result::Result<RiskLevel, String> {
    s.parse::<RiskLevel>().map_err(|e| e.to_string())
}

/// Terminal confirmation through dialoguer.
struct PromptConfirm;

impl Confirm for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> DeadscriptResult<bool> {
        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .map_err(|e| DeadscriptError::Internal {
                message: format!("confirmation prompt failed: {}", e),
            })
    }
}

/// Rejects absolute paths and `..` so `--file` stays inside the root.
fn validate_relative_path(path: &str) -> Result<PathBuf> {
    if path.contains('\0') {
        return Err(anyhow!("Path contains null bytes"));
    }
    let p = PathBuf::from(path);
    if p.is_absolute() {
        return Err(anyhow!("Path must be relative to the project root: {}", path));
    }
    if p.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir)) {
        return Err(anyhow!("Path traversal (..) not allowed: {}", path));
    }
    Ok(p)
}

fn project(cli: &Cli) -> Result<Deadscript> {
    let root = PathBuf::from(&cli.path);
    if !root.is_dir() {
        return Err(anyhow!("Not a directory: {}", root.display()));
    }
    let mut project = Deadscript::from_root(root)?
        .protect(cli.protect.iter().cloned())
        .exclude_dirs(cli.exclude.iter().cloned());
    if let Some(cmd) = &cli.validate {
        project = project.validate_with(cmd.clone());
    }
    if let Some(dir) = &cli.backup_dir {
        project = project.backup_dir(dir.clone());
    }
    Ok(project)
}

fn describe(target: &DeletionTarget) -> String {
    match target {
        DeletionTarget::File { path } => format!("delete file {}", path),
        DeletionTarget::Function { path, name } => format!("remove function {} from {}", name, path),
    }
}

fn print_mutation(report: &MutationReport, dry_run: bool) {
    if dry_run {
        eprintln!("[deadscript] Dry run: {} change(s) would be made", report.simulated.len());
        for change in &report.simulated {
            eprintln!(
                "  would {} ({} -> {} bytes)",
                describe(&change.target),
                change.before_size,
                change.after_size
            );
        }
    } else {
        eprintln!(
            "[deadscript] Applied {} deletion(s), freed {} bytes",
            report.records.len(),
            report.bytes_freed()
        );
        for record in &report.records {
            eprintln!("  {}", describe(&record.target));
        }
        for dir in &report.dirs_removed {
            eprintln!("  removed empty directory {}", dir);
        }
    }
    for failure in &report.failures {
        eprintln!("  [WARN] {}: {}", describe(&failure.target), failure.message);
    }
}

fn run_pipeline(cli: &Cli) -> Result<i32> {
    let project = project(cli)?;
    let root = project.root().to_path_buf();
    let options = PipelineOptions {
        dry_run: cli.dry_run,
        threshold: cli.risk_level,
        interactive: !(cli.non_interactive || cli.auto),
    };

    let outcome: PipelineOutcome = Pipeline::new(project, options).run(&mut PromptConfirm)?;

    if cli.json {
        println!("{}", outcome.reports.json);
    } else if cli.dot {
        println!("{}", outcome.reports.dot);
    } else {
        print!("{}", outcome.reports.summary);
    }

    let report_dir = match (&cli.report_dir, cli.auto) {
        (Some(dir), _) => Some(dir.clone()),
        (None, true) => Some(root.join(DEFAULT_REPORT_DIR)),
        (None, false) => None,
    };
    if let Some(dir) = report_dir {
        let written = outcome
            .reports
            .write_to_dir(&dir)
            .with_context(|| format!("Failed to write reports to {}", dir.display()))?;
        eprintln!("[deadscript] {} report(s) written to {}", written.len(), dir.display());
    }

    if let Some(report) = &outcome.mutation {
        print_mutation(report, cli.dry_run);
    }
    if let Some(id) = &outcome.snapshot_id {
        eprintln!("[deadscript] Snapshot: {}", id);
    }
    if let Some(hint) = &outcome.rollback_hint {
        eprintln!("[deadscript] Validation failed. Restore with:");
        eprintln!("  {}", hint);
    }

    let states: Vec<String> = outcome.states.iter().map(|s| s.to_string()).collect();
    tracing::debug!(states = %states.join(" -> "), "pipeline finished");
    eprintln!("[deadscript] Finished: {}", outcome.final_state);

    Ok(match outcome.final_state {
        PipelineState::Done => EXIT_DONE,
        _ => EXIT_ABORTED,
    })
}

fn run_command(cli: &Cli, command: &Command) -> Result<i32> {
    let project = project(cli)?;
    let manager = project.backup_manager();

    match command {
        Command::Backup { purpose } => {
            let snapshot = manager
                .create_backup(purpose)
                .context("Failed to create snapshot")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&snapshot.metadata)?);
            } else {
                println!("{}", snapshot.id());
            }
            eprintln!(
                "[deadscript] Snapshot of {} file(s) written to {}",
                snapshot.metadata.file_count,
                snapshot.dir.display()
            );
            Ok(EXIT_DONE)
        }

        Command::Backups => {
            let snapshots = manager.list_snapshots().context("Failed to list snapshots")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&snapshots)?);
            } else if snapshots.is_empty() {
                println!("No snapshots in {}", manager.backup_dir().display());
            } else {
                for meta in &snapshots {
                    println!(
                        "{}  {}  {:>5} file(s)  {}",
                        meta.id,
                        meta.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        meta.file_count,
                        meta.purpose
                    );
                }
            }
            Ok(EXIT_DONE)
        }

        Command::Rollback { id, yes } => {
            if !yes {
                let prompt = format!(
                    "Restore {} to snapshot {}? Current files will be replaced.",
                    project.root().display(),
                    id
                );
                if !PromptConfirm.confirm(&prompt)? {
                    eprintln!("[deadscript] Rollback cancelled");
                    return Ok(EXIT_ABORTED);
                }
            }
            let report = manager
                .rollback(id)
                .with_context(|| format!("Rollback to {} failed", id))?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Restored {} file(s) from {} ({} removed). Safety snapshot: {}",
                    report.files_restored,
                    report.restored_from,
                    report.files_removed,
                    report.safety_snapshot
                );
            }
            Ok(EXIT_DONE)
        }

        Command::RemoveFunction { file, name, dry_run } => {
            let rel = validate_relative_path(file)?;
            let path = project.root().join(rel);
            let removed = remove_function(&path, name, *dry_run)
                .with_context(|| format!("Failed to edit {}", path.display()))?;
            if removed {
                let verb = if *dry_run { "Would remove" } else { "Removed" };
                eprintln!("[deadscript] {} {} from {}", verb, name, file);
                Ok(EXIT_DONE)
            } else {
                eprintln!("[deadscript] {} not found in {}", name, file);
                Ok(EXIT_ABORTED)
            }
        }
    }
}

/// Rollback command carried by a fatal pipeline error, if files were
/// already changed when it happened.
fn rollback_hint(err: &anyhow::Error) -> Option<&str> {
    match err.downcast_ref::<DeadscriptError>()? {
        DeadscriptError::Pipeline {
            rollback_hint: Some(hint),
            ..
        } => Some(hint.as_str()),
        _ => None,
    }
}

fn run(cli: &Cli) -> Result<i32> {
    match &cli.command {
        Some(command) => run_command(cli, command),
        None => run_pipeline(cli),
    }
}

fn main() {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("[PANIC] deadscript internal error: {}", info);
        eprintln!("[PANIC] The process will exit with code {}.", EXIT_FATAL);
    }));

    let cli = Cli::parse();
    init_structured_logging(cli.log_json);

    let code = match std::panic::catch_unwind(|| run(&cli)) {
        Ok(Ok(code)) => code,
        Ok(Err(e)) => {
            eprintln!("[deadscript] error: {:#}", e);
            if let Some(hint) = rollback_hint(&e) {
                eprintln!("[deadscript] Restore with:");
                eprintln!("  {}", hint);
            }
            EXIT_FATAL
        }
        Err(_) => EXIT_FATAL,
    };
    std::process::exit(code);
}
