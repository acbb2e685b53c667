//! The orchestrator: a strictly sequential state machine.
//!
//! ```text
//! Idle -> Analyzing -> Reporting -> AwaitingConfirmation -> BackingUp
//!      -> Mutating -> Validating -> Done
//! ```
//!
//! `Aborted` is reached when the operator declines or validation fails.
//! A failed backup is a fatal error labelled with its phase; nothing is
//! mutated after it. Dry runs go from `Reporting` straight to `Done`.
//! Validation failure never rolls back on its own; it hands the operator
//! the rollback command instead.

use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::process::Command;
use tracing::{error, info, warn};

use crate::builder::{Analysis, Deadscript};
use crate::error::{DeadscriptError, DeadscriptResult};
use crate::fix::{simulate, DeletionTarget, MutationExecutor, MutationReport};
use crate::report::RenderedReports;
use crate::risk::RiskLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineState {
    Idle,
    Analyzing,
    Reporting,
    AwaitingConfirmation,
    BackingUp,
    Mutating,
    Validating,
    Done,
    Aborted,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Analyzing => write!(f, "analyzing"),
            Self::Reporting => write!(f, "reporting"),
            Self::AwaitingConfirmation => write!(f, "awaiting confirmation"),
            Self::BackingUp => write!(f, "backing up"),
            Self::Mutating => write!(f, "mutating"),
            Self::Validating => write!(f, "validating"),
            Self::Done => write!(f, "done"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Operator acknowledgement before anything destructive happens.
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> DeadscriptResult<bool>;
}

/// Answers yes without asking.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, prompt: &str) -> DeadscriptResult<bool> {
        info!(%prompt, "confirmation assumed");
        Ok(true)
    }
}

/// External pass/fail gate run after mutation.
pub trait Validate {
    /// `Ok(true)` passes, `Ok(false)` fails, `Err` means it could not run.
    fn validate(&self, root: &Path) -> DeadscriptResult<bool>;
}

/// Runs a shell command in the project root; only the exit status counts.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    command: String,
}

impl CommandValidator {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl Validate for CommandValidator {
    fn validate(&self, root: &Path) -> DeadscriptResult<bool> {
        info!(command = %self.command, "running validation");
        let status = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(root)
            .status()
            .map_err(|e| {
                DeadscriptError::validation(format!("could not run '{}': {}", self.command, e))
            })?;
        if !status.success() {
            warn!(command = %self.command, code = ?status.code(), "validation failed");
        }
        Ok(status.success())
    }
}

/// Invocation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Analysis and reporting only
    pub dry_run: bool,
    /// Highest risk level the executor may touch
    pub threshold: RiskLevel,
    /// Ask before backing up and deleting
    pub interactive: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            threshold: RiskLevel::Low,
            interactive: true,
        }
    }
}

/// Everything a run produced.
#[derive(Debug)]
pub struct PipelineOutcome {
    /// States entered, in order
    pub states: Vec<PipelineState>,
    pub final_state: PipelineState,
    pub analysis: Analysis,
    pub reports: RenderedReports,
    pub plan: Vec<DeletionTarget>,
    pub snapshot_id: Option<String>,
    /// Applied or simulated deletions
    pub mutation: Option<MutationReport>,
    pub validation_passed: Option<bool>,
    /// Command that restores the pre-mutation tree, set when validation failed
    pub rollback_hint: Option<String>,
}

impl PipelineOutcome {
    pub fn succeeded(&self) -> bool {
        self.final_state == PipelineState::Done
    }
}

/// Command line that rolls `root` back to snapshot `id`.
pub fn rollback_command(root: &Path, id: &str) -> String {
    format!("deadscript {} rollback {}", root.display(), id)
}

pub struct Pipeline {
    project: Deadscript,
    options: PipelineOptions,
    validator: Option<Box<dyn Validate>>,
    state: PipelineState,
    states: Vec<PipelineState>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("root", &self.project.root())
            .field("options", &self.options)
            .field("has_validator", &self.validator.is_some())
            .field("state", &self.state)
            .finish()
    }
}

impl Pipeline {
    /// Uses the configured validation command, if any.
    pub fn new(project: Deadscript, options: PipelineOptions) -> Self {
        let validator = project
            .config()
            .validation
            .command
            .clone()
            .map(|cmd| Box::new(CommandValidator::new(cmd)) as Box<dyn Validate>);
        Self {
            project,
            options,
            validator,
            state: PipelineState::Idle,
            states: Vec::new(),
        }
    }

    pub fn with_validator(mut self, validator: Box<dyn Validate>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn without_validation(mut self) -> Self {
        self.validator = None;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn enter(&mut self, next: PipelineState) {
        info!(from = %self.state, to = %next, "pipeline transition");
        self.state = next;
        self.states.push(next);
    }

    fn fail(&mut self, message: impl Into<String>, rollback_hint: Option<String>) -> DeadscriptError {
        let err = DeadscriptError::pipeline(self.state, message, rollback_hint);
        match &err {
            DeadscriptError::Pipeline {
                rollback_hint: Some(hint),
                ..
            } => error!(phase = %self.state, error = %err, rollback = %hint, "pipeline halted"),
            _ => error!(phase = %self.state, error = %err, "pipeline halted"),
        }
        err
    }

    /// Runs the pipeline to a terminal state.
    ///
    /// Returns `Err` only for fatal failures (analysis, reporting, backup,
    /// a validator that could not run); declining and failed validation
    /// end in `Aborted` with an `Ok` outcome.
    pub fn run(mut self, confirm: &mut dyn Confirm) -> DeadscriptResult<PipelineOutcome> {
        let root = self.project.root().to_path_buf();

        self.enter(PipelineState::Analyzing);
        let analysis = match self.project.analyze() {
            Ok(a) => a,
            Err(e) => return Err(self.fail(format!("{:#}", e), None)),
        };

        self.enter(PipelineState::Reporting);
        let validate_cmd = self.project.config().validation.command.clone();
        let reports = match RenderedReports::render(&analysis.report_model(), validate_cmd.as_deref()) {
            Ok(r) => r,
            Err(e) => return Err(self.fail(e.to_string(), None)),
        };
        let plan = analysis.plan(self.options.threshold);

        let mut outcome = PipelineOutcome {
            states: Vec::new(),
            final_state: PipelineState::Idle,
            analysis,
            reports,
            plan,
            snapshot_id: None,
            mutation: None,
            validation_passed: None,
            rollback_hint: None,
        };

        if self.options.dry_run {
            outcome.mutation = Some(simulate(&root, &outcome.plan));
            return Ok(self.finish(outcome, PipelineState::Done));
        }

        if outcome.plan.is_empty() {
            info!(threshold = %self.options.threshold, "nothing to delete at this risk level");
            return Ok(self.finish(outcome, PipelineState::Done));
        }

        if self.options.interactive {
            self.enter(PipelineState::AwaitingConfirmation);
            let files = outcome
                .plan
                .iter()
                .filter(|t| matches!(t, DeletionTarget::File { .. }))
                .count();
            let prompt = format!(
                "Delete {} file(s) and {} function(s) rated {} or lower in {}?",
                files,
                outcome.plan.len() - files,
                self.options.threshold,
                root.display()
            );
            match confirm.confirm(&prompt) {
                Ok(true) => {}
                Ok(false) => {
                    info!("operator declined, nothing changed");
                    return Ok(self.finish(outcome, PipelineState::Aborted));
                }
                Err(e) => return Err(self.fail(e.to_string(), None)),
            }
        }

        self.enter(PipelineState::BackingUp);
        let manager = self.project.backup_manager();
        let snapshot = match manager.create_backup("pre-delete") {
            Ok(s) => s,
            Err(e) => return Err(self.fail(format!("{}; nothing was deleted", e), None)),
        };
        let hint = rollback_command(&root, snapshot.id());
        outcome.snapshot_id = Some(snapshot.id().to_string());

        self.enter(PipelineState::Mutating);
        let report = MutationExecutor::new(&root, &snapshot).apply(&outcome.plan);
        if let Err(e) = manager.record_deletions(&snapshot, &report.records) {
            warn!(snapshot = %snapshot.id(), error = %e, "deletion log not written");
        }
        outcome.mutation = Some(report);

        let Some(validator) = self.validator.take() else {
            return Ok(self.finish(outcome, PipelineState::Done));
        };

        self.enter(PipelineState::Validating);
        match validator.validate(&root) {
            Ok(true) => {
                outcome.validation_passed = Some(true);
                Ok(self.finish(outcome, PipelineState::Done))
            }
            Ok(false) => {
                warn!(rollback = %hint, "validation failed; roll back with the printed command");
                outcome.validation_passed = Some(false);
                outcome.rollback_hint = Some(hint);
                Ok(self.finish(outcome, PipelineState::Aborted))
            }
            Err(e) => Err(self.fail(e.to_string(), Some(hint))),
        }
    }

    fn finish(&mut self, mut outcome: PipelineOutcome, last: PipelineState) -> PipelineOutcome {
        self.enter(last);
        outcome.states = std::mem::take(&mut self.states);
        outcome.final_state = last;
        outcome
    }
}
