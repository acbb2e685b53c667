//! deadscript-core: reachability analysis and safe dead-code removal for
//! script projects (server modules, HTML templates, manifest files).
//!
//! # Features
//!
//! - **Lexical extraction**: definitions, calls, bridge calls and inclusion
//!   directives found without a parser, over a comment/string-neutral view
//! - **Cross-boundary graph**: frontend bridge calls resolve to backend
//!   functions; templates include templates
//! - **Mark phase**: multi-source BFS from framework callbacks, protected
//!   patterns and trigger registrations
//! - **Risk rating**: ordered heuristics gate what may be deleted
//! - **Snapshots**: verified, write-once backups with rollback
//! - **Sweep phase**: file and single-function removal with per-item
//!   failure isolation
//! - **Reports**: JSON, markdown summary, dependency tree, remediation
//!   script and Graphviz DOT from one model
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use deadscript_core::prelude::*;
//!
//! let outcome = Pipeline::new(Deadscript::from_root(".")?, PipelineOptions {
//!     dry_run: true,
//!     ..PipelineOptions::default()
//! })
//! .run(&mut AssumeYes)?;
//!
//! println!("{}", outcome.reports.summary);
//! ```
//!
//! # Module Organization
//!
//! - [`scan`]: deterministic file discovery
//! - [`extract`]: lexer, markup masking and pattern-based extraction
//! - [`graph`]: dependency graph construction
//! - [`roots`]: the always-live root set
//! - [`reach`]: reachability marking
//! - [`risk`]: deletion-risk classification
//! - [`backup`]: snapshots and rollback
//! - [`fix`]: deletion planning and execution
//! - [`report`]: report forms
//! - [`pipeline`]: the orchestrating state machine
//! - [`builder`]: fluent analysis API
//! - [`error`]: typed error handling
//!
//! # Cargo Features
//!
//! - `dot` (default): Graphviz DOT report form

pub mod backup;
pub mod builder;
pub mod config;
pub mod error;
pub mod extract;
pub mod fix;
pub mod graph;
pub mod logging;
pub mod pipeline;
pub mod prelude;
pub mod reach;
pub mod report;
pub mod risk;
pub mod roots;
pub mod scan;
pub mod source;

// ============================================================================
// Explicit Re-exports (avoiding glob imports for clear API surface)
// ============================================================================

// Error types
pub use error::{DeadscriptError, DeadscriptResult, IoResultExt};

// Builder API
pub use builder::{Analysis, Deadscript};

// Configuration
pub use config::{load_config, load_config_or_default, DeadscriptConfig, CONFIG_FILE};

// Logging
pub use logging::init_structured_logging;

// Discovery
pub use scan::{gather_source_units, ScanOutcome};
pub use source::{SourceUnit, UnitKind};

// Extraction and graph
pub use extract::{Extraction, Extractor};
pub use graph::{DependencyGraph, EdgeKind, Node};

// Marking and rating
pub use reach::{analyze, AnalysisResult, UnusedFile, UnusedSymbol};
pub use risk::{RiskAssessment, RiskClassifier, RiskLevel, RiskRating};
pub use roots::RootSet;

// Snapshots
pub use backup::{BackupManager, RollbackReport, Snapshot, SnapshotMetadata, DEFAULT_BACKUP_DIR};

// Sweep
pub use fix::{
    plan_deletions, remove_file, remove_function, remove_function_from_source, simulate,
    DeletionRecord, DeletionTarget, MutationExecutor, MutationReport,
};

// Reports
pub use report::{RenderedReports, ReportModel};

// Orchestration
pub use pipeline::{
    rollback_command, AssumeYes, CommandValidator, Confirm, Pipeline, PipelineOptions,
    PipelineOutcome, PipelineState, Validate,
};
