//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use deadscript_core::prelude::*;
//! ```

// Core analysis types
pub use crate::error::{DeadscriptError, DeadscriptResult};
pub use crate::reach::AnalysisResult;
pub use crate::risk::{RiskAssessment, RiskLevel};

// Builder API
pub use crate::builder::{Analysis, Deadscript};

// Configuration
pub use crate::config::{load_config, DeadscriptConfig};

// Snapshots and deletion
pub use crate::backup::BackupManager;
pub use crate::fix::{DeletionTarget, MutationReport};

// Orchestration
pub use crate::pipeline::{AssumeYes, Confirm, Pipeline, PipelineOptions, PipelineOutcome, Validate};
