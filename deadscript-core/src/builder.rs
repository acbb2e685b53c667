//! Builder pattern API for deadscript analysis.
//!
//! Provides a fluent interface for configuring and running an analysis:
//!
//! ```rust,ignore
//! use deadscript_core::prelude::*;
//!
//! let analysis = Deadscript::from_root("/path/to/project")?
//!     .protect(["legacy*"])
//!     .analyze()?;
//!
//! for symbol in &analysis.result.unused_symbols {
//!     println!("unused: {}", symbol.name);
//! }
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::backup::BackupManager;
use crate::config::{load_config_or_default, DeadscriptConfig};
use crate::extract::Extractor;
use crate::fix::{plan_deletions, DeletionTarget};
use crate::graph::{DependencyGraph, SkippedUnit};
use crate::reach::{analyze, AnalysisResult};
use crate::report::ReportModel;
use crate::risk::{RiskAssessment, RiskClassifier, RiskLevel};
use crate::roots::RootSet;
use crate::scan::gather_source_units;

/// Builder for configuring an analysis run.
#[derive(Debug, Clone)]
pub struct Deadscript {
    /// Root directory of the project to analyse
    root: PathBuf,

    /// Effective configuration (file plus overrides)
    config: DeadscriptConfig,

    /// Extra protected name patterns
    protected: Vec<String>,
}

impl Deadscript {
    /// Create a builder with default configuration.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config: DeadscriptConfig::default(),
            protected: Vec::new(),
        }
    }

    /// Create a builder configured from `deadscript.toml` at `root`, if any.
    pub fn from_root(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let config = load_config_or_default(&root)
            .with_context(|| format!("Failed to load configuration for {}", root.display()))?;
        Ok(Self::new(root).with_config(config))
    }

    pub fn with_config(mut self, config: DeadscriptConfig) -> Self {
        self.config = config;
        self
    }

    /// Add name patterns that are always live (`prefix*`, `*suffix`, exact).
    pub fn protect(mut self, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.protected.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Add directories to exclude from scanning and snapshots.
    pub fn exclude_dirs(mut self, dirs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.scan.exclude_dirs.extend(dirs.into_iter().map(Into::into));
        self
    }

    /// Override the validation command.
    pub fn validate_with(mut self, command: impl Into<String>) -> Self {
        self.config.validation.command = Some(command.into());
        self
    }

    /// Override the snapshot directory.
    pub fn backup_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.backup.dir = Some(dir.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &DeadscriptConfig {
        &self.config
    }

    /// Configured root set, before trigger registrations are added.
    pub fn root_set(&self) -> RootSet {
        RootSet::from_config(&self.config.roots).with_patterns(self.protected.iter().cloned())
    }

    /// Backup manager for this root, honouring the configured directory,
    /// exclusions and rollback checks.
    pub fn backup_manager(&self) -> BackupManager {
        let mut manager = BackupManager::new(&self.root)
            .with_excludes(&self.config.scan.exclude_dirs)
            .with_rollback_config(self.config.rollback.clone())
            .with_extract_config(&self.config.extract);
        if let Some(dir) = &self.config.backup.dir {
            manager = manager.with_backup_dir(dir);
        }
        manager
    }

    /// Run the analysis: scan, extract, build the graph, mark, rate.
    ///
    /// Has no side effects on the tree.
    pub fn analyze(&self) -> Result<Analysis> {
        let scan = gather_source_units(&self.root, &self.config.scan.exclude_dirs)
            .with_context(|| format!("Failed to scan {}", self.root.display()))?;

        let extractor = Extractor::new(&self.config.extract);
        let mut graph = DependencyGraph::build(&scan.units, &extractor);
        graph.skipped.extend(
            scan.skipped
                .into_iter()
                .map(|(path, reason)| SkippedUnit { path, reason }),
        );
        graph.skipped.sort();

        let roots = self.root_set().with_triggers(graph.triggers.iter().cloned());
        let result = analyze(&graph, &roots);
        let risks = RiskClassifier::new(&self.config.risk).assess(&result, &graph);

        info!(
            root = %self.root.display(),
            units = graph.units().len(),
            symbols = graph.symbols().len(),
            unused_files = result.unused_files.len(),
            unused_symbols = result.unused_symbols.len(),
            "analysis complete"
        );

        Ok(Analysis {
            root: self.root.clone(),
            graph,
            result,
            risks,
        })
    }
}

/// Output of one analysis run.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Root path that was analysed
    pub root: PathBuf,
    pub graph: DependencyGraph,
    pub result: AnalysisResult,
    pub risks: RiskAssessment,
}

impl Analysis {
    pub fn has_unused(&self) -> bool {
        self.result.has_unused()
    }

    /// Deletions permitted at `threshold`.
    pub fn plan(&self, threshold: RiskLevel) -> Vec<DeletionTarget> {
        plan_deletions(&self.result, &self.risks, threshold)
    }

    pub fn report_model(&self) -> ReportModel {
        ReportModel::build(&self.root, &self.graph, &self.result, &self.risks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn create_test_project() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir()
            .join("deadscript_builder_test")
            .join(format!("{}_{}", std::process::id(), id));
        if dir.exists() {
            fs::remove_dir_all(&dir).ok();
        }
        fs::create_dir_all(&dir).expect("Failed to create test directory");

        fs::write(dir.join("appsscript.json"), "{\"timeZone\": \"UTC\"}")
            .expect("Failed to write manifest");
        fs::write(
            dir.join("Code.gs"),
            "function doGet() {\n  return helper();\n}\n",
        )
        .expect("Failed to write Code.gs");
        fs::write(
            dir.join("Helpers.gs"),
            "function helper() { return 1; }\n\nfunction legacyExport() {}\n",
        )
        .expect("Failed to write Helpers.gs");
        fs::write(dir.join("Broken.gs"), "function broken() { return \"oops;\n}\n")
            .expect("Failed to write Broken.gs");

        dir
    }

    #[test]
    fn test_builder_basic() {
        let dir = create_test_project();
        let analysis = Deadscript::new(&dir).analyze().unwrap();

        assert!(analysis.result.is_symbol_used("helper"));
        let unused: Vec<&str> = analysis
            .result
            .unused_symbols
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(unused, vec!["legacyExport"]);
        assert_eq!(analysis.result.skipped_files, vec!["Broken.gs".to_string()]);
        assert!(analysis.result.is_file_used("appsscript.json"));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_builder_protect_patterns() {
        let dir = create_test_project();
        let analysis = Deadscript::new(&dir).protect(["legacy*"]).analyze().unwrap();
        assert!(!analysis.has_unused());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_from_root_reads_config() {
        let dir = create_test_project();
        fs::write(
            dir.join("deadscript.toml"),
            "[roots]\ncallbacks = [\"doGet\", \"legacyExport\"]\n",
        )
        .unwrap();
        let builder = Deadscript::from_root(&dir).unwrap();
        assert!(builder.root_set().is_root_symbol("legacyExport"));
        assert!(builder.analyze().unwrap().result.unused_symbols.is_empty());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_plan_at_threshold() {
        let dir = create_test_project();
        let analysis = Deadscript::new(&dir).analyze().unwrap();
        assert_eq!(
            analysis.plan(RiskLevel::Low),
            vec![DeletionTarget::Function {
                path: "Helpers.gs".to_string(),
                name: "legacyExport".to_string(),
            }]
        );
        fs::remove_dir_all(&dir).ok();
    }
}
