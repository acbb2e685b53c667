//! Configuration loading from deadscript.toml.
//!
//! Every field has a default, so a project without the file is analysed
//! with the framework's standard callbacks and conventions.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};

/// Name of the optional configuration file at the analysed root.
pub const CONFIG_FILE: &str = "deadscript.toml";

/// Main configuration structure for deadscript.toml.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DeadscriptConfig {
    pub roots: RootsConfig,
    pub risk: RiskConfig,
    pub extract: ExtractConfig,
    pub scan: ScanConfig,
    pub rollback: RollbackConfig,
    pub validation: ValidationConfig,
    pub backup: BackupConfig,
}

/// Names and files that are always live.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RootsConfig {
    /// Framework-mandated callback names.
    pub callbacks: Vec<String>,
    /// Protected name patterns (`prefix*`, `*suffix`, or exact).
    pub patterns: Vec<String>,
    /// Files (relative paths) that are always used.
    pub files: Vec<String>,
}

impl Default for RootsConfig {
    fn default() -> Self {
        Self {
            callbacks: [
                "doGet",
                "doPost",
                "onOpen",
                "onEdit",
                "onInstall",
                "onFormSubmit",
                "onChange",
                "onSelectionChange",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            patterns: vec!["test*".to_string(), "debug*".to_string()],
            files: vec!["appsscript.json".to_string()],
        }
    }
}

/// Risk classifier knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Case-insensitive substrings that make a symbol name "protected".
    pub protected_substrings: Vec<String>,
    /// File names that play a manifest/config role regardless of extension.
    pub config_files: Vec<String>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            protected_substrings: ["setup", "init", "util", "install", "config", "migrat"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            config_files: vec!["appsscript.json".to_string(), ".clasp.json".to_string()],
        }
    }
}

/// Extractor knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Bridge objects through which frontend code calls backend functions.
    pub bridges: Vec<String>,
    /// Extra names to treat as platform built-ins.
    pub builtins: Vec<String>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            bridges: vec!["google.script.run".to_string()],
            builtins: Vec::new(),
        }
    }
}

/// Directory walk knobs.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ScanConfig {
    /// Directory names to prune in addition to the built-in list.
    pub exclude_dirs: Vec<String>,
}

/// What must exist after a rollback.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RollbackConfig {
    pub required_files: Vec<String>,
    pub required_symbols: Vec<String>,
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            required_files: Vec::new(),
            required_symbols: vec!["doGet".to_string()],
        }
    }
}

/// External validation command.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ValidationConfig {
    pub command: Option<String>,
}

/// Snapshot storage.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BackupConfig {
    /// Snapshot directory; relative paths are resolved against the root.
    pub dir: Option<String>,
}

/// Loads configuration from deadscript.toml if it exists.
pub fn load_config(root: &Path) -> Result<Option<DeadscriptConfig>> {
    let path = root.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let cfg = toml::from_str(&content).context("Invalid deadscript.toml")?;
    Ok(Some(cfg))
}

/// Loads deadscript.toml or falls back to defaults.
pub fn load_config_or_default(root: &Path) -> Result<DeadscriptConfig> {
    Ok(load_config(root)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn create_temp_dir(name: &str) -> std::path::PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir()
            .join("deadscript_config_test")
            .join(format!("{}_{}_{}", name, std::process::id(), id));
        if dir.exists() {
            fs::remove_dir_all(&dir).ok();
        }
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_missing_config_is_none() {
        let dir = create_temp_dir("missing");
        assert!(load_config(&dir).unwrap().is_none());
        let cfg = load_config_or_default(&dir).unwrap();
        assert!(cfg.roots.callbacks.contains(&"doGet".to_string()));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let dir = create_temp_dir("partial");
        fs::write(
            dir.join(CONFIG_FILE),
            "[roots]\npatterns = [\"keep*\"]\n\n[validation]\ncommand = \"npm test\"\n",
        )
        .unwrap();

        let cfg = load_config(&dir).unwrap().unwrap();
        assert_eq!(cfg.roots.patterns, vec!["keep*".to_string()]);
        // Unspecified keys in a present section fall back to defaults.
        assert!(cfg.roots.callbacks.contains(&"onOpen".to_string()));
        assert_eq!(cfg.validation.command.as_deref(), Some("npm test"));
        assert_eq!(cfg.extract.bridges, vec!["google.script.run".to_string()]);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_config_is_error() {
        let dir = create_temp_dir("invalid");
        fs::write(dir.join(CONFIG_FILE), "[roots\ncallbacks = 3").unwrap();
        assert!(load_config(&dir).is_err());
        fs::remove_dir_all(&dir).ok();
    }
}
