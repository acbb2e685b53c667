//! The root set: names and files that are always live.
//!
//! Roots come from three places: the framework's callback names, operator
//! patterns (`test*`, `*Handler`, or exact names), and names registered as
//! triggers at runtime. Root files (the manifest) are always used.

use std::collections::BTreeSet;

use crate::config::RootsConfig;

/// Always-reachable names and files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootSet {
    callbacks: BTreeSet<String>,
    patterns: Vec<String>,
    triggers: BTreeSet<String>,
    files: BTreeSet<String>,
}

/// Matches `prefix*`, `*suffix`, or an exact name.
fn matches_pattern(name: &str, pattern: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        name.starts_with(prefix)
    } else if let Some(suffix) = pattern.strip_prefix('*') {
        name.ends_with(suffix)
    } else {
        name == pattern
    }
}

impl RootSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &RootsConfig) -> Self {
        Self {
            callbacks: config.callbacks.iter().cloned().collect(),
            patterns: config.patterns.clone(),
            triggers: BTreeSet::new(),
            files: config.files.iter().cloned().collect(),
        }
    }

    pub fn with_callbacks<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.callbacks.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for p in patterns {
            let p = p.into();
            if !self.patterns.contains(&p) {
                self.patterns.push(p);
            }
        }
        self
    }

    pub fn with_triggers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.triggers.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_files<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files.extend(paths.into_iter().map(Into::into));
        self
    }

    /// True if `name` must never be reported unused.
    pub fn is_root_symbol(&self, name: &str) -> bool {
        self.callbacks.contains(name)
            || self.triggers.contains(name)
            || self.patterns.iter().any(|p| matches_pattern(name, p))
    }

    /// True if the unit at `path` (relative) is always used. A configured
    /// bare file name matches that file in any directory.
    pub fn is_root_file(&self, path: &str) -> bool {
        let file = path.rsplit('/').next().unwrap_or(path);
        self.files.iter().any(|f| f == path || (!f.contains('/') && f == file))
    }

    pub fn callbacks(&self) -> impl Iterator<Item = &str> {
        self.callbacks.iter().map(String::as_str)
    }

    pub fn triggers(&self) -> impl Iterator<Item = &str> {
        self.triggers.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_roots() {
        let roots = RootSet::from_config(&RootsConfig::default());
        assert!(roots.is_root_symbol("doGet"));
        assert!(roots.is_root_symbol("onOpen"));
        assert!(roots.is_root_symbol("testParser"));
        assert!(roots.is_root_symbol("debugDump"));
        assert!(!roots.is_root_symbol("helper"));
        assert!(roots.is_root_file("appsscript.json"));
        assert!(!roots.is_root_file("Code.gs"));
    }

    #[test]
    fn test_patterns() {
        assert!(matches_pattern("onSubmitHandler", "*Handler"));
        assert!(matches_pattern("keepMe", "keep*"));
        assert!(matches_pattern("exact", "exact"));
        assert!(!matches_pattern("exactly", "exact"));
        assert!(!matches_pattern("Handlers", "*Handler"));
    }

    #[test]
    fn test_triggers_and_extra_patterns() {
        let roots = RootSet::new()
            .with_triggers(["nightlySync"])
            .with_patterns(["cron*", "cron*"]);
        assert!(roots.is_root_symbol("nightlySync"));
        assert!(roots.is_root_symbol("cronHourly"));
        assert_eq!(roots.patterns.len(), 1);
    }

    #[test]
    fn test_root_file_by_bare_name_or_path() {
        let roots = RootSet::new().with_files(["appsscript.json", "src/keep.gs"]);
        assert!(roots.is_root_file("src/appsscript.json"));
        assert!(roots.is_root_file("src/keep.gs"));
        assert!(!roots.is_root_file("other/keep.gs"));
    }
}
