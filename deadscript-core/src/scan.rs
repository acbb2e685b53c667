//! Deterministic source discovery with early directory pruning.
//!
//! The walk is sequential and its output is sorted by relative path, so
//! two runs over an unchanged tree see the units in the same order.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{DeadscriptError, DeadscriptResult};
use crate::source::{SourceUnit, UnitKind};

/// Directories never scanned or snapshotted.
pub const EXCLUDED_DIRS: &[&str] = &[".git", "node_modules", ".deadscript", "target"];

/// Units found by a walk plus the files that could not be read.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub units: Vec<SourceUnit>,
    /// (relative path, reason)
    pub skipped: Vec<(String, String)>,
}

#[inline]
fn is_excluded_dir(entry: &walkdir::DirEntry, excludes: &HashSet<&str>) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| excludes.contains(name))
}

/// Relative, forward-slash form of `path` under `root`.
pub fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Lists every regular file under `root`, pruning excluded directories.
///
/// Used both for discovery and for snapshot copies, so the two always
/// agree on what "the tree" is.
pub fn walk_files(root: &Path, extra_excludes: &[String]) -> DeadscriptResult<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(DeadscriptError::invalid_argument(format!(
            "not a directory: {}",
            root.display()
        )));
    }

    let excludes: HashSet<&str> = EXCLUDED_DIRS
        .iter()
        .copied()
        .chain(extra_excludes.iter().map(String::as_str))
        .collect();

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_excluded_dir(e, &excludes))
    {
        match entry {
            Ok(e) if e.file_type().is_file() => files.push(e.into_path()),
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Gathers every analysable source unit under `root`.
///
/// Files with an unknown extension are ignored; unreadable or non-UTF-8
/// files are skipped with a warning and reported in `skipped`.
pub fn gather_source_units(root: &Path, extra_excludes: &[String]) -> DeadscriptResult<ScanOutcome> {
    let mut outcome = ScanOutcome::default();

    for path in walk_files(root, extra_excludes)? {
        let Some(kind) = UnitKind::from_path(&path) else {
            continue;
        };
        let rel = relative_path(root, &path);

        match fs::read(&path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => {
                    debug!(unit = %rel, %kind, "discovered source unit");
                    outcome.units.push(SourceUnit::new(rel, kind, text));
                }
                Err(_) => {
                    warn!(unit = %rel, "skipping non-UTF-8 source unit");
                    outcome.skipped.push((rel, "not valid UTF-8".to_string()));
                }
            },
            Err(e) => {
                warn!(unit = %rel, error = %e, "skipping unreadable source unit");
                outcome.skipped.push((rel, e.to_string()));
            }
        }
    }

    outcome.units.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn create_file(path: &Path, content: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn create_temp_dir(name: &str) -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir()
            .join("deadscript_scan_test")
            .join(format!("{}_{}_{}", name, std::process::id(), id));
        if dir.exists() {
            fs::remove_dir_all(&dir).ok();
        }
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_gather_classifies_and_sorts() {
        let dir = create_temp_dir("classify");
        create_file(&dir.join("Code.gs"), b"function doGet() {}");
        create_file(&dir.join("Index.html"), b"<html></html>");
        create_file(&dir.join("appsscript.json"), b"{}");
        create_file(&dir.join("lib/Helpers.js"), b"function helper() {}");
        create_file(&dir.join("README.md"), b"# readme");

        let outcome = gather_source_units(&dir, &[]).unwrap();
        let paths: Vec<&str> = outcome.units.iter().map(|u| u.path.as_str()).collect();
        assert_eq!(paths, vec!["Code.gs", "Index.html", "appsscript.json", "lib/Helpers.js"]);
        assert_eq!(outcome.units[1].kind, UnitKind::FrontendTemplate);
        assert!(outcome.skipped.is_empty());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_excluded_dirs_are_pruned() {
        let dir = create_temp_dir("prune");
        create_file(&dir.join("Code.gs"), b"");
        create_file(&dir.join("node_modules/pkg/index.js"), b"");
        create_file(&dir.join(".deadscript/backups/x/tree/Code.gs"), b"");
        create_file(&dir.join("vendor/lib.js"), b"");

        let outcome = gather_source_units(&dir, &["vendor".to_string()]).unwrap();
        let paths: Vec<&str> = outcome.units.iter().map(|u| u.path.as_str()).collect();
        assert_eq!(paths, vec!["Code.gs"]);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_non_utf8_unit_is_skipped() {
        let dir = create_temp_dir("utf8");
        create_file(&dir.join("Good.gs"), b"function a() {}");
        create_file(&dir.join("Bad.gs"), &[0xff, 0xfe, 0x00, 0x41]);

        let outcome = gather_source_units(&dir, &[]).unwrap();
        assert_eq!(outcome.units.len(), 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].0, "Bad.gs");

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_root_is_error() {
        let dir = std::env::temp_dir().join("deadscript_scan_test_does_not_exist_xyz");
        assert!(gather_source_units(&dir, &[]).is_err());
    }
}
