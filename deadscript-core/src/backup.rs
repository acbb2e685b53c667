//! Versioned snapshots of the source tree and rollback.
//!
//! Layout under the backup directory (default `<root>/.deadscript/backups`):
//!
//! ```text
//! <id>/tree/...          full copy of the analysed tree
//! <id>/metadata.json     timestamp, purpose, origin, revision, SHA-256 manifest
//! <id>/deletions.json    written once, after mutation
//! ```
//!
//! `metadata.json` is written last, after the copied tree has been re-hashed
//! against the manifest, so a snapshot directory without it is incomplete
//! and is never listed. Snapshots are write-once: rollback restores from one
//! and creates a new safety snapshot, it never edits an existing one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

use crate::config::{ExtractConfig, RollbackConfig};
use crate::error::{DeadscriptError, DeadscriptResult, IoResultExt};
use crate::extract::Extractor;
use crate::fix::DeletionRecord;
use crate::scan::{gather_source_units, relative_path, walk_files};

/// Default snapshot directory, relative to the analysed root.
pub const DEFAULT_BACKUP_DIR: &str = ".deadscript/backups";

const METADATA_FILE: &str = "metadata.json";
const DELETIONS_FILE: &str = "deletions.json";
const TREE_DIR: &str = "tree";

/// Compute SHA-256 hash from bytes.
#[inline]
fn hash_bytes(bytes: &[u8]) -> String {
    let mut sha = Sha256::new();
    sha.update(bytes);
    format!("{:x}", sha.finalize())
}

/// Entry points that existed when the snapshot was taken.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredPresent {
    pub files: Vec<String>,
    pub symbols: Vec<String>,
}

/// Everything recorded about a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub purpose: String,
    /// Absolute path of the tree that was copied
    pub origin: String,
    /// `git rev-parse HEAD` at snapshot time, if the root is a repository
    pub revision: Option<String>,
    pub file_count: usize,
    /// Relative path -> SHA-256
    pub manifest: BTreeMap<String, String>,
    #[serde(default)]
    pub required: RequiredPresent,
}

/// A written and verified snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub dir: PathBuf,
    pub metadata: SnapshotMetadata,
}

impl Snapshot {
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn tree_dir(&self) -> PathBuf {
        self.dir.join(TREE_DIR)
    }
}

/// What a rollback did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    pub restored_from: String,
    pub safety_snapshot: String,
    pub files_removed: usize,
    pub files_restored: usize,
}

/// Creates, lists and restores snapshots of one root.
#[derive(Debug, Clone)]
pub struct BackupManager {
    root: PathBuf,
    backup_dir: PathBuf,
    excludes: Vec<String>,
    rollback: RollbackConfig,
    extractor: Extractor,
}

/// Keeps snapshot ids filesystem-safe.
fn sanitize_purpose(purpose: &str) -> String {
    let cleaned: String = purpose
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "snapshot".to_string()
    } else {
        cleaned
    }
}

/// Rejects ids that could escape the backup directory.
fn validate_id(id: &str) -> DeadscriptResult<()> {
    let p = Path::new(id);
    if id.is_empty()
        || id.contains('\0')
        || p.components().count() != 1
        || !matches!(p.components().next(), Some(Component::Normal(_)))
    {
        return Err(DeadscriptError::invalid_argument(format!(
            "invalid snapshot id '{}'",
            id
        )));
    }
    Ok(())
}

fn vcs_revision(root: &Path) -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(root)
        .output();
    match output {
        Ok(out) if out.status.success() => {
            let rev = String::from_utf8_lossy(&out.stdout).trim().to_string();
            (!rev.is_empty()).then_some(rev)
        }
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "git not available, snapshot has no revision");
            None
        }
    }
}

impl BackupManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            backup_dir: root.join(DEFAULT_BACKUP_DIR),
            root,
            excludes: Vec::new(),
            rollback: RollbackConfig::default(),
            extractor: Extractor::default(),
        }
    }

    /// Stores snapshots in `dir` (relative paths resolve against the root).
    pub fn with_backup_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        self.backup_dir = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.root.join(dir)
        };
        self
    }

    pub fn with_excludes(mut self, excludes: &[String]) -> Self {
        self.excludes.extend(excludes.iter().cloned());
        self
    }

    pub fn with_rollback_config(mut self, config: RollbackConfig) -> Self {
        self.rollback = config;
        self
    }

    pub fn with_extract_config(mut self, config: &ExtractConfig) -> Self {
        self.extractor = Extractor::new(config);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Directory names pruned from copies: the configured ones plus the
    /// top-level directory holding snapshots when it lives inside the root.
    fn effective_excludes(&self) -> Vec<String> {
        let mut out = self.excludes.clone();
        if let Ok(inside) = self.backup_dir.strip_prefix(&self.root) {
            if let Some(Component::Normal(first)) = inside.components().next() {
                out.push(first.to_string_lossy().into_owned());
            }
        }
        out
    }

    fn defined_symbols(&self, root: &Path) -> DeadscriptResult<BTreeSet<String>> {
        let scan = gather_source_units(root, &self.effective_excludes())?;
        Ok(scan
            .units
            .iter()
            .flat_map(|u| self.extractor.extract(u).definitions)
            .map(|d| d.name)
            .collect())
    }

    fn fresh_id(&self, purpose: &str) -> String {
        let base = format!(
            "{}-{}",
            Utc::now().format("%Y%m%dT%H%M%S%3f"),
            sanitize_purpose(purpose)
        );
        let mut id = base.clone();
        let mut n = 2;
        while self.backup_dir.join(&id).exists() {
            id = format!("{}-{}", base, n);
            n += 1;
        }
        id
    }

    /// Copies the tree into a new snapshot and verifies the copy.
    ///
    /// Any failure removes the partial snapshot and returns a `Backup` error.
    pub fn create_backup(&self, purpose: &str) -> DeadscriptResult<Snapshot> {
        let id = self.fresh_id(purpose);
        let dir = self.backup_dir.join(&id);

        match self.write_snapshot(&id, &dir, purpose) {
            Ok(snapshot) => {
                info!(
                    snapshot = %snapshot.id(),
                    files = snapshot.metadata.file_count,
                    dir = %dir.display(),
                    "snapshot created"
                );
                Ok(snapshot)
            }
            Err(e) => {
                if dir.exists() {
                    if let Err(cleanup) = fs::remove_dir_all(&dir) {
                        warn!(dir = %dir.display(), error = %cleanup, "could not remove partial snapshot");
                    }
                }
                Err(DeadscriptError::backup(format!(
                    "could not create snapshot '{}': {}",
                    id, e
                )))
            }
        }
    }

    fn write_snapshot(&self, id: &str, dir: &Path, purpose: &str) -> DeadscriptResult<Snapshot> {
        let tree = dir.join(TREE_DIR);
        fs::create_dir_all(&tree).with_path(&tree)?;

        let mut manifest = BTreeMap::new();
        for path in walk_files(&self.root, &self.effective_excludes())? {
            let rel = relative_path(&self.root, &path);
            let bytes = fs::read(&path).with_path(&path)?;
            let dest = tree.join(&rel);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).with_path(parent)?;
            }
            fs::write(&dest, &bytes).with_path(&dest)?;
            manifest.insert(rel, hash_bytes(&bytes));
        }

        let required_files = self
            .rollback
            .required_files
            .iter()
            .filter(|f| manifest.contains_key(f.as_str()))
            .cloned()
            .collect();
        let defined = self.defined_symbols(&self.root)?;
        let required_symbols = self
            .rollback
            .required_symbols
            .iter()
            .filter(|s| defined.contains(s.as_str()))
            .cloned()
            .collect();

        let metadata = SnapshotMetadata {
            id: id.to_string(),
            timestamp: Utc::now(),
            purpose: purpose.to_string(),
            origin: self.root.display().to_string(),
            revision: vcs_revision(&self.root),
            file_count: manifest.len(),
            manifest,
            required: RequiredPresent {
                files: required_files,
                symbols: required_symbols,
            },
        };

        let snapshot = Snapshot {
            dir: dir.to_path_buf(),
            metadata,
        };
        self.verify(&snapshot)?;

        let meta_path = dir.join(METADATA_FILE);
        let json = serde_json::to_string_pretty(&snapshot.metadata)
            .map_err(|e| DeadscriptError::backup(format!("metadata serialization failed: {}", e)))?;
        fs::write(&meta_path, json).with_path(&meta_path)?;

        Ok(snapshot)
    }

    /// Re-hashes a snapshot's tree against its manifest.
    pub fn verify(&self, snapshot: &Snapshot) -> DeadscriptResult<()> {
        let tree = snapshot.tree_dir();
        for (rel, expected) in &snapshot.metadata.manifest {
            let path = tree.join(rel);
            let bytes = fs::read(&path).with_path(&path)?;
            if &hash_bytes(&bytes) != expected {
                return Err(DeadscriptError::backup(format!(
                    "snapshot '{}' is corrupt: {} does not match its manifest hash",
                    snapshot.id(),
                    rel
                )));
            }
        }
        Ok(())
    }

    /// Loads a complete snapshot by id.
    pub fn load(&self, id: &str) -> DeadscriptResult<Snapshot> {
        validate_id(id)?;
        let dir = self.backup_dir.join(id);
        let meta_path = dir.join(METADATA_FILE);
        let text = fs::read_to_string(&meta_path).with_path(&meta_path)?;
        let metadata: SnapshotMetadata = serde_json::from_str(&text).map_err(|e| {
            DeadscriptError::backup(format!("unreadable metadata for '{}': {}", id, e))
        })?;
        Ok(Snapshot { dir, metadata })
    }

    /// All complete snapshots, oldest first.
    pub fn list_snapshots(&self) -> DeadscriptResult<Vec<SnapshotMetadata>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.backup_dir).with_path(&self.backup_dir)? {
            let entry = entry.with_path(&self.backup_dir)?;
            if !entry.path().join(METADATA_FILE).is_file() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().into_owned();
            match self.load(&id) {
                Ok(s) => out.push(s.metadata),
                Err(e) => warn!(snapshot = %id, error = %e, "skipping unreadable snapshot"),
            }
        }
        out.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    /// Writes the deletion log next to a snapshot. Fails if one exists.
    pub fn record_deletions(
        &self,
        snapshot: &Snapshot,
        records: &[DeletionRecord],
    ) -> DeadscriptResult<PathBuf> {
        let path = snapshot.dir.join(DELETIONS_FILE);
        let json = serde_json::to_string_pretty(records)
            .map_err(|e| DeadscriptError::backup(format!("deletion log serialization failed: {}", e)))?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_path(&path)?;
        file.write_all(json.as_bytes()).with_path(&path)?;
        debug!(snapshot = %snapshot.id(), records = records.len(), "deletion log written");
        Ok(path)
    }

    /// Reads a snapshot's deletion log, if one was written.
    pub fn deletions(&self, id: &str) -> DeadscriptResult<Vec<DeletionRecord>> {
        validate_id(id)?;
        let path = self.backup_dir.join(id).join(DELETIONS_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&path).with_path(&path)?;
        serde_json::from_str(&text)
            .map_err(|e| DeadscriptError::backup(format!("unreadable deletion log for '{}': {}", id, e)))
    }

    /// Restores the tree from snapshot `id`.
    ///
    /// Takes a `pre-rollback` safety snapshot first, then replaces every
    /// live file with the snapshot's contents and verifies the result.
    /// Every failure is fatal and carries manual recovery steps.
    pub fn rollback(&self, id: &str) -> DeadscriptResult<RollbackReport> {
        let recovery_for = |snapshot_tree: &Path| {
            format!(
                "copy the contents of {} over {} by hand",
                snapshot_tree.display(),
                self.root.display()
            )
        };

        let snapshot = self.load(id).map_err(|e| {
            DeadscriptError::rollback(
                format!("snapshot '{}' cannot be loaded: {}", id, e),
                format!("run `deadscript {} backups` to list valid ids", self.root.display()),
            )
        })?;
        self.verify(&snapshot).map_err(|e| {
            DeadscriptError::rollback(
                e.to_string(),
                "pick an older snapshot; this one was not used and the tree is unchanged",
            )
        })?;

        let safety = self.create_backup("pre-rollback").map_err(|e| {
            DeadscriptError::rollback(
                format!("safety snapshot failed, tree left unchanged: {}", e),
                recovery_for(&snapshot.tree_dir()),
            )
        })?;
        info!(snapshot = %id, safety = %safety.id(), "rolling back");

        let recovery = format!(
            "{}; the state before this rollback is saved in {}",
            recovery_for(&snapshot.tree_dir()),
            safety.tree_dir().display()
        );
        let fail = |message: String| DeadscriptError::rollback(message, recovery.clone());

        let live = walk_files(&self.root, &self.effective_excludes()).map_err(|e| fail(e.to_string()))?;
        for path in &live {
            fs::remove_file(path)
                .map_err(|e| fail(format!("could not remove {}: {}", path.display(), e)))?;
        }

        let tree = snapshot.tree_dir();
        for rel in snapshot.metadata.manifest.keys() {
            let src = tree.join(rel);
            let dest = self.root.join(rel);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| fail(format!("could not create {}: {}", parent.display(), e)))?;
            }
            fs::copy(&src, &dest)
                .map_err(|e| fail(format!("could not restore {}: {}", rel, e)))?;
        }

        self.verify_restored(&snapshot).map_err(fail)?;

        let report = RollbackReport {
            restored_from: id.to_string(),
            safety_snapshot: safety.id().to_string(),
            files_removed: live.len(),
            files_restored: snapshot.metadata.manifest.len(),
        };
        info!(
            snapshot = %id,
            restored = report.files_restored,
            removed = report.files_removed,
            "rollback complete"
        );
        Ok(report)
    }

    /// Post-restore checks: hashes match and entry points are present.
    fn verify_restored(&self, snapshot: &Snapshot) -> Result<(), String> {
        for (rel, expected) in &snapshot.metadata.manifest {
            let bytes = fs::read(self.root.join(rel)).map_err(|e| format!("{} unreadable after restore: {}", rel, e))?;
            if &hash_bytes(&bytes) != expected {
                return Err(format!("{} differs from the snapshot after restore", rel));
            }
        }
        for file in &snapshot.metadata.required.files {
            if !self.root.join(file).is_file() {
                return Err(format!("required file {} missing after restore", file));
            }
        }
        let defined = self.defined_symbols(&self.root).map_err(|e| e.to_string())?;
        for symbol in &snapshot.metadata.required.symbols {
            if !defined.contains(symbol) {
                return Err(format!("required entry point {} missing after restore", symbol));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn create_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn create_temp_dir(name: &str) -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir()
            .join("deadscript_backup_test")
            .join(format!("{}_{}_{}", name, std::process::id(), id));
        if dir.exists() {
            fs::remove_dir_all(&dir).ok();
        }
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn tree_contents(root: &Path) -> BTreeMap<String, String> {
        walk_files(root, &[])
            .unwrap()
            .into_iter()
            .map(|p| (relative_path(root, &p), fs::read_to_string(&p).unwrap()))
            .collect()
    }

    #[test]
    fn test_create_backup_layout_and_manifest() {
        let dir = create_temp_dir("layout");
        create_file(&dir.join("Code.gs"), "function doGet() {}");
        create_file(&dir.join("ui/Index.html"), "<p>hi</p>");

        let mgr = BackupManager::new(&dir);
        let snap = mgr.create_backup("pre delete!").unwrap();

        assert!(snap.id().ends_with("-pre-delete-"));
        assert!(snap.dir.join("metadata.json").is_file());
        assert!(snap.tree_dir().join("ui/Index.html").is_file());
        assert_eq!(snap.metadata.file_count, 2);
        assert_eq!(snap.metadata.required.symbols, vec!["doGet".to_string()]);
        assert!(!snap.metadata.manifest.keys().any(|k| k.starts_with(".deadscript")));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_ids_unique_and_listed_in_order() {
        let dir = create_temp_dir("list");
        create_file(&dir.join("Code.gs"), "");
        let mgr = BackupManager::new(&dir);
        let a = mgr.create_backup("one").unwrap();
        let b = mgr.create_backup("one").unwrap();
        assert_ne!(a.id(), b.id());

        // A second snapshot must not contain the first.
        assert_eq!(b.metadata.file_count, 1);

        let listed: Vec<String> = mgr.list_snapshots().unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(listed, vec![a.id().to_string(), b.id().to_string()]);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_rollback_round_trip() {
        let dir = create_temp_dir("roundtrip");
        create_file(&dir.join("Code.gs"), "function doGet() { helper(); }\n");
        create_file(&dir.join("lib/Helpers.gs"), "function helper() {}\n");
        let before = tree_contents(&dir);
        let before_no_backups: BTreeMap<_, _> = before.clone();

        let mgr = BackupManager::new(&dir);
        let snap = mgr.create_backup("manual").unwrap();
        let report = mgr.rollback(snap.id()).unwrap();
        assert_eq!(report.files_restored, 2);

        let after: BTreeMap<String, String> = tree_contents(&dir)
            .into_iter()
            .filter(|(k, _)| !k.starts_with(".deadscript/"))
            .collect();
        assert_eq!(after, before_no_backups);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_rollback_undoes_changes_and_keeps_safety_snapshot() {
        let dir = create_temp_dir("undo");
        create_file(&dir.join("Code.gs"), "function doGet() {}\n");
        create_file(&dir.join("Old.gs"), "function legacy() {}\n");

        let mgr = BackupManager::new(&dir);
        let snap = mgr.create_backup("pre-delete").unwrap();

        fs::remove_file(dir.join("Old.gs")).unwrap();
        create_file(&dir.join("New.gs"), "function added() {}\n");

        let report = mgr.rollback(snap.id()).unwrap();
        assert!(dir.join("Old.gs").is_file());
        assert!(!dir.join("New.gs").exists());

        let safety = mgr.load(&report.safety_snapshot).unwrap();
        assert_eq!(safety.metadata.purpose, "pre-rollback");
        assert!(safety.metadata.manifest.contains_key("New.gs"));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_rollback_refuses_corrupt_snapshot() {
        let dir = create_temp_dir("corrupt");
        create_file(&dir.join("Code.gs"), "function doGet() {}\n");
        let mgr = BackupManager::new(&dir);
        let snap = mgr.create_backup("x").unwrap();
        fs::write(snap.tree_dir().join("Code.gs"), "tampered").unwrap();

        let err = mgr.rollback(snap.id()).unwrap_err();
        assert!(matches!(err, DeadscriptError::Rollback { .. }));
        assert_eq!(fs::read_to_string(dir.join("Code.gs")).unwrap(), "function doGet() {}\n");

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_rollback_unknown_or_hostile_id() {
        let dir = create_temp_dir("badid");
        let mgr = BackupManager::new(&dir);
        assert!(matches!(mgr.rollback("nope"), Err(DeadscriptError::Rollback { .. })));
        assert!(validate_id("../escape").is_err());
        assert!(validate_id("a/b").is_err());
        assert!(validate_id("20240101T000000000-x").is_ok());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_backup_into_unwritable_location_fails() {
        let dir = create_temp_dir("unwritable");
        create_file(&dir.join("Code.gs"), "");
        // A regular file where the backup directory should be.
        create_file(&dir.join("blocker"), "");
        let mgr = BackupManager::new(&dir).with_backup_dir(dir.join("blocker"));
        let err = mgr.create_backup("x").unwrap_err();
        assert!(matches!(err, DeadscriptError::Backup { .. }));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_deletion_log_is_write_once() {
        let dir = create_temp_dir("dellog");
        create_file(&dir.join("Code.gs"), "");
        let mgr = BackupManager::new(&dir);
        let snap = mgr.create_backup("x").unwrap();
        mgr.record_deletions(&snap, &[]).unwrap();
        assert!(mgr.record_deletions(&snap, &[]).is_err());
        assert!(mgr.deletions(snap.id()).unwrap().is_empty());
        fs::remove_dir_all(&dir).ok();
    }
}
