//! Deletion of unused files and functions.
//!
//! Never panics: every target is attempted, failures are collected per item
//! and the batch continues.
//!
//! Features:
//! - Whole-file removal (symlinks and non-files are refused)
//! - Single-function removal by brace matching over the lexer's classes,
//!   taking a contiguous `/** */` doc block and the declaration keyword
//!   with it
//! - Blank-line normalisation at the cut
//! - Dry-run simulation with the same before/after sizes
//! - Empty directory cleanup after file removal

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::ops::Range;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::backup::Snapshot;
use crate::error::{DeadscriptError, DeadscriptResult, IoResultExt};
use crate::extract::lexer::{self, line_starts, ByteClass};
use crate::extract::{definitions_in, script_text};
use crate::reach::AnalysisResult;
use crate::risk::{RiskAssessment, RiskLevel};
use crate::source::UnitKind;

/// One approved deletion.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DeletionTarget {
    File { path: String },
    Function { path: String, name: String },
}

impl DeletionTarget {
    /// Relative path of the unit the deletion touches.
    pub fn path(&self) -> &str {
        match self {
            Self::File { path } | Self::Function { path, .. } => path,
        }
    }
}

impl fmt::Display for DeletionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File { path } => write!(f, "file {}", path),
            Self::Function { path, name } => write!(f, "function {} in {}", name, path),
        }
    }
}

/// A deletion that happened, cross-referenced to its snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionRecord {
    pub snapshot_id: String,
    pub target: DeletionTarget,
    pub before_size: u64,
    pub after_size: u64,
    pub timestamp: DateTime<Utc>,
}

/// A deletion that would happen (dry-run queue).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulatedChange {
    pub target: DeletionTarget,
    pub before_size: u64,
    pub after_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationFailure {
    pub target: DeletionTarget,
    pub message: String,
}

/// Outcome of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MutationReport {
    pub records: Vec<DeletionRecord>,
    pub simulated: Vec<SimulatedChange>,
    pub failures: Vec<MutationFailure>,
    pub dirs_removed: Vec<String>,
}

impl MutationReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Bytes freed by applied (or simulated) deletions.
    pub fn bytes_freed(&self) -> u64 {
        let applied: u64 = self
            .records
            .iter()
            .map(|r| r.before_size.saturating_sub(r.after_size))
            .sum();
        let simulated: u64 = self
            .simulated
            .iter()
            .map(|c| c.before_size.saturating_sub(c.after_size))
            .sum();
        applied + simulated
    }
}

// ----------------------------------------------------------------------------
// Planning
// ----------------------------------------------------------------------------

/// Deletions permitted at `threshold`: whole files first, then functions in
/// units that are not themselves being deleted. Unrated entries are skipped.
pub fn plan_deletions(
    analysis: &AnalysisResult,
    risks: &RiskAssessment,
    threshold: RiskLevel,
) -> Vec<DeletionTarget> {
    let within = |level: Option<RiskLevel>| level.is_some_and(|l| l <= threshold);

    let files: Vec<&str> = analysis
        .unused_files
        .iter()
        .filter(|f| within(risks.file(&f.path).map(|r| r.level)))
        .map(|f| f.path.as_str())
        .collect();
    let doomed: BTreeSet<&str> = files.iter().copied().collect();

    let mut plan: Vec<DeletionTarget> = files
        .iter()
        .map(|p| DeletionTarget::File {
            path: (*p).to_string(),
        })
        .collect();

    for symbol in &analysis.unused_symbols {
        if !within(risks.symbol(&symbol.name).map(|r| r.level)) {
            continue;
        }
        // One target per site, so a name defined twice in one unit is cut twice.
        for site in &symbol.sites {
            if doomed.contains(site.unit.as_str()) {
                continue;
            }
            plan.push(DeletionTarget::Function {
                path: site.unit.clone(),
                name: symbol.name.clone(),
            });
        }
    }
    plan
}

// ----------------------------------------------------------------------------
// Function span location
// ----------------------------------------------------------------------------

/// Declaration prefix that belongs to the definition when it is all that
/// precedes it on its line: keywords and a member path (`obj.ns.`).
fn decl_prefix_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^[ \t]*(?:(?:var|let|const|async|export|static)[ \t]+)*(?:[A-Za-z_$][\w$]*[ \t]*\.[ \t]*)*$")
            .expect("Hardcoded regex pattern is valid")
    })
}

fn line_start_before(text: &str, offset: usize) -> usize {
    text[..offset].rfind('\n').map_or(0, |i| i + 1)
}

/// Moves `start` back over a `/** */` block ending on the previous line
/// (or the same line).
fn extend_over_doc(text: &str, classes: &[ByteClass], start: usize) -> usize {
    let b = text.as_bytes();
    let mut j = start;
    let mut newlines = 0;
    while j > 0 && b[j - 1].is_ascii_whitespace() {
        if b[j - 1] == b'\n' {
            newlines += 1;
        }
        j -= 1;
    }
    if newlines > 1 || !text[..j].ends_with("*/") {
        return start;
    }
    let Some(open) = text[..j].rfind("/**") else {
        return start;
    };
    if !classes[open..j].iter().all(|c| *c == ByteClass::Comment) {
        return start;
    }
    let ls = line_start_before(text, open);
    if text[ls..open].trim().is_empty() {
        ls
    } else {
        open
    }
}

/// Byte range covering the first definition of `name`, its doc block, a
/// trailing `;`/`,` and the rest of its last line when that is blank.
///
/// Returns `None` when the unit cannot be lexed or defines no `name`.
pub fn function_span(kind: UnitKind, text: &str, name: &str) -> Option<Range<usize>> {
    if kind == UnitKind::Config {
        return None;
    }
    let script = script_text(kind, text);
    let views = lexer::views(&script).ok()?;
    let starts = line_starts(&views.neutral);
    let def = definitions_in(&views.neutral, &starts)
        .into_iter()
        .find(|d| d.name == name)?;

    let end = if views.neutral.as_bytes().get(def.body_start) == Some(&b'{') {
        lexer::matching_brace(&script, &views.classes, def.body_start)? + 1
    } else {
        def.body_end
    };

    // Prefix and suffix checks read the original text so markup around a
    // template's script is never taken along.
    let mut start = def.start;
    let ls = line_start_before(text, start);
    if decl_prefix_regex().is_match(&text[ls..start]) {
        start = ls;
    }
    start = extend_over_doc(text, &views.classes, start);

    let b = text.as_bytes();
    let mut stop = end;
    while stop < b.len() && (b[stop] == b' ' || b[stop] == b'\t') {
        stop += 1;
    }
    if stop < b.len() && (b[stop] == b';' || b[stop] == b',') {
        stop += 1;
    }
    let mut eol = stop;
    while eol < b.len() && b[eol] != b'\n' && b[eol].is_ascii_whitespace() {
        eol += 1;
    }
    let end = match b.get(eol) {
        Some(b'\n') => eol + 1,
        None => eol,
        Some(_) => stop,
    };

    Some(start..end)
}

/// Joins the text around a cut, collapsing the blank lines that meet there
/// to at most one.
fn join_normalized(before: &str, after: &str) -> String {
    let head = before.trim_end_matches([' ', '\t', '\r', '\n']);
    let head_newlines = before[head.len()..].matches('\n').count();

    let mut skip = 0;
    let mut tail_newlines = 0;
    for line in after.split_inclusive('\n') {
        if !line.trim().is_empty() {
            break;
        }
        skip += line.len();
        tail_newlines += line.matches('\n').count();
    }
    let tail = &after[skip..];

    let newlines = head_newlines + tail_newlines;
    if newlines == 0 {
        return format!("{}{}", before, after);
    }
    if head.is_empty() {
        return tail.to_string();
    }
    if tail.is_empty() {
        return format!("{}\n", head);
    }
    format!("{}{}{}", head, "\n".repeat(newlines.min(2)), tail)
}

/// Source text with the first definition of `name` cut out, or `None` if
/// there is no such definition.
pub fn remove_function_from_source(kind: UnitKind, text: &str, name: &str) -> Option<String> {
    let span = function_span(kind, text, name)?;
    Some(join_normalized(&text[..span.start], &text[span.end..]))
}

// ----------------------------------------------------------------------------
// Filesystem operations
// ----------------------------------------------------------------------------

/// Resolves a relative unit path under `root`, refusing escapes.
fn resolve(root: &Path, rel: &str) -> DeadscriptResult<PathBuf> {
    let p = Path::new(rel);
    if p.components().any(|c| !matches!(c, Component::Normal(_))) {
        return Err(DeadscriptError::invalid_argument(format!(
            "refusing path outside the project: {}",
            rel
        )));
    }
    Ok(root.join(p))
}

/// Safely remove a file.
///
/// In dry-run mode, only logs what would be deleted.
/// Refuses to delete symlinks; returns `Ok(false)` for anything that is not
/// a regular file.
pub fn remove_file(path: &Path, dry_run: bool) -> DeadscriptResult<bool> {
    let metadata = match path.symlink_metadata() {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(DeadscriptError::io(path, e)),
    };

    if metadata.file_type().is_symlink() {
        warn!(path = %path.display(), "refusing to delete symlink");
        return Ok(false);
    }

    if !metadata.is_file() {
        warn!(path = %path.display(), "not a regular file");
        return Ok(false);
    }

    if dry_run {
        info!(path = %path.display(), "would remove file");
        return Ok(true);
    }

    fs::remove_file(path).with_path(path)?;
    info!(path = %path.display(), "removed file");
    Ok(true)
}

/// Removes the first definition of `name` from the file at `path`.
///
/// Returns `Ok(false)` if the file defines no such function; the file is
/// left untouched in that case.
pub fn remove_function(path: &Path, name: &str, dry_run: bool) -> DeadscriptResult<bool> {
    let kind = UnitKind::from_path(path).ok_or_else(|| {
        DeadscriptError::invalid_argument(format!("not a script file: {}", path.display()))
    })?;
    let content = fs::read_to_string(path).with_path(path)?;
    let Some(new_content) = remove_function_from_source(kind, &content, name) else {
        return Ok(false);
    };

    if dry_run {
        info!(path = %path.display(), function = %name, "would remove function");
        return Ok(true);
    }

    fs::write(path, &new_content).with_path(path)?;
    info!(path = %path.display(), function = %name, "removed function");
    Ok(true)
}

/// Removes `dir` and its now-empty parents, stopping at `root`.
fn clean_empty_parents(root: &Path, dir: &Path, removed: &mut Vec<String>) {
    let mut current = dir.to_path_buf();
    while current != root && current.starts_with(root) {
        let empty = fs::read_dir(&current)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !empty {
            break;
        }
        if let Err(e) = fs::remove_dir(&current) {
            warn!(dir = %current.display(), error = %e, "failed to remove empty dir");
            break;
        }
        debug!(dir = %current.display(), "removed empty dir");
        removed.push(current.display().to_string());
        if !current.pop() {
            break;
        }
    }
}

/// Sizes before and after a deletion, without touching the disk.
fn measure(root: &Path, target: &DeletionTarget) -> DeadscriptResult<(u64, u64)> {
    let path = resolve(root, target.path())?;
    match target {
        DeletionTarget::File { .. } => {
            let metadata = path.symlink_metadata().with_path(&path)?;
            if !metadata.is_file() {
                return Err(DeadscriptError::mutation(format!(
                    "{} is not a regular file",
                    target.path()
                )));
            }
            Ok((metadata.len(), 0))
        }
        DeletionTarget::Function { name, .. } => {
            let kind = UnitKind::from_path(&path).ok_or_else(|| {
                DeadscriptError::mutation(format!("{} is not a script file", target.path()))
            })?;
            let content = fs::read_to_string(&path).with_path(&path)?;
            let after = remove_function_from_source(kind, &content, name).ok_or_else(|| {
                DeadscriptError::mutation(format!(
                    "function {} not found in {}",
                    name,
                    target.path()
                ))
            })?;
            Ok((content.len() as u64, after.len() as u64))
        }
    }
}

/// Queues every target as a simulated change. Writes nothing.
pub fn simulate(root: &Path, targets: &[DeletionTarget]) -> MutationReport {
    let mut report = MutationReport::default();
    for target in targets {
        match measure(root, target) {
            Ok((before_size, after_size)) => report.simulated.push(SimulatedChange {
                target: target.clone(),
                before_size,
                after_size,
            }),
            Err(e) => report.failures.push(MutationFailure {
                target: target.clone(),
                message: e.to_string(),
            }),
        }
    }
    report
}

/// Applies deletions under a snapshot.
///
/// Construction requires a [`Snapshot`], so nothing can be deleted before
/// one has been written and verified.
#[derive(Debug)]
pub struct MutationExecutor<'a> {
    root: &'a Path,
    snapshot: &'a Snapshot,
}

impl<'a> MutationExecutor<'a> {
    pub fn new(root: &'a Path, snapshot: &'a Snapshot) -> Self {
        Self { root, snapshot }
    }

    fn apply_one(&self, target: &DeletionTarget, dirs: &mut Vec<String>) -> DeadscriptResult<DeletionRecord> {
        let path = resolve(self.root, target.path())?;
        let (before_size, after_size) = match target {
            DeletionTarget::File { .. } => {
                let size = path.symlink_metadata().with_path(&path)?.len();
                if !remove_file(&path, false)? {
                    return Err(DeadscriptError::mutation(format!(
                        "{} is not a regular file",
                        target.path()
                    )));
                }
                if let Some(parent) = path.parent() {
                    clean_empty_parents(self.root, parent, dirs);
                }
                (size, 0)
            }
            DeletionTarget::Function { name, .. } => {
                let before = path.metadata().with_path(&path)?.len();
                if !remove_function(&path, name, false)? {
                    return Err(DeadscriptError::mutation(format!(
                        "function {} not found in {}",
                        name,
                        target.path()
                    )));
                }
                (before, path.metadata().with_path(&path)?.len())
            }
        };
        Ok(DeletionRecord {
            snapshot_id: self.snapshot.id().to_string(),
            target: target.clone(),
            before_size,
            after_size,
            timestamp: Utc::now(),
        })
    }

    /// Applies every target in order, continuing past failures.
    pub fn apply(&self, targets: &[DeletionTarget]) -> MutationReport {
        let mut report = MutationReport::default();

        if targets.is_empty() {
            info!("no deletions to apply");
            return report;
        }

        info!(count = targets.len(), snapshot = %self.snapshot.id(), "applying deletions");
        for target in targets {
            match self.apply_one(target, &mut report.dirs_removed) {
                Ok(record) => report.records.push(record),
                Err(e) => {
                    warn!(target = %target, error = %e, "deletion failed, continuing");
                    report.failures.push(MutationFailure {
                        target: target.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            applied = report.records.len(),
            failed = report.failures.len(),
            bytes_freed = report.bytes_freed(),
            "deletions finished"
        );
        report
    }
}
