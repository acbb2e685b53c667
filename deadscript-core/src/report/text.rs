//! Human-readable forms: markdown summary and dependency tree.

use std::collections::{HashMap, HashSet};
use std::fmt::Write;

use super::{EdgeEntry, FileEntry, NodeType, ReportModel, RiskEntry, SymbolEntry};
use crate::fix::DeletionTarget;

fn risk_cell(risk: Option<&RiskEntry>) -> (String, &'static str) {
    match risk {
        Some(r) => (r.level.to_string(), r.action),
        None => ("-".to_string(), "-"),
    }
}

fn sites_cell(symbol: &SymbolEntry) -> String {
    symbol
        .sites
        .iter()
        .map(|s| format!("{}:{}", s.unit, s.start_line))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Condensed markdown summary.
pub fn render_summary(model: &ReportModel) -> String {
    let mut out = String::with_capacity(1024 + model.files.len() * 64);
    if let Err(e) = write_summary(&mut out, model) {
        tracing::error!(error = %e, "failed to render summary");
    }
    out
}

fn write_summary(out: &mut String, model: &ReportModel) -> std::fmt::Result {
    let c = &model.counts;
    writeln!(out, "# deadscript summary")?;
    writeln!(out)?;
    writeln!(out, "Root: `{}`", model.root)?;
    writeln!(out)?;
    writeln!(out, "| | used | unused | total |")?;
    writeln!(out, "|---|---|---|---|")?;
    writeln!(out, "| files | {} | {} | {} |", c.files_used, c.files_unused, c.files_total)?;
    writeln!(
        out,
        "| symbols | {} | {} | {} |",
        c.symbols_used, c.symbols_unused, c.symbols_total
    )?;
    writeln!(out)?;
    writeln!(
        out,
        "Risk: {} low, {} medium, {} high. Unresolved references: {}. Skipped units: {}.",
        c.risk.low, c.risk.medium, c.risk.high, c.unresolved, c.skipped
    )?;

    let unused_files: Vec<&FileEntry> = model.unused_files().collect();
    writeln!(out)?;
    writeln!(out, "## Unused files ({})", unused_files.len())?;
    if !unused_files.is_empty() {
        writeln!(out)?;
        writeln!(out, "| file | kind | bytes | risk | action |")?;
        writeln!(out, "|---|---|---|---|---|")?;
        for f in &unused_files {
            let (level, action) = risk_cell(f.risk.as_ref());
            writeln!(out, "| `{}` | {} | {} | {} | {} |", f.path, f.kind, f.size, level, action)?;
        }
    }

    let unused_symbols: Vec<&SymbolEntry> = model.unused_symbols().collect();
    writeln!(out)?;
    writeln!(out, "## Unused symbols ({})", unused_symbols.len())?;
    if !unused_symbols.is_empty() {
        writeln!(out)?;
        writeln!(out, "| symbol | defined at | risk | action | why |")?;
        writeln!(out, "|---|---|---|---|---|")?;
        for s in &unused_symbols {
            let (level, action) = risk_cell(s.risk.as_ref());
            let why = s.risk.as_ref().map_or("", |r| r.rationale.as_str());
            writeln!(
                out,
                "| `{}` | {} | {} | {} | {} |",
                s.name,
                sites_cell(s),
                level,
                action,
                why
            )?;
        }
    }

    writeln!(out)?;
    writeln!(out, "## Low-risk plan ({})", model.low_risk_plan.len())?;
    if !model.low_risk_plan.is_empty() {
        writeln!(out)?;
        for target in &model.low_risk_plan {
            match target {
                DeletionTarget::File { path } => writeln!(out, "- delete file `{}`", path)?,
                DeletionTarget::Function { path, name } => {
                    writeln!(out, "- remove function `{}` from `{}`", name, path)?
                }
            }
        }
    }

    if !model.skipped.is_empty() {
        writeln!(out)?;
        writeln!(out, "## Skipped units ({})", model.skipped.len())?;
        writeln!(out)?;
        for s in &model.skipped {
            writeln!(out, "- `{}`: {}", s.path, s.reason)?;
        }
    }
    Ok(())
}

struct TreeWriter<'a> {
    files: HashMap<&'a str, &'a FileEntry>,
    symbols: HashMap<&'a str, &'a SymbolEntry>,
    expanded: HashSet<(NodeType, &'a str)>,
}

impl<'a> TreeWriter<'a> {
    fn children(&self, node_type: NodeType, name: &str) -> &'a [EdgeEntry] {
        let deps = match node_type {
            NodeType::File => self.files.get(name).map(|f| (*f).dependencies.as_slice()),
            NodeType::Symbol => self.symbols.get(name).map(|s| (*s).dependencies.as_slice()),
        };
        deps.unwrap_or(&[])
    }

    fn is_used(&self, node_type: NodeType, name: &str) -> bool {
        match node_type {
            NodeType::File => self.files.get(name).is_some_and(|f| f.used),
            NodeType::Symbol => self.symbols.get(name).is_some_and(|s| s.used),
        }
    }

    /// Writes the children of an expanded node. Each node is expanded once;
    /// later occurrences are marked instead.
    fn write_children(
        &mut self,
        out: &mut String,
        node_type: NodeType,
        name: &'a str,
        prefix: &str,
    ) -> std::fmt::Result {
        let children = self.children(node_type, name);
        for (i, edge) in children.iter().enumerate() {
            let last = i + 1 == children.len();
            let branch = if last { "└── " } else { "├── " };
            let key = (edge.node_type, edge.name.as_str());
            let mut line = format!("{}{}{} {}", prefix, branch, edge.kind.to_string().to_lowercase(), edge.name);
            if !self.is_used(edge.node_type, &edge.name) {
                line.push_str(" [unused]");
            }
            let seen = self.expanded.contains(&key);
            if seen && !self.children(edge.node_type, &edge.name).is_empty() {
                line.push_str(" (see above)");
            }
            writeln!(out, "{}", line)?;
            if !seen {
                self.expanded.insert(key);
                let child_prefix = format!("{}{}", prefix, if last { "    " } else { "│   " });
                self.write_children(out, edge.node_type, &edge.name, &child_prefix)?;
            }
        }
        Ok(())
    }
}

/// Dependency tree rooted at each used file, followed by the unused lists.
pub fn render_tree(model: &ReportModel) -> String {
    let mut out = String::with_capacity(2048);
    if let Err(e) = write_tree(&mut out, model) {
        tracing::error!(error = %e, "failed to render tree");
    }
    out
}

fn write_tree(out: &mut String, model: &ReportModel) -> std::fmt::Result {
    let mut writer = TreeWriter {
        files: model.files.iter().map(|f| (f.path.as_str(), f)).collect(),
        symbols: model.symbols.iter().map(|s| (s.name.as_str(), s)).collect(),
        expanded: HashSet::new(),
    };

    let used: Vec<&FileEntry> = model.files.iter().filter(|f| f.used).collect();
    writeln!(out, "Used files ({})", used.len())?;
    for f in used {
        let key = (NodeType::File, f.path.as_str());
        if writer.expanded.contains(&key) {
            writeln!(out, "{} (see above)", f.path)?;
            continue;
        }
        writeln!(out, "{}", f.path)?;
        writer.expanded.insert(key);
        writer.write_children(out, NodeType::File, &f.path, "")?;
    }

    let unused_files: Vec<&FileEntry> = model.unused_files().collect();
    writeln!(out)?;
    writeln!(out, "Unused files ({})", unused_files.len())?;
    for f in unused_files {
        let (level, action) = risk_cell(f.risk.as_ref());
        writeln!(out, "  {} [{}: {}]", f.path, level, action)?;
    }

    let unused_symbols: Vec<&SymbolEntry> = model.unused_symbols().collect();
    writeln!(out)?;
    writeln!(out, "Unused symbols ({})", unused_symbols.len())?;
    for s in unused_symbols {
        let (level, action) = risk_cell(s.risk.as_ref());
        writeln!(out, "  {} ({}) [{}: {}]", s.name, sites_cell(s), level, action)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::tests::sample_model;
    use super::*;

    #[test]
    fn test_summary_headings() {
        let summary = render_summary(&sample_model());
        assert!(summary.contains("## Unused files (1)"));
        assert!(summary.contains("## Unused symbols (3)"));
        assert!(summary.contains("| `orphan` | lib/Util.gs:3 | low | delete |"));
        assert!(summary.contains("- remove function `orphan` from `lib/Util.gs`"));
    }

    #[test]
    fn test_tree_shape() {
        let tree = render_tree(&sample_model());
        assert!(tree.starts_with("Used files (3)\nCode.gs\n"));
        assert!(tree.contains("includes Index.html"));
        assert!(tree.contains("defines orphan [unused]"));
        assert!(tree.contains("\nUnused files (1)\n  Old.gs [low: delete]\n"));
        assert!(tree.contains("\nUnused symbols (3)\n"));
    }
}
