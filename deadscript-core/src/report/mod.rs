//! Report generation.
//!
//! One [`ReportModel`] is built from the graph, the analysis and the risk
//! ratings; every output form renders from that model only, so counts and
//! member sets agree across forms by construction.
//!
//! Forms:
//! - `report.json`: the full model
//! - `summary.md`: condensed tables
//! - `tree.txt`: dependency tree rooted at used files
//! - `remediate.sh`: low-risk deletions plus validation
//! - `graph.dot`: Graphviz view (feature `dot`)

#[cfg(feature = "dot")]
mod dot;
mod script;
mod text;

#[cfg(feature = "dot")]
pub use dot::render_dot;
pub use script::{render_remediation, shell_quote};
pub use text::{render_summary, render_tree};

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{DeadscriptError, DeadscriptResult, IoResultExt};
use crate::fix::{plan_deletions, DeletionTarget};
use crate::graph::{DefinitionSite, DependencyGraph, EdgeKind, Node, SkippedUnit, Unresolved};
use crate::reach::AnalysisResult;
use crate::risk::{RiskAssessment, RiskLevel, RiskRating};
use crate::source::UnitKind;

/// A rating with the action it implies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskEntry {
    pub level: RiskLevel,
    pub rationale: String,
    pub action: &'static str,
}

impl From<&RiskRating> for RiskEntry {
    fn from(r: &RiskRating) -> Self {
        Self {
            level: r.level,
            rationale: r.rationale.clone(),
            action: r.level.action(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    File,
    Symbol,
}

/// One end of an edge, seen from the node that owns the entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct EdgeEntry {
    pub kind: EdgeKind,
    pub node_type: NodeType,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub path: String,
    pub kind: UnitKind,
    pub size: u64,
    pub used: bool,
    pub risk: Option<RiskEntry>,
    pub dependencies: Vec<EdgeEntry>,
    pub dependents: Vec<EdgeEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolEntry {
    pub name: String,
    pub used: bool,
    pub sites: Vec<DefinitionSite>,
    pub risk: Option<RiskEntry>,
    pub dependencies: Vec<EdgeEntry>,
    pub dependents: Vec<EdgeEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RiskCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub files_total: usize,
    pub files_used: usize,
    pub files_unused: usize,
    pub symbols_total: usize,
    pub symbols_used: usize,
    pub symbols_unused: usize,
    pub edges: usize,
    pub unresolved: usize,
    pub skipped: usize,
    pub risk: RiskCounts,
}

/// Everything every report form needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportModel {
    pub root: String,
    pub counts: Counts,
    pub files: Vec<FileEntry>,
    pub symbols: Vec<SymbolEntry>,
    pub unresolved: Vec<Unresolved>,
    pub skipped: Vec<SkippedUnit>,
    /// What the remediation script deletes
    pub low_risk_plan: Vec<DeletionTarget>,
}

fn edge_entries(
    graph: &DependencyGraph,
    edges: impl Iterator<Item = (Node, crate::graph::EdgeKinds)>,
) -> Vec<EdgeEntry> {
    let mut out: Vec<EdgeEntry> = edges
        .flat_map(|(node, kinds)| {
            let node_type = match node {
                Node::Unit(_) => NodeType::File,
                Node::Symbol(_) => NodeType::Symbol,
            };
            let name = graph.label(node).to_string();
            kinds.iter().map(move |kind| EdgeEntry {
                kind,
                node_type,
                name: name.clone(),
            })
        })
        .collect();
    out.sort();
    out
}

impl ReportModel {
    pub fn build(
        root: &Path,
        graph: &DependencyGraph,
        analysis: &AnalysisResult,
        risks: &RiskAssessment,
    ) -> Self {
        let mut files: Vec<FileEntry> = graph
            .units()
            .iter()
            .enumerate()
            .map(|(i, unit)| FileEntry {
                path: unit.path.clone(),
                kind: unit.kind,
                size: unit.size,
                used: analysis.is_file_used(&unit.path),
                risk: risks.file(&unit.path).map(RiskEntry::from),
                dependencies: edge_entries(graph, graph.dependencies(Node::Unit(i))),
                dependents: edge_entries(graph, graph.dependents(Node::Unit(i))),
            })
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let mut symbols: Vec<SymbolEntry> = graph
            .symbols()
            .iter()
            .enumerate()
            .map(|(i, sym)| SymbolEntry {
                name: sym.name.clone(),
                used: analysis.is_symbol_used(&sym.name),
                sites: sym.sites.clone(),
                risk: risks.symbol(&sym.name).map(RiskEntry::from),
                dependencies: edge_entries(graph, graph.dependencies(Node::Symbol(i))),
                dependents: edge_entries(graph, graph.dependents(Node::Symbol(i))),
            })
            .collect();
        symbols.sort_by(|a, b| a.name.cmp(&b.name));

        let mut unresolved = graph.unresolved.clone();
        unresolved.sort();
        let mut skipped = graph.skipped.clone();
        skipped.sort();

        let mut risk = RiskCounts::default();
        for level in [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High] {
            let (f, s) = risks.count_at(level);
            match level {
                RiskLevel::Low => risk.low = f + s,
                RiskLevel::Medium => risk.medium = f + s,
                RiskLevel::High => risk.high = f + s,
            }
        }

        let counts = Counts {
            files_total: files.len(),
            files_used: analysis.used_files.len(),
            files_unused: analysis.unused_files.len(),
            symbols_total: symbols.len(),
            symbols_used: analysis.used_symbols.len(),
            symbols_unused: analysis.unused_symbols.len(),
            edges: graph.edge_count(),
            unresolved: unresolved.len(),
            skipped: skipped.len(),
            risk,
        };

        Self {
            root: root.display().to_string(),
            counts,
            files,
            symbols,
            unresolved,
            skipped,
            low_risk_plan: plan_deletions(analysis, risks, RiskLevel::Low),
        }
    }

    pub fn unused_files(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.iter().filter(|f| !f.used)
    }

    pub fn unused_symbols(&self) -> impl Iterator<Item = &SymbolEntry> {
        self.symbols.iter().filter(|s| !s.used)
    }

    pub fn file(&self, path: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.path == path)
    }

    pub fn symbol(&self, name: &str) -> Option<&SymbolEntry> {
        self.symbols.iter().find(|s| s.name == name)
    }

    /// Pretty JSON of the full model.
    pub fn to_json(&self) -> DeadscriptResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| DeadscriptError::Internal {
                message: format!("report serialization failed: {}", e),
            })
    }
}

/// All report forms rendered from one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReports {
    pub json: String,
    pub summary: String,
    pub tree: String,
    pub remediation: String,
    #[cfg(feature = "dot")]
    pub dot: String,
}

impl RenderedReports {
    /// Renders every form. `validate` is the command the remediation
    /// script runs after deleting.
    pub fn render(model: &ReportModel, validate: Option<&str>) -> DeadscriptResult<Self> {
        Ok(Self {
            json: model.to_json()?,
            summary: render_summary(model),
            tree: render_tree(model),
            remediation: render_remediation(model, validate),
            #[cfg(feature = "dot")]
            dot: render_dot(model),
        })
    }

    /// Writes every form into `dir`, creating it if needed.
    pub fn write_to_dir(&self, dir: &Path) -> DeadscriptResult<Vec<PathBuf>> {
        fs::create_dir_all(dir).with_path(dir)?;
        let mut forms: Vec<(&str, &str)> = vec![
            ("report.json", &self.json),
            ("summary.md", &self.summary),
            ("tree.txt", &self.tree),
            ("remediate.sh", &self.remediation),
        ];
        #[cfg(feature = "dot")]
        forms.push(("graph.dot", &self.dot));

        let mut written = Vec::with_capacity(forms.len());
        for (name, content) in forms {
            let path = dir.join(name);
            fs::write(&path, content).with_path(&path)?;
            written.push(path);
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let script = dir.join("remediate.sh");
            fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).with_path(&script)?;
        }

        info!(dir = %dir.display(), files = written.len(), "reports written");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Extractor;
    use crate::reach::analyze;
    use crate::risk::RiskClassifier;
    use crate::roots::RootSet;
    use crate::source::SourceUnit;

    pub(super) fn sample_model() -> ReportModel {
        let units = vec![
            SourceUnit::new(
                "Code.gs",
                UnitKind::BackendModule,
                "function doGet() {\n  return HtmlService.createTemplateFromFile('Index').evaluate();\n}\n\nfunction getRows() { return fmt(1); }\n",
            ),
            SourceUnit::new(
                "Index.html",
                UnitKind::FrontendTemplate,
                "<script>\nfunction load() { google.script.run.getRows(); }\n</script>\n",
            ),
            SourceUnit::new(
                "lib/Util.gs",
                UnitKind::BackendModule,
                "function fmt(x) { return x; }\n\nfunction orphan() {}\n\nfunction setupSheet() {}\n",
            ),
            SourceUnit::new("Old.gs", UnitKind::BackendModule, "function legacy() {}\n"),
        ];
        let graph = DependencyGraph::build(&units, &Extractor::default());
        let roots = RootSet::from_config(&crate::config::RootsConfig::default());
        let analysis = analyze(&graph, &roots);
        let risks = RiskClassifier::default().assess(&analysis, &graph);
        ReportModel::build(Path::new("/project"), &graph, &analysis, &risks)
    }

    #[test]
    fn test_model_counts_and_entries() {
        let model = sample_model();
        assert_eq!(model.counts.files_unused, 1);
        assert_eq!(model.counts.symbols_unused, 3);
        assert_eq!(model.unused_files().count(), model.counts.files_unused);
        assert_eq!(model.unused_symbols().count(), model.counts.symbols_unused);

        let orphan = model.symbol("orphan").unwrap();
        let risk = orphan.risk.as_ref().unwrap();
        assert_eq!(risk.level, RiskLevel::Low);
        assert_eq!(risk.action, "delete");

        let setup = model.symbol("setupSheet").unwrap();
        assert_eq!(setup.risk.as_ref().unwrap().level, RiskLevel::Medium);

        let code = model.file("Code.gs").unwrap();
        assert!(code.dependencies.contains(&EdgeEntry {
            kind: EdgeKind::Includes,
            node_type: NodeType::File,
            name: "Index.html".to_string(),
        }));
        assert!(model.symbol("getRows").unwrap().used);
    }

    #[test]
    fn test_low_risk_plan() {
        let model = sample_model();
        assert_eq!(
            model.low_risk_plan,
            vec![
                DeletionTarget::File {
                    path: "Old.gs".to_string()
                },
                DeletionTarget::Function {
                    path: "lib/Util.gs".to_string(),
                    name: "orphan".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_json_round_trips_counts() {
        let model = sample_model();
        let json: serde_json::Value = serde_json::from_str(&model.to_json().unwrap()).unwrap();
        assert_eq!(json["counts"]["files_unused"], 1);
        assert_eq!(json["counts"]["symbols_unused"], 3);
        assert_eq!(json["low_risk_plan"][0]["type"], "file");
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let a = RenderedReports::render(&sample_model(), Some("npm test")).unwrap();
        let b = RenderedReports::render(&sample_model(), Some("npm test")).unwrap();
        assert_eq!(a, b);
    }
}
