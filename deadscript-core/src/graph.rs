//! Dependency graph construction.
//!
//! Two passes over the extraction results:
//! 1. collect every definition across all units into one symbol table,
//! 2. resolve references and inclusions against that table.
//!
//! Nodes are units and symbols; a symbol defined in several units is one
//! node with several definition sites. Edges carry a set of kinds so a
//! (source, target, kind) triple is stored at most once.
//!
//! Performance characteristics:
//! - Build: O(units + definitions + references)
//! - Neighbour queries: O(degree), forward and reverse

use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, info, warn};

use crate::extract::{Extractor, ReferenceKind};
use crate::source::{base_name, SourceUnit, UnitKind};

/// A graph node: an index into the unit or symbol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Node {
    Unit(usize),
    Symbol(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EdgeKind {
    /// unit -> symbol
    Defines,
    /// unit -> symbol or symbol -> symbol
    References,
    /// unit -> unit
    Includes,
}

impl EdgeKind {
    pub const ALL: [EdgeKind; 3] = [EdgeKind::Defines, EdgeKind::References, EdgeKind::Includes];

    fn bit(self) -> u8 {
        match self {
            Self::Defines => 1,
            Self::References => 2,
            Self::Includes => 4,
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Defines => write!(f, "DEFINES"),
            Self::References => write!(f, "REFERENCES"),
            Self::Includes => write!(f, "INCLUDES"),
        }
    }
}

/// Set of edge kinds between one ordered pair of nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EdgeKinds(u8);

impl EdgeKinds {
    pub fn of(kind: EdgeKind) -> Self {
        Self(kind.bit())
    }

    pub fn insert(&mut self, kind: EdgeKind) -> bool {
        let fresh = !self.contains(kind);
        self.0 |= kind.bit();
        fresh
    }

    pub fn contains(self, kind: EdgeKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn iter(self) -> impl Iterator<Item = EdgeKind> {
        EdgeKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

/// A unit as seen by the graph (text is not retained).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitNode {
    pub path: String,
    pub kind: UnitKind,
    pub size: u64,
}

/// Where a symbol is defined.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct DefinitionSite {
    pub unit: String,
    pub start_line: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolNode {
    pub name: String,
    pub sites: Vec<DefinitionSite>,
}

impl SymbolNode {
    /// Distinct units defining this symbol.
    pub fn defining_units(&self) -> BTreeSet<&str> {
        self.sites.iter().map(|s| s.unit.as_str()).collect()
    }

    pub fn is_multiply_defined(&self) -> bool {
        self.defining_units().len() > 1
    }
}

/// A reference or inclusion that matched nothing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Unresolved {
    pub unit: String,
    pub line: usize,
    pub name: String,
    /// "call", "bridge" or "include"
    pub kind: &'static str,
}

/// A unit left out of the graph because it could not be read or lexed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct SkippedUnit {
    pub path: String,
    pub reason: String,
}

/// Units, symbols and typed edges for one analysis run.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    units: Vec<UnitNode>,
    symbols: Vec<SymbolNode>,
    unit_index: HashMap<String, usize>,
    symbol_index: HashMap<String, usize>,
    graph: DiGraphMap<Node, EdgeKinds>,
    /// Diagnostic side-channel; never edges
    pub unresolved: Vec<Unresolved>,
    pub skipped: Vec<SkippedUnit>,
    /// Names registered through `newTrigger("..")`
    pub triggers: BTreeSet<String>,
    /// Identifier-shaped string literals seen anywhere
    pub string_mentions: BTreeSet<String>,
}

impl DependencyGraph {
    /// Builds the graph from source units.
    ///
    /// Units that fail extraction are logged, recorded in `skipped`, and
    /// left out entirely.
    pub fn build(units: &[SourceUnit], extractor: &Extractor) -> Self {
        let mut sorted: Vec<&SourceUnit> = units.iter().collect();
        sorted.sort_by(|a, b| a.path.cmp(&b.path));

        let mut g = DependencyGraph::default();
        let mut extracted = Vec::with_capacity(sorted.len());

        for unit in sorted {
            match extractor.try_extract(unit) {
                Ok(x) => {
                    let idx = g.units.len();
                    g.unit_index.insert(unit.path.clone(), idx);
                    g.units.push(UnitNode {
                        path: unit.path.clone(),
                        kind: unit.kind,
                        size: unit.size,
                    });
                    g.graph.add_node(Node::Unit(idx));
                    extracted.push((idx, x));
                }
                Err(e) => {
                    warn!(unit = %unit.path, error = %e, "skipping malformed unit");
                    g.skipped.push(SkippedUnit {
                        path: unit.path.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        // Pass 1: the complete definition table.
        let mut table: BTreeMap<String, Vec<DefinitionSite>> = BTreeMap::new();
        for (idx, x) in &extracted {
            for d in &x.definitions {
                table.entry(d.name.clone()).or_default().push(DefinitionSite {
                    unit: g.units[*idx].path.clone(),
                    start_line: d.start_line,
                    end_line: d.end_line,
                });
            }
        }
        for (name, mut sites) in table {
            sites.sort();
            sites.dedup();
            let idx = g.symbols.len();
            g.symbol_index.insert(name.clone(), idx);
            g.symbols.push(SymbolNode { name, sites });
            g.graph.add_node(Node::Symbol(idx));
        }

        // Pass 2: edges.
        for (idx, x) in &extracted {
            let unit = Node::Unit(*idx);
            for d in &x.definitions {
                if let Some(&s) = g.symbol_index.get(&d.name) {
                    g.add_edge(unit, Node::Symbol(s), EdgeKind::Defines);
                }
            }

            for r in &x.references {
                match g.symbol_index.get(&r.name) {
                    Some(&target) => {
                        let source = r
                            .scope
                            .as_ref()
                            .and_then(|s| g.symbol_index.get(s))
                            .map_or(unit, |&s| Node::Symbol(s));
                        g.add_edge(source, Node::Symbol(target), EdgeKind::References);
                    }
                    None if !r.kind.is_soft() => {
                        let kind = match r.kind {
                            ReferenceKind::Bridge => "bridge",
                            _ => "call",
                        };
                        debug!(unit = %g.units[*idx].path, line = r.line, name = %r.name, kind, "unresolved reference");
                        g.unresolved.push(Unresolved {
                            unit: g.units[*idx].path.clone(),
                            line: r.line,
                            name: r.name.clone(),
                            kind,
                        });
                    }
                    None => {}
                }
            }

            for inc in &x.inclusions {
                let targets = g.resolve_inclusion(&inc.target);
                if targets.is_empty() {
                    debug!(unit = %g.units[*idx].path, target = %inc.target, "unresolved inclusion");
                    g.unresolved.push(Unresolved {
                        unit: g.units[*idx].path.clone(),
                        line: inc.line,
                        name: inc.target.clone(),
                        kind: "include",
                    });
                }
                for t in targets {
                    g.add_edge(unit, Node::Unit(t), EdgeKind::Includes);
                }
            }

            g.triggers.extend(x.triggers.iter().cloned());
            g.string_mentions.extend(x.string_mentions.iter().cloned());
        }

        g.unresolved.sort();
        info!(
            units = g.units.len(),
            symbols = g.symbols.len(),
            edges = g.edge_count(),
            unresolved = g.unresolved.len(),
            skipped = g.skipped.len(),
            "dependency graph built"
        );
        g
    }

    fn add_edge(&mut self, from: Node, to: Node, kind: EdgeKind) {
        if let Some(kinds) = self.graph.edge_weight_mut(from, to) {
            kinds.insert(kind);
        } else {
            self.graph.add_edge(from, to, EdgeKinds::of(kind));
        }
    }

    /// Units an inclusion target names, by extension-less path or base name.
    fn resolve_inclusion(&self, target: &str) -> Vec<usize> {
        let wanted = strip_extension(target);
        self.units
            .iter()
            .enumerate()
            .filter(|(_, u)| {
                strip_extension(&u.path) == wanted || base_name(&u.path) == wanted
            })
            .map(|(i, _)| i)
            .collect()
    }

    pub fn units(&self) -> &[UnitNode] {
        &self.units
    }

    pub fn symbols(&self) -> &[SymbolNode] {
        &self.symbols
    }

    pub fn unit(&self, idx: usize) -> &UnitNode {
        &self.units[idx]
    }

    pub fn symbol(&self, idx: usize) -> &SymbolNode {
        &self.symbols[idx]
    }

    pub fn unit_index(&self, path: &str) -> Option<usize> {
        self.unit_index.get(path).copied()
    }

    pub fn symbol_index(&self, name: &str) -> Option<usize> {
        self.symbol_index.get(name).copied()
    }

    /// What `node` depends on, with the edge kinds.
    pub fn dependencies(&self, node: Node) -> impl Iterator<Item = (Node, EdgeKinds)> + '_ {
        self.graph
            .neighbors_directed(node, Direction::Outgoing)
            .map(move |to| (to, self.kinds(node, to)))
    }

    /// What depends on `node`, with the edge kinds.
    pub fn dependents(&self, node: Node) -> impl Iterator<Item = (Node, EdgeKinds)> + '_ {
        self.graph
            .neighbors_directed(node, Direction::Incoming)
            .map(move |from| (from, self.kinds(from, node)))
    }

    fn kinds(&self, from: Node, to: Node) -> EdgeKinds {
        self.graph.edge_weight(from, to).copied().unwrap_or_default()
    }

    /// Every (from, to, kind) triple, sorted.
    pub fn edges(&self) -> Vec<(Node, Node, EdgeKind)> {
        let mut out: Vec<(Node, Node, EdgeKind)> = self
            .graph
            .all_edges()
            .flat_map(|(a, b, kinds)| kinds.iter().map(move |k| (a, b, k)))
            .collect();
        out.sort();
        out
    }

    pub fn edge_count(&self) -> usize {
        self.graph
            .all_edges()
            .map(|(_, _, kinds)| kinds.iter().count())
            .sum()
    }

    /// Display label of a node (unit path or symbol name).
    pub fn label(&self, node: Node) -> &str {
        match node {
            Node::Unit(i) => &self.units[i].path,
            Node::Symbol(i) => &self.symbols[i].name,
        }
    }
}

fn strip_extension(path: &str) -> &str {
    let file_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[file_start..].rfind('.') {
        Some(0) | None => path,
        Some(dot) => &path[..file_start + dot],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(path: &str, text: &str) -> SourceUnit {
        let kind = UnitKind::from_path(std::path::Path::new(path)).unwrap();
        SourceUnit::new(path, kind, text)
    }

    fn build(units: &[SourceUnit]) -> DependencyGraph {
        DependencyGraph::build(units, &Extractor::default())
    }

    fn has_edge(g: &DependencyGraph, from: Node, to: Node, kind: EdgeKind) -> bool {
        g.dependencies(from).any(|(n, k)| n == to && k.contains(kind))
    }

    #[test]
    fn test_two_pass_resolution_across_units() {
        // A is processed before B, yet the call from A still resolves.
        let g = build(&[
            unit("A.gs", "function doGet() { helper(); }"),
            unit("B.gs", "function helper() {}\nfunction orphan() {}"),
        ]);
        let a = Node::Unit(g.unit_index("A.gs").unwrap());
        let b = Node::Unit(g.unit_index("B.gs").unwrap());
        let do_get = Node::Symbol(g.symbol_index("doGet").unwrap());
        let helper = Node::Symbol(g.symbol_index("helper").unwrap());

        assert!(has_edge(&g, a, do_get, EdgeKind::Defines));
        assert!(has_edge(&g, b, helper, EdgeKind::Defines));
        assert!(has_edge(&g, do_get, helper, EdgeKind::References));
        assert!(g.dependents(helper).any(|(n, _)| n == do_get));
        assert!(g.unresolved.is_empty());
    }

    #[test]
    fn test_every_symbol_has_a_defines_edge() {
        let g = build(&[
            unit("A.gs", "function a1() { b1(); }\nvar c1 = () => 1;"),
            unit("B.html", "<script>function b1() {}</script>"),
        ]);
        for (i, _) in g.symbols().iter().enumerate() {
            assert!(g
                .dependents(Node::Symbol(i))
                .any(|(n, k)| matches!(n, Node::Unit(_)) && k.contains(EdgeKind::Defines)));
        }
    }

    #[test]
    fn test_unresolved_calls_and_bridge_recorded_soft_dropped() {
        let g = build(&[unit(
            "Page.html",
            "<script>google.script.run.missingFn(); absent(); x.nothing(); f(cb, ok);</script>",
        )]);
        let names: Vec<(&str, &str)> = g
            .unresolved
            .iter()
            .map(|u| (u.name.as_str(), u.kind))
            .collect();
        assert!(names.contains(&("missingFn", "bridge")));
        assert!(names.contains(&("absent", "call")));
        assert!(!names.iter().any(|(n, _)| *n == "nothing" || *n == "cb"));
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn test_inclusion_by_base_name() {
        let g = build(&[
            unit("Code.gs", "function doGet() { return HtmlService.createTemplateFromFile('Index'); }"),
            unit("Index.html", "<?!= include('css/Styles'); ?><?!= include('Missing'); ?>"),
            unit("css/Styles.html", "<style></style>"),
        ]);
        let code = Node::Unit(g.unit_index("Code.gs").unwrap());
        let index = Node::Unit(g.unit_index("Index.html").unwrap());
        let styles = Node::Unit(g.unit_index("css/Styles.html").unwrap());
        assert!(has_edge(&g, code, index, EdgeKind::Includes));
        assert!(has_edge(&g, index, styles, EdgeKind::Includes));
        assert!(g
            .unresolved
            .iter()
            .any(|u| u.name == "Missing" && u.kind == "include"));
    }

    #[test]
    fn test_edges_deduplicated_per_kind() {
        let g = build(&[unit(
            "A.gs",
            "function helper() {}\nhelper();\nhelper();\nfunction run() { helper(); helper(); }",
        )]);
        let a = Node::Unit(0);
        let helper = Node::Symbol(g.symbol_index("helper").unwrap());
        let kinds = g
            .dependencies(a)
            .find(|(n, _)| *n == helper)
            .map(|(_, k)| k)
            .unwrap();
        assert!(kinds.contains(EdgeKind::Defines));
        assert!(kinds.contains(EdgeKind::References));
        // DEFINES(helper), DEFINES(run), REFERENCES(helper) from unit, REFERENCES from run
        assert_eq!(g.edge_count(), 4);
    }

    #[test]
    fn test_multiply_defined_symbol_is_one_node() {
        let g = build(&[
            unit("A.gs", "function dup() {}"),
            unit("B.gs", "function dup() {}"),
        ]);
        assert_eq!(g.symbols().len(), 1);
        assert!(g.symbols()[0].is_multiply_defined());
    }

    #[test]
    fn test_malformed_unit_skipped() {
        let g = build(&[
            unit("Good.gs", "function good() {}"),
            unit("Bad.gs", "function bad() { /* never closed }"),
        ]);
        assert_eq!(g.units().len(), 1);
        assert_eq!(g.skipped.len(), 1);
        assert_eq!(g.skipped[0].path, "Bad.gs");
        assert!(g.symbol_index("bad").is_none());
    }

    #[test]
    fn test_strip_extension() {
        assert_eq!(strip_extension("css/Styles.html"), "css/Styles");
        assert_eq!(strip_extension("Styles"), "Styles");
        assert_eq!(strip_extension("a.b/c"), "a.b/c");
    }
}
