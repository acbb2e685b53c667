//! Reachability marking and the used/unused partition.
//!
//! Multi-source BFS from the root set, cycle-safe via a visited map.
//! Marking never touches the filesystem; sweeping is left to `fix`.
//!
//! Units are visited in one of two modes:
//! - *entry* units follow every out-edge, DEFINES included. These are the
//!   units that define a root symbol, configured root files, and templates
//!   reached through an inclusion.
//! - *host* units are used only because they define a reached symbol. They
//!   follow their top-level REFERENCES and INCLUDES edges but not DEFINES,
//!   so one live function does not keep its siblings alive.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

use crate::graph::{DefinitionSite, DependencyGraph, EdgeKind, Node};
use crate::roots::RootSet;
use crate::source::UnitKind;

/// An unused file and what it would free.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct UnusedFile {
    pub path: String,
    pub kind: UnitKind,
    pub size: u64,
}

/// An unused symbol and every place it is defined.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct UnusedSymbol {
    pub name: String,
    pub sites: Vec<DefinitionSite>,
}

/// The mark phase's output. All collections are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    pub used_files: Vec<String>,
    pub unused_files: Vec<UnusedFile>,
    pub used_symbols: Vec<String>,
    pub unused_symbols: Vec<UnusedSymbol>,
    pub unresolved_count: usize,
    pub skipped_files: Vec<String>,
}

impl AnalysisResult {
    pub fn is_file_used(&self, path: &str) -> bool {
        self.used_files.binary_search_by(|p| p.as_str().cmp(path)).is_ok()
    }

    pub fn is_symbol_used(&self, name: &str) -> bool {
        self.used_symbols.binary_search_by(|n| n.as_str().cmp(name)).is_ok()
    }

    pub fn has_unused(&self) -> bool {
        !self.unused_files.is_empty() || !self.unused_symbols.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Host,
    Entry,
}

/// Marks every node reachable from `roots` and partitions the graph.
pub fn analyze(graph: &DependencyGraph, roots: &RootSet) -> AnalysisResult {
    let mut visited: HashMap<Node, Mode> = HashMap::new();
    let mut queue: VecDeque<(Node, Mode)> = VecDeque::new();

    let mut visit = |node: Node, mode: Mode, queue: &mut VecDeque<(Node, Mode)>| {
        let upgrade = match visited.get(&node) {
            None => true,
            Some(Mode::Host) => mode == Mode::Entry,
            Some(Mode::Entry) => false,
        };
        if upgrade {
            visited.insert(node, mode);
            queue.push_back((node, mode));
        }
    };

    for (i, sym) in graph.symbols().iter().enumerate() {
        if roots.is_root_symbol(&sym.name) {
            visit(Node::Symbol(i), Mode::Host, &mut queue);
            for unit in sym.defining_units() {
                if let Some(u) = graph.unit_index(unit) {
                    visit(Node::Unit(u), Mode::Entry, &mut queue);
                }
            }
        }
    }
    for (i, unit) in graph.units().iter().enumerate() {
        if roots.is_root_file(&unit.path) {
            visit(Node::Unit(i), Mode::Entry, &mut queue);
        }
    }
    for name in roots.callbacks() {
        if graph.symbol_index(name).is_none() {
            debug!(%name, "root callback not defined in project");
        }
    }

    while let Some((node, mode)) = queue.pop_front() {
        if let Node::Symbol(i) = node {
            for unit in graph.symbol(i).defining_units() {
                if let Some(u) = graph.unit_index(unit) {
                    visit(Node::Unit(u), Mode::Host, &mut queue);
                }
            }
        }

        for (next, kinds) in graph.dependencies(node) {
            let follow = match next {
                Node::Unit(_) => kinds.contains(EdgeKind::Includes),
                Node::Symbol(_) => {
                    kinds.contains(EdgeKind::References)
                        || (mode == Mode::Entry && kinds.contains(EdgeKind::Defines))
                }
            };
            if follow {
                let next_mode = match next {
                    Node::Unit(u) if graph.unit(u).kind == UnitKind::FrontendTemplate => Mode::Entry,
                    _ => Mode::Host,
                };
                visit(next, next_mode, &mut queue);
            }
        }
    }

    let mut result = AnalysisResult {
        unresolved_count: graph.unresolved.len(),
        skipped_files: graph.skipped.iter().map(|s| s.path.clone()).collect(),
        ..AnalysisResult::default()
    };

    for (i, unit) in graph.units().iter().enumerate() {
        if visited.contains_key(&Node::Unit(i)) {
            result.used_files.push(unit.path.clone());
        } else {
            result.unused_files.push(UnusedFile {
                path: unit.path.clone(),
                kind: unit.kind,
                size: unit.size,
            });
        }
    }
    for (i, sym) in graph.symbols().iter().enumerate() {
        if visited.contains_key(&Node::Symbol(i)) || roots.is_root_symbol(&sym.name) {
            result.used_symbols.push(sym.name.clone());
        } else {
            result.unused_symbols.push(UnusedSymbol {
                name: sym.name.clone(),
                sites: sym.sites.clone(),
            });
        }
    }

    result.used_files.sort();
    result.unused_files.sort();
    result.used_symbols.sort();
    result.unused_symbols.sort();
    result.skipped_files.sort();

    info!(
        used_files = result.used_files.len(),
        unused_files = result.unused_files.len(),
        used_symbols = result.used_symbols.len(),
        unused_symbols = result.unused_symbols.len(),
        "reachability marked"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Extractor;
    use crate::source::SourceUnit;

    fn unit(path: &str, text: &str) -> SourceUnit {
        let kind = UnitKind::from_path(std::path::Path::new(path)).unwrap();
        SourceUnit::new(path, kind, text)
    }

    fn run(units: &[SourceUnit]) -> AnalysisResult {
        let graph = DependencyGraph::build(units, &Extractor::default());
        let roots = RootSet::from_config(&crate::config::RootsConfig::default())
            .with_triggers(graph.triggers.iter().cloned());
        analyze(&graph, &roots)
    }

    fn unused_names(r: &AnalysisResult) -> Vec<&str> {
        r.unused_symbols.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_helper_used_orphan_unused() {
        let r = run(&[
            unit("A.gs", "function doGet() {\n  return helper();\n}\n"),
            unit("B.gs", "function helper() { return 1; }\n\nfunction orphan() { return 2; }\n"),
        ]);
        assert_eq!(r.used_files, vec!["A.gs", "B.gs"]);
        assert!(r.unused_files.is_empty());
        assert!(r.is_symbol_used("helper"));
        assert!(r.is_symbol_used("doGet"));
        assert_eq!(unused_names(&r), vec!["orphan"]);
    }

    #[test]
    fn test_unreferenced_file_is_unused() {
        let r = run(&[
            unit("Code.gs", "function doGet() {}"),
            unit("Old.gs", "function legacy() {}"),
            unit("appsscript.json", "{}"),
        ]);
        assert_eq!(r.used_files, vec!["Code.gs", "appsscript.json"]);
        assert_eq!(r.unused_files.len(), 1);
        assert_eq!(r.unused_files[0].path, "Old.gs");
        assert_eq!(unused_names(&r), vec!["legacy"]);
    }

    #[test]
    fn test_includes_reach_whole_template() {
        let r = run(&[
            unit(
                "Code.gs",
                "function doGet() { return HtmlService.createTemplateFromFile('Index').evaluate(); }",
            ),
            unit("Server.gs", "function getRows() { return []; }\nfunction unusedServer() {}"),
            unit(
                "Index.html",
                "<script>\nfunction load() { google.script.run.withSuccessHandler(show).getRows(); }\nfunction show(r) {}\n</script>",
            ),
        ]);
        assert!(r.is_file_used("Index.html"));
        assert!(r.is_symbol_used("load"));
        assert!(r.is_symbol_used("show"));
        assert!(r.is_symbol_used("getRows"));
        assert_eq!(unused_names(&r), vec!["unusedServer"]);
    }

    #[test]
    fn test_cycles_terminate() {
        let r = run(&[
            unit("A.html", "<?!= include('B'); ?>"),
            unit("B.html", "<?!= include('A'); ?>"),
            unit("Code.gs", "function doGet() { return include('A'); }\nfunction include(f) { return f; }"),
        ]);
        assert_eq!(r.used_files, vec!["A.html", "B.html", "Code.gs"]);
        assert!(r.is_symbol_used("include"));
    }

    #[test]
    fn test_root_symbol_used_without_edges() {
        let r = run(&[unit("Menu.gs", "function onOpen() {}\nfunction testThing() {}")]);
        assert!(r.is_symbol_used("onOpen"));
        assert!(r.is_symbol_used("testThing"));
        assert!(r.is_file_used("Menu.gs"));
        assert!(r.unused_symbols.is_empty());
    }

    #[test]
    fn test_trigger_registered_function_is_root() {
        let r = run(&[
            unit("Menu.gs", "function onOpen() {}"),
            unit(
                "Setup.gs",
                "function installTriggers() { ScriptApp.newTrigger('nightly').timeBased().create(); }",
            ),
            unit("Jobs.gs", "function nightly() {}"),
        ]);
        assert!(r.is_symbol_used("nightly"));
        assert_eq!(unused_names(&r), vec!["installTriggers"]);
    }

    #[test]
    fn test_root_unit_keeps_its_siblings() {
        let r = run(&[
            unit("A.gs", "function doGet() { return 1; }\nfunction localHelper() { return 2; }"),
            unit("B.gs", "function spare() {}"),
        ]);
        assert!(r.is_symbol_used("localHelper"));
        assert_eq!(unused_names(&r), vec!["spare"]);
    }

    #[test]
    fn test_host_unit_top_level_calls_followed() {
        let r = run(&[
            unit("A.gs", "function doGet() { util1(); }"),
            unit("B.gs", "function util1() {}\nregister();"),
            unit("C.gs", "function register() {}"),
        ]);
        assert!(r.is_symbol_used("register"));
        assert!(r.is_file_used("C.gs"));
    }
}
