//! Graphviz DOT rendering of the unit/symbol graph.
//!
//! - used nodes are lightgreen
//! - unused nodes are lightcoral
//! - files are boxes, symbols are ellipses
//! - edges are labelled with their kind

use std::fmt::Write;

use super::{NodeType, ReportModel};

/// Escapes text for use inside a double-quoted DOT string.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

fn node_id(node_type: NodeType, name: &str) -> String {
    let prefix = match node_type {
        NodeType::File => "file",
        NodeType::Symbol => "sym",
    };
    format!("\"{}:{}\"", prefix, escape(name))
}

/// Generate a Graphviz DOT representation of the dependency graph.
pub fn render_dot(model: &ReportModel) -> String {
    let edge_count: usize = model.files.iter().map(|f| f.dependencies.len()).sum::<usize>()
        + model.symbols.iter().map(|s| s.dependencies.len()).sum::<usize>();
    let estimated_capacity = (model.files.len() + model.symbols.len()) * 80 + edge_count * 60 + 150;
    let mut dot = String::with_capacity(estimated_capacity);

    if let Err(e) = write_dot_content(&mut dot, model) {
        tracing::error!(error = %e, "failed to generate DOT string");
        return "digraph deadscript {\n}\n".to_string();
    }
    dot
}

fn write_dot_content(dot: &mut String, model: &ReportModel) -> std::fmt::Result {
    writeln!(dot, "digraph deadscript {{")?;
    writeln!(dot, "  rankdir=LR;")?;
    writeln!(
        dot,
        "  node [shape=box, style=filled, fontname=\"JetBrains Mono\"];"
    )?;
    writeln!(dot)?;

    for f in &model.files {
        let color = if f.used { "lightgreen" } else { "lightcoral" };
        writeln!(
            dot,
            "  {} [label=\"{}\", fillcolor={}];",
            node_id(NodeType::File, &f.path),
            escape(&f.path),
            color
        )?;
    }
    for s in &model.symbols {
        let color = if s.used { "lightgreen" } else { "lightcoral" };
        writeln!(
            dot,
            "  {} [label=\"{}\", shape=ellipse, fillcolor={}];",
            node_id(NodeType::Symbol, &s.name),
            escape(&s.name),
            color
        )?;
    }

    writeln!(dot)?;

    let sources = model
        .files
        .iter()
        .map(|f| (NodeType::File, f.path.as_str(), &f.dependencies))
        .chain(
            model
                .symbols
                .iter()
                .map(|s| (NodeType::Symbol, s.name.as_str(), &s.dependencies)),
        );
    for (from_type, from, deps) in sources {
        for edge in deps {
            writeln!(
                dot,
                "  {} -> {} [label=\"{}\"];",
                node_id(from_type, from),
                node_id(edge.node_type, &edge.name),
                edge.kind.to_string().to_lowercase()
            )?;
        }
    }

    writeln!(dot, "}}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::tests::sample_model;
    use super::*;

    #[test]
    fn test_dot_colors_and_edges() {
        let dot = render_dot(&sample_model());
        assert!(dot.starts_with("digraph deadscript {"));
        assert!(dot.contains("\"file:Old.gs\" [label=\"Old.gs\", fillcolor=lightcoral];"));
        assert!(dot.contains("\"sym:doGet\" [label=\"doGet\", shape=ellipse, fillcolor=lightgreen];"));
        assert!(dot.contains("\"file:Code.gs\" -> \"file:Index.html\" [label=\"includes\"];"));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn test_quotes_in_paths_are_escaped() {
        let mut model = sample_model();
        for f in &mut model.files {
            if f.path == "Old.gs" {
                f.path = "odd \"name\"\\Old.gs".to_string();
            }
        }
        let dot = render_dot(&model);
        assert!(dot.contains(
            "\"file:odd \\\"name\\\"\\\\Old.gs\" [label=\"odd \\\"name\\\"\\\\Old.gs\", fillcolor=lightcoral];"
        ));
        assert!(!dot.contains("label=\"odd \"name"));
    }
}
