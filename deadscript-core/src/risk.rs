//! Deletion-risk classification for unused files and symbols.
//!
//! Rules are checked in order and the first match wins:
//!
//! | # | Rule                                              | Level  |
//! |---|---------------------------------------------------|--------|
//! | 1 | manifest / configuration file                     | high   |
//! | 2 | symbol defined in more than one unit              | medium |
//! | 3 | symbol name appears in a string literal           | medium |
//! | 4 | name contains a protected substring               | medium |
//! | 5 | frontend template, or symbol defined only in one  | medium |
//! | 6 | anything else                                     | low    |
//!
//! Classification reads the analysis and never changes it, so the same
//! result can be re-rated under a different configuration.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::config::RiskConfig;
use crate::error::DeadscriptError;
use crate::graph::DependencyGraph;
use crate::reach::{AnalysisResult, UnusedFile, UnusedSymbol};
use crate::source::UnitKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Recommended action text for reports.
    pub fn action(self) -> &'static str {
        match self {
            Self::Low => "delete",
            Self::Medium => "review before deleting",
            Self::High => "keep",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl FromStr for RiskLevel {
    type Err = DeadscriptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(DeadscriptError::invalid_argument(format!(
                "unknown risk level '{}' (expected low, medium or high)",
                other
            ))),
        }
    }
}

/// A level plus the reason it was chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskRating {
    pub level: RiskLevel,
    pub rationale: String,
}

impl RiskRating {
    fn new(level: RiskLevel, rationale: impl Into<String>) -> Self {
        Self {
            level,
            rationale: rationale.into(),
        }
    }
}

/// What the classifier knows about a symbol beyond its name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SymbolFacts {
    pub defining_units: usize,
    pub mentioned_in_string: bool,
    pub frontend_only: bool,
}

impl SymbolFacts {
    pub fn from_graph(graph: &DependencyGraph, symbol: &UnusedSymbol) -> Self {
        let units = graph
            .symbol_index(&symbol.name)
            .map(|i| graph.symbol(i).defining_units())
            .unwrap_or_default();
        let frontend_only = !units.is_empty()
            && units.iter().all(|u| {
                graph
                    .unit_index(u)
                    .is_some_and(|i| graph.unit(i).kind == UnitKind::FrontendTemplate)
            });
        Self {
            defining_units: units.len(),
            mentioned_in_string: graph.string_mentions.contains(&symbol.name),
            frontend_only,
        }
    }
}

/// Ratings for every unused entry, keyed by path or name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RiskAssessment {
    pub files: BTreeMap<String, RiskRating>,
    pub symbols: BTreeMap<String, RiskRating>,
}

impl RiskAssessment {
    pub fn file(&self, path: &str) -> Option<&RiskRating> {
        self.files.get(path)
    }

    pub fn symbol(&self, name: &str) -> Option<&RiskRating> {
        self.symbols.get(name)
    }

    /// Count of entries per level (files, symbols).
    pub fn count_at(&self, level: RiskLevel) -> (usize, usize) {
        (
            self.files.values().filter(|r| r.level == level).count(),
            self.symbols.values().filter(|r| r.level == level).count(),
        )
    }
}

/// Rule-based classifier. Holds configuration only.
#[derive(Debug, Clone)]
pub struct RiskClassifier {
    protected: Vec<String>,
    config_files: Vec<String>,
}

impl Default for RiskClassifier {
    fn default() -> Self {
        Self::new(&RiskConfig::default())
    }
}

impl RiskClassifier {
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            protected: config
                .protected_substrings
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            config_files: config.config_files.clone(),
        }
    }

    fn protected_match(&self, name: &str) -> Option<&str> {
        let lower = name.to_ascii_lowercase();
        self.protected
            .iter()
            .find(|p| lower.contains(p.as_str()))
            .map(String::as_str)
    }

    pub fn rate_file(&self, file: &UnusedFile) -> RiskRating {
        let name = file.path.rsplit('/').next().unwrap_or(&file.path);
        if file.kind == UnitKind::Config || self.config_files.iter().any(|c| c == name) {
            return RiskRating::new(RiskLevel::High, "manifest or configuration file");
        }
        if let Some(p) = self.protected_match(crate::source::base_name(&file.path)) {
            return RiskRating::new(
                RiskLevel::Medium,
                format!("file name contains protected substring '{}'", p),
            );
        }
        if file.kind == UnitKind::FrontendTemplate {
            return RiskRating::new(
                RiskLevel::Medium,
                "frontend template; markup usage cannot be verified statically",
            );
        }
        RiskRating::new(RiskLevel::Low, "no references found")
    }

    pub fn rate_symbol(&self, symbol: &UnusedSymbol, facts: &SymbolFacts) -> RiskRating {
        if facts.defining_units > 1 {
            return RiskRating::new(
                RiskLevel::Medium,
                format!("defined in {} files; ambiguous ownership", facts.defining_units),
            );
        }
        if facts.mentioned_in_string {
            return RiskRating::new(
                RiskLevel::Medium,
                "name appears in a string literal; may be dispatched by name",
            );
        }
        if let Some(p) = self.protected_match(&symbol.name) {
            return RiskRating::new(
                RiskLevel::Medium,
                format!("name contains protected substring '{}'", p),
            );
        }
        if facts.frontend_only {
            return RiskRating::new(RiskLevel::Medium, "defined only in frontend templates");
        }
        RiskRating::new(RiskLevel::Low, "no references found")
    }

    /// Rates every unused file and symbol in `analysis`.
    pub fn assess(&self, analysis: &AnalysisResult, graph: &DependencyGraph) -> RiskAssessment {
        let files = analysis
            .unused_files
            .iter()
            .map(|f| (f.path.clone(), self.rate_file(f)))
            .collect();
        let symbols = analysis
            .unused_symbols
            .iter()
            .map(|s| {
                let facts = SymbolFacts::from_graph(graph, s);
                (s.name.clone(), self.rate_symbol(s, &facts))
            })
            .collect();
        RiskAssessment { files, symbols }
    }
}
