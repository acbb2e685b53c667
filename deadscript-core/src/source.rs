//! Source units: the files an analysis run reads.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Role of a file in the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitKind {
    /// Server-side script module (`.gs`, `.js`)
    BackendModule,
    /// HTML template with embedded frontend script (`.html`, `.htm`)
    FrontendTemplate,
    /// Manifest or configuration (`.json`)
    Config,
}

impl UnitKind {
    /// Classify a file by extension. Returns `None` for files the tool ignores.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "gs" | "js" => Some(Self::BackendModule),
            "html" | "htm" => Some(Self::FrontendTemplate),
            "json" => Some(Self::Config),
            _ => None,
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BackendModule => write!(f, "backend-module"),
            Self::FrontendTemplate => write!(f, "frontend-template"),
            Self::Config => write!(f, "config"),
        }
    }
}

/// One file read for an analysis run. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    /// Path relative to the analysed root, forward slashes.
    pub path: String,
    pub kind: UnitKind,
    pub text: String,
    pub size: u64,
}

impl SourceUnit {
    pub fn new(path: impl Into<String>, kind: UnitKind, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            path: path.into(),
            kind,
            size: text.len() as u64,
            text,
        }
    }

    /// File name without directory and extension (`"lib/Helpers.gs"` -> `"Helpers"`).
    pub fn base_name(&self) -> &str {
        base_name(&self.path)
    }

    /// File name without directory (`"lib/Helpers.gs"` -> `"Helpers.gs"`).
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Extension-less base name of a forward-slash relative path.
pub fn base_name(path: &str) -> &str {
    let file = path.rsplit('/').next().unwrap_or(path);
    match file.rfind('.') {
        Some(0) | None => file,
        Some(dot) => &file[..dot],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(UnitKind::from_path(Path::new("Code.gs")), Some(UnitKind::BackendModule));
        assert_eq!(UnitKind::from_path(Path::new("lib/util.JS")), Some(UnitKind::BackendModule));
        assert_eq!(UnitKind::from_path(Path::new("Index.html")), Some(UnitKind::FrontendTemplate));
        assert_eq!(UnitKind::from_path(Path::new("appsscript.json")), Some(UnitKind::Config));
        assert_eq!(UnitKind::from_path(Path::new("README.md")), None);
        assert_eq!(UnitKind::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("lib/Helpers.gs"), "Helpers");
        assert_eq!(base_name("Index.html"), "Index");
        assert_eq!(base_name("a/b/page.min.js"), "page.min");
        assert_eq!(base_name(".clasp.json"), ".clasp");
    }

    #[test]
    fn test_unit_size_is_byte_length() {
        let unit = SourceUnit::new("Code.gs", UnitKind::BackendModule, "function é() {}");
        assert_eq!(unit.size, "function é() {}".len() as u64);
        assert_eq!(unit.file_name(), "Code.gs");
    }
}
