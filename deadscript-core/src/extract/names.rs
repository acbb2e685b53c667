//! Name validity predicate and platform denylist.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Language keywords and literals that look like identifiers.
pub const RESERVED_WORDS: &[&str] = &[
    "async", "await", "break", "case", "catch", "class", "const", "continue", "debugger",
    "default", "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for",
    "function", "get", "if", "implements", "import", "in", "instanceof", "interface", "let",
    "new", "null", "of", "package", "private", "protected", "public", "return", "set", "static",
    "super", "switch", "this", "throw", "true", "try", "typeof", "undefined", "var", "void",
    "while", "with", "yield", "arguments",
];

/// Globals provided by the runtime or the browser; calls to these are never
/// references to project code.
pub const PLATFORM_BUILTINS: &[&str] = &[
    // language
    "Array", "Boolean", "Date", "Error", "Function", "JSON", "Map", "Math", "Number", "Object",
    "Promise", "Proxy", "RangeError", "Reflect", "RegExp", "Set", "String", "Symbol",
    "SyntaxError", "TypeError", "WeakMap", "WeakSet", "constructor", "decodeURI",
    "decodeURIComponent", "encodeURI", "encodeURIComponent", "escape", "eval", "isFinite",
    "isNaN", "parseFloat", "parseInt", "require", "unescape",
    // browser
    "alert", "clearInterval", "clearTimeout", "confirm", "console", "document", "fetch",
    "jQuery", "prompt", "requestAnimationFrame", "setInterval", "setTimeout", "window",
    // server services
    "CacheService", "CalendarApp", "ContentService", "DocumentApp", "DriveApp", "GmailApp",
    "HtmlService", "LockService", "Logger", "MailApp", "PropertiesService", "ScriptApp",
    "Session", "SpreadsheetApp", "UrlFetchApp", "Utilities",
];

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("Hardcoded regex pattern is valid")
    })
}

/// Identifier-shaped, not reserved, longer than one character.
pub fn is_valid_name(name: &str) -> bool {
    name.len() > 1 && identifier_regex().is_match(name) && !RESERVED_WORDS.contains(&name)
}

/// Denylist of names that are never treated as project references.
#[derive(Debug, Clone)]
pub struct Builtins {
    names: HashSet<String>,
}

impl Builtins {
    /// Platform names plus operator-supplied extras.
    pub fn new(extra: &[String]) -> Self {
        let names = PLATFORM_BUILTINS
            .iter()
            .map(|s| s.to_string())
            .chain(extra.iter().cloned())
            .collect();
        Self { names }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

impl Default for Builtins {
    fn default() -> Self {
        Self::new(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("helper"));
        assert!(is_valid_name("$el"));
        assert!(is_valid_name("_private2"));
        assert!(!is_valid_name("x"));
        assert!(!is_valid_name("return"));
        assert!(!is_valid_name("2fast"));
        assert!(!is_valid_name("a-b"));
        assert!(!is_valid_name(""));
    }

    #[test]
    fn test_builtins_with_extras() {
        let b = Builtins::new(&["gtag".to_string()]);
        assert!(b.contains("parseInt"));
        assert!(b.contains("SpreadsheetApp"));
        assert!(b.contains("gtag"));
        assert!(!b.contains("helper"));
    }
}
