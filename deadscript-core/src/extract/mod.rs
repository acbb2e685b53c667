//! Definition and reference extraction without a parser.
//!
//! Extraction is a set of independent pattern rules run over the lexer's
//! comment- and string-neutral view of a unit:
//!
//! - definitions: `function name(`, `name = function`, `name = (..) =>`,
//!   `name: function`, method shorthand `name(..) {`
//! - references: bare calls, member calls, bridge calls
//!   (`google.script.run.withSuccessHandler(cb).name(`), and identifiers
//!   passed as call arguments
//! - inclusions: `include("X")`, `createTemplateFromFile("X")`,
//!   `createHtmlOutputFromFile("X")`
//! - trigger registrations: `ScriptApp.newTrigger("name")`
//! - string mentions: identifier-shaped string literals
//!
//! Every result is a heuristic. Member calls and argument identifiers are
//! *soft* references: they only become edges when a definition with that
//! name exists, and are otherwise dropped without a diagnostic.

pub mod html;
pub mod lexer;
pub mod names;

use regex::Regex;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::{BTreeSet, HashSet};
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::config::ExtractConfig;
use crate::error::{DeadscriptError, DeadscriptResult};
use crate::source::{SourceUnit, UnitKind};

use lexer::{line_of, line_starts, ByteClass, Unterminated, Views};
use names::{is_valid_name, Builtins};

/// Bridge modifiers that return the bridge itself.
const BRIDGE_MODIFIERS: &[&str] = &["withSuccessHandler", "withFailureHandler", "withUserObject"];

/// Syntactic form of a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DefinitionForm {
    /// `function name(..) {..}`
    Function,
    /// `name = function ..` or `name = (..) => ..`
    BoundCallable,
    /// `name: function ..` inside an object literal
    Property,
    /// `name(..) {..}` inside an object literal or class body
    Method,
}

/// One definition found in a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Definition {
    pub name: String,
    pub form: DefinitionForm,
    /// Offset of the definition's first token (`function` keyword or name)
    pub start: usize,
    /// Body range; for block bodies this runs from `{` to one past `}`
    pub body_start: usize,
    pub body_end: usize,
    pub start_line: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceKind {
    /// `name(`
    Call,
    /// `<bridge>.name(`
    Bridge,
    /// `.name(`
    Member,
    /// `name` passed as an argument
    Value,
}

impl ReferenceKind {
    /// Soft references never produce unresolved diagnostics.
    pub fn is_soft(self) -> bool {
        matches!(self, Self::Member | Self::Value)
    }
}

/// A candidate callee occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub name: String,
    pub kind: ReferenceKind,
    pub line: usize,
    /// Innermost enclosing definition, if any
    pub scope: Option<String>,
}

/// An inclusion directive naming another unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inclusion {
    pub target: String,
    pub line: usize,
}

/// Everything extracted from one unit.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub definitions: Vec<Definition>,
    pub references: Vec<Reference>,
    pub inclusions: Vec<Inclusion>,
    /// Names registered as triggers at runtime
    pub triggers: Vec<String>,
    pub string_mentions: BTreeSet<String>,
}

// ----------------------------------------------------------------------------
// Patterns
// ----------------------------------------------------------------------------

fn function_decl_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\bfunction\b\s*\*?\s*([A-Za-z_$][\w$]*)\s*\(")
            .expect("Hardcoded regex pattern is valid")
    })
}

fn binding_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"([A-Za-z_$][\w$]*)\s*([=:])\s*(?:async\s+)?(?:function\b|\([^()]*\)\s*=>|[A-Za-z_$][\w$]*\s*=>)",
        )
        .expect("Hardcoded regex pattern is valid")
    })
}

fn method_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*(?:(?:async|static|get|set)[ \t]+)*([A-Za-z_$][\w$]*)[ \t]*\([^()]*\)\s*\{")
            .expect("Hardcoded regex pattern is valid")
    })
}

fn call_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([A-Za-z_$][\w$]*)\s*\(").expect("Hardcoded regex pattern is valid")
    })
}

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z_$][\w$]*").expect("Hardcoded regex pattern is valid"))
}

fn dom_handler_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^on[a-z]+$").expect("Hardcoded regex pattern is valid"))
}

fn include_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"\b(?:include|create(?:Template|HtmlOutput)FromFile)\s*\(\s*['"`]([^'"`\n]+)['"`]"#,
        )
        .expect("Hardcoded regex pattern is valid")
    })
}

fn trigger_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\bnewTrigger\s*\(\s*['"`]([A-Za-z_$][\w$]*)['"`]"#)
            .expect("Hardcoded regex pattern is valid")
    })
}

fn string_mention_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"'([A-Za-z_$][\w$]*)'|"([A-Za-z_$][\w$]*)""#)
            .expect("Hardcoded regex pattern is valid")
    })
}

// ----------------------------------------------------------------------------
// Byte-level helpers over the neutral view
// ----------------------------------------------------------------------------

#[inline]
fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

fn skip_ws(b: &[u8], mut i: usize) -> usize {
    while i < b.len() && b[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// Last non-whitespace byte before `i`.
fn prev_significant(b: &[u8], i: usize) -> Option<u8> {
    b[..i].iter().rev().copied().find(|c| !c.is_ascii_whitespace())
}

/// Index of the delimiter closing the one at `open`.
fn match_delim(b: &[u8], open: usize, o: u8, c: u8) -> Option<usize> {
    let mut depth = 0usize;
    for (i, &ch) in b.iter().enumerate().skip(open) {
        if ch == o {
            depth += 1;
        } else if ch == c {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// End of an arrow function's expression body.
fn expression_end(b: &[u8], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i < b.len() {
        match b[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            b';' | b',' | b'\n' if depth == 0 => break,
            _ => {}
        }
        i += 1;
    }
    while i > start && b[i - 1].is_ascii_whitespace() {
        i -= 1;
    }
    i
}

/// Walks from just after a definition introducer to its body.
///
/// Accepts `function`, names, `async`, `*`, a parameter list and `=>`
/// before the body; anything else means the match was not a definition.
fn body_after(b: &[u8], mut i: usize) -> Option<(usize, usize)> {
    loop {
        i = skip_ws(b, i);
        match *b.get(i)? {
            b'{' => {
                let close = match_delim(b, i, b'{', b'}')?;
                return Some((i, close + 1));
            }
            b'(' => i = match_delim(b, i, b'(', b')')? + 1,
            b'=' if b.get(i + 1) == Some(&b'>') => {
                i = skip_ws(b, i + 2);
                if b.get(i) == Some(&b'{') {
                    continue;
                }
                return Some((i, expression_end(b, i)));
            }
            b'*' => i += 1,
            c if is_ident_byte(c) => {
                while i < b.len() && is_ident_byte(b[i]) {
                    i += 1;
                }
            }
            _ => return None,
        }
    }
}

// ----------------------------------------------------------------------------
// Definitions
// ----------------------------------------------------------------------------

/// Text that should be lexed for `unit`: markup is masked for templates.
pub fn script_text(kind: UnitKind, text: &str) -> Cow<'_, str> {
    match kind {
        UnitKind::FrontendTemplate => Cow::Owned(html::mask_markup(text)),
        _ => Cow::Borrowed(text),
    }
}

/// Lexes a unit's script text into its two views.
pub fn prepare(kind: UnitKind, text: &str) -> Result<Views, Unterminated> {
    lexer::views(&script_text(kind, text))
}

/// Every recognised definition in a neutral view, ordered by position.
///
/// Each definition also records the offset of its name so call matching can
/// skip it.
fn scan_definitions(neutral: &str, starts: &[usize]) -> Vec<(Definition, usize)> {
    let b = neutral.as_bytes();
    let mut found: Vec<(Definition, usize)> = Vec::new();
    let mut push = |name: &str,
                    form: DefinitionForm,
                    start: usize,
                    name_at: usize,
                    body: Option<(usize, usize)>| {
        let Some((body_start, body_end)) = body else {
            return;
        };
        if !is_valid_name(name) {
            return;
        }
        found.push((
            Definition {
                name: name.to_string(),
                form,
                start,
                body_start,
                body_end,
                start_line: line_of(starts, start),
                end_line: line_of(starts, body_end.saturating_sub(1).max(start)),
            },
            name_at,
        ));
    };

    for caps in function_decl_regex().captures_iter(neutral) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let mut start = whole.start();
        // Include a leading `async` in the span.
        let before = neutral[..start].trim_end();
        if before.ends_with("async")
            && !before[..before.len() - 5]
                .bytes()
                .last()
                .is_some_and(is_ident_byte)
        {
            start = before.len() - 5;
        }
        push(
            name.as_str(),
            DefinitionForm::Function,
            start,
            name.start(),
            body_after(b, whole.end() - 1),
        );
    }

    for caps in binding_regex().captures_iter(neutral) {
        let (Some(name), Some(sign)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let prev = prev_significant(b, name.start());
        if prev == Some(b'.') && dom_handler_regex().is_match(name.as_str()) {
            continue;
        }
        // `key: function` only inside an object literal, never the tail of
        // a conditional expression.
        if sign.as_str() == ":" && !matches!(prev, None | Some(b'{') | Some(b',')) {
            continue;
        }
        let form = if sign.as_str() == ":" {
            DefinitionForm::Property
        } else {
            DefinitionForm::BoundCallable
        };
        push(
            name.as_str(),
            form,
            name.start(),
            name.start(),
            body_after(b, sign.end()),
        );
    }

    for caps in method_regex().captures_iter(neutral) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let start = whole.start() + (whole.as_str().len() - whole.as_str().trim_start().len());
        push(
            name.as_str(),
            DefinitionForm::Method,
            start,
            name.start(),
            body_after(b, whole.end() - 1),
        );
    }

    found.sort_by_key(|(d, _)| (d.start, d.body_start));
    found.dedup_by(|a, b| a.0.name == b.0.name && a.0.body_start == b.0.body_start);
    found
}

/// Every recognised definition in a neutral view, ordered by position.
pub fn definitions_in(neutral: &str, starts: &[usize]) -> Vec<Definition> {
    scan_definitions(neutral, starts)
        .into_iter()
        .map(|(d, _)| d)
        .collect()
}

/// Innermost definition whose body contains `offset`.
fn enclosing(defs: &[Definition], offset: usize) -> Option<&Definition> {
    defs.iter()
        .filter(|d| d.body_start <= offset && offset < d.body_end)
        .max_by_key(|d| d.body_start)
}

// ----------------------------------------------------------------------------
// Extractor
// ----------------------------------------------------------------------------

/// Turns source units into definitions and references.
///
/// Holds only configuration; every call is a pure function of the unit.
#[derive(Debug, Clone)]
pub struct Extractor {
    bridges: Vec<Regex>,
    builtins: Builtins,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(&ExtractConfig::default())
    }
}

impl Extractor {
    pub fn new(config: &ExtractConfig) -> Self {
        let bridges = config
            .bridges
            .iter()
            .filter_map(|bridge| {
                let pattern = bridge
                    .split('.')
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(r"\s*\.\s*");
                match Regex::new(&format!(r"\b{}\b", pattern)) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        warn!(%bridge, error = %e, "ignoring unusable bridge pattern");
                        None
                    }
                }
            })
            .collect();

        Self {
            bridges,
            builtins: Builtins::new(&config.builtins),
        }
    }

    /// Extracts a unit, logging and returning an empty result on failure.
    pub fn extract(&self, unit: &SourceUnit) -> Extraction {
        match self.try_extract(unit) {
            Ok(extraction) => extraction,
            Err(e) => {
                warn!(unit = %unit.path, error = %e, "extraction failed, unit contributes nothing");
                Extraction::default()
            }
        }
    }

    /// Extracts a unit, reporting malformed input as an error.
    pub fn try_extract(&self, unit: &SourceUnit) -> DeadscriptResult<Extraction> {
        if unit.kind == UnitKind::Config {
            return Ok(Extraction::default());
        }

        let starts = line_starts(&unit.text);
        let views = prepare(unit.kind, &unit.text).map_err(|u| {
            DeadscriptError::extract_at(
                &unit.path,
                format!("unterminated {}", u.what),
                line_of(&starts, u.offset),
            )
        })?;

        let found = scan_definitions(&views.neutral, &starts);
        let name_offsets: HashSet<usize> = found.iter().map(|(_, at)| *at).collect();
        let definitions: Vec<Definition> = found.into_iter().map(|(d, _)| d).collect();

        let mut raw: Vec<(String, ReferenceKind, usize)> = Vec::new();
        let bridge_offsets = self.bridge_calls(&views.neutral, &mut raw);
        self.calls(&views.neutral, &name_offsets, &bridge_offsets, &mut raw);
        self.values(&views.neutral, &mut raw);

        let references = raw
            .into_iter()
            .map(|(name, kind, offset)| Reference {
                scope: enclosing(&definitions, offset).map(|d| d.name.clone()),
                line: line_of(&starts, offset),
                name,
                kind,
            })
            .collect();

        let inclusions = include_regex()
            .captures_iter(&views.code)
            .filter_map(|caps| caps.get(1))
            .map(|m| Inclusion {
                target: m.as_str().trim().to_string(),
                line: line_of(&starts, m.start()),
            })
            .collect();

        let triggers = trigger_regex()
            .captures_iter(&views.code)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .collect();

        let string_mentions = string_mentions(&views);

        let extraction = Extraction {
            definitions,
            references,
            inclusions,
            triggers,
            string_mentions,
        };
        debug!(
            unit = %unit.path,
            definitions = extraction.definitions.len(),
            references = extraction.references.len(),
            inclusions = extraction.inclusions.len(),
            "extracted unit"
        );
        Ok(extraction)
    }

    /// Bridge chains; returns the offsets of the called names.
    fn bridge_calls(
        &self,
        neutral: &str,
        out: &mut Vec<(String, ReferenceKind, usize)>,
    ) -> HashSet<usize> {
        let b = neutral.as_bytes();
        let mut offsets = HashSet::new();

        for re in &self.bridges {
            for m in re.find_iter(neutral) {
                let mut i = m.end();
                loop {
                    i = skip_ws(b, i);
                    if b.get(i) != Some(&b'.') {
                        break;
                    }
                    i = skip_ws(b, i + 1);
                    let name_at = i;
                    while i < b.len() && is_ident_byte(b[i]) {
                        i += 1;
                    }
                    let name = &neutral[name_at..i];
                    i = skip_ws(b, i);
                    if name.is_empty() || b.get(i) != Some(&b'(') {
                        break;
                    }
                    if BRIDGE_MODIFIERS.contains(&name) {
                        match match_delim(b, i, b'(', b')') {
                            Some(close) => i = close + 1,
                            None => break,
                        }
                        continue;
                    }
                    if is_valid_name(name) {
                        offsets.insert(name_at);
                        out.push((name.to_string(), ReferenceKind::Bridge, name_at));
                    }
                    break;
                }
            }
        }
        offsets
    }

    /// Bare and member calls.
    fn calls(
        &self,
        neutral: &str,
        name_offsets: &HashSet<usize>,
        bridge_offsets: &HashSet<usize>,
        out: &mut Vec<(String, ReferenceKind, usize)>,
    ) {
        let b = neutral.as_bytes();
        for caps in call_regex().captures_iter(neutral) {
            let Some(m) = caps.get(1) else { continue };
            let at = m.start();
            if name_offsets.contains(&at) || bridge_offsets.contains(&at) {
                continue;
            }
            // Mid-identifier match (e.g. after a digit).
            if at > 0 && is_ident_byte(b[at - 1]) {
                continue;
            }
            let name = m.as_str();
            if !is_valid_name(name) {
                continue;
            }
            if prev_significant(b, at) == Some(b'.') {
                out.push((name.to_string(), ReferenceKind::Member, at));
            } else if !self.builtins.contains(name) {
                out.push((name.to_string(), ReferenceKind::Call, at));
            }
        }
    }

    /// Identifiers passed as whole call arguments (`map(fmt)`, `f(a, cb)`).
    fn values(&self, neutral: &str, out: &mut Vec<(String, ReferenceKind, usize)>) {
        let b = neutral.as_bytes();
        for m in identifier_regex().find_iter(neutral) {
            let at = m.start();
            if at > 0 && is_ident_byte(b[at - 1]) {
                continue;
            }
            let opens = matches!(prev_significant(b, at), Some(b'(') | Some(b','));
            let after = skip_ws(b, m.end());
            let closes = matches!(b.get(after), Some(b',') | Some(b')'));
            let name = m.as_str();
            if opens && closes && is_valid_name(name) && !self.builtins.contains(name) {
                out.push((name.to_string(), ReferenceKind::Value, at));
            }
        }
    }
}

/// Identifier-shaped string literals in code (not comments).
fn string_mentions(views: &Views) -> BTreeSet<String> {
    string_mention_regex()
        .captures_iter(&views.code)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let open = views.classes.get(whole.start())?;
            let close = views.classes.get(whole.end() - 1)?;
            if *open != ByteClass::Delimiter || *close != ByteClass::Delimiter {
                return None;
            }
            let name = caps.get(1).or_else(|| caps.get(2))?.as_str();
            is_valid_name(name).then(|| name.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(text: &str) -> SourceUnit {
        SourceUnit::new("Code.gs", UnitKind::BackendModule, text)
    }

    fn def_names(x: &Extraction) -> Vec<&str> {
        x.definitions.iter().map(|d| d.name.as_str()).collect()
    }

    fn refs_of(x: &Extraction, kind: ReferenceKind) -> Vec<&str> {
        x.references
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.name.as_str())
            .collect()
    }

    #[test]
    fn test_definition_forms() {
        let src = r#"
function doGet(e) {
  return render();
}
var render = function () { return 1; };
const fmt = (v) => String(v);
let twice = x => x * 2;
var Api = {
  fetchRows: function (id) { return id; },
  saveRow(row) {
    return row;
  }
};
async function loadAll() {}
"#;
        let x = Extractor::default().try_extract(&backend(src)).unwrap();
        // `Api = {` is a plain object, not a callable.
        assert_eq!(
            def_names(&x),
            vec!["doGet", "render", "fmt", "twice", "fetchRows", "saveRow", "loadAll"]
        );
        let get = &x.definitions[0];
        assert_eq!((get.start_line, get.end_line), (2, 4));
        assert_eq!(get.form, DefinitionForm::Function);
        assert_eq!(x.definitions[2].form, DefinitionForm::BoundCallable);
        assert_eq!(x.definitions[4].form, DefinitionForm::Property);
        assert_eq!(x.definitions[5].form, DefinitionForm::Method);
    }

    #[test]
    fn test_calls_skip_builtins_keywords_and_definitions() {
        let src = "function doGet() {\n  if (ready()) { helper(parseInt('4')); }\n}";
        let x = Extractor::default().try_extract(&backend(src)).unwrap();
        assert_eq!(refs_of(&x, ReferenceKind::Call), vec!["ready", "helper"]);
        assert!(x.references.iter().all(|r| r.scope.as_deref() == Some("doGet")));
    }

    #[test]
    fn test_commented_and_quoted_calls_ignored() {
        let src = "// ghost()\n/* phantom() */\nvar s = \"spooky()\";\nreal();";
        let x = Extractor::default().try_extract(&backend(src)).unwrap();
        assert_eq!(refs_of(&x, ReferenceKind::Call), vec!["real"]);
        assert_eq!(x.references[0].scope, None);
        assert_eq!(x.references[0].line, 4);
    }

    #[test]
    fn test_member_and_value_references_are_soft() {
        let src = "function run() { Utils.fmt(1); rows.map(format); }";
        let x = Extractor::default().try_extract(&backend(src)).unwrap();
        assert_eq!(refs_of(&x, ReferenceKind::Member), vec!["fmt", "map"]);
        assert_eq!(refs_of(&x, ReferenceKind::Value), vec!["format"]);
        assert!(ReferenceKind::Member.is_soft());
        assert!(!ReferenceKind::Bridge.is_soft());
    }

    #[test]
    fn test_bridge_chain_through_modifiers() {
        let html = r#"<script>
function load() {
  google.script.run
    .withSuccessHandler(render)
    .withFailureHandler(function (e) { show(e); })
    .getRows(42);
}
</script>"#;
        let unit = SourceUnit::new("Index.html", UnitKind::FrontendTemplate, html);
        let x = Extractor::default().try_extract(&unit).unwrap();
        assert_eq!(refs_of(&x, ReferenceKind::Bridge), vec!["getRows"]);
        assert!(!refs_of(&x, ReferenceKind::Member).contains(&"getRows"));
        assert!(refs_of(&x, ReferenceKind::Value).contains(&"render"));
        assert_eq!(def_names(&x), vec!["load"]);
    }

    #[test]
    fn test_inclusions_and_triggers() {
        let src = r#"
function doGet() {
  return HtmlService.createTemplateFromFile('Index').evaluate();
}
function install() {
  ScriptApp.newTrigger("nightly").timeBased().everyDays(1).create();
}
"#;
        let x = Extractor::default().try_extract(&backend(src)).unwrap();
        let targets: Vec<&str> = x.inclusions.iter().map(|i| i.target.as_str()).collect();
        assert_eq!(targets, vec!["Index"]);
        assert_eq!(x.inclusions[0].line, 3);
        assert_eq!(x.triggers, vec!["nightly".to_string()]);
        assert!(x.string_mentions.contains("nightly"));
        assert!(x.string_mentions.contains("Index"));
    }

    #[test]
    fn test_template_scriptlet_include() {
        let html = "<html><head><?!= include(\"Styles\"); ?></head><body onload=\"boot()\"></body></html>";
        let unit = SourceUnit::new("Index.html", UnitKind::FrontendTemplate, html);
        let x = Extractor::default().try_extract(&unit).unwrap();
        assert_eq!(x.inclusions[0].target, "Styles");
        assert_eq!(refs_of(&x, ReferenceKind::Call), vec!["include", "boot"]);
    }

    #[test]
    fn test_malformed_unit_is_error_but_extract_is_empty() {
        let unit = backend("function a() {\n  var s = 'open\n}");
        let err = Extractor::default().try_extract(&unit).unwrap_err();
        assert!(matches!(err, DeadscriptError::Extract { line: Some(2), .. }));
        let empty = Extractor::default().extract(&unit);
        assert!(empty.definitions.is_empty());
        assert!(empty.references.is_empty());
    }

    #[test]
    fn test_config_units_are_empty() {
        let unit = SourceUnit::new("appsscript.json", UnitKind::Config, r#"{"a": "doGet()"}"#);
        let x = Extractor::default().try_extract(&unit).unwrap();
        assert!(x.definitions.is_empty() && x.references.is_empty());
    }

    #[test]
    fn test_nested_scope_attribution() {
        let src = "function outer() {\n  function inner() { deep(); }\n  shallow();\n}";
        let x = Extractor::default().try_extract(&backend(src)).unwrap();
        let scope = |n: &str| {
            x.references
                .iter()
                .find(|r| r.name == n)
                .and_then(|r| r.scope.clone())
        };
        assert_eq!(scope("deep").as_deref(), Some("inner"));
        assert_eq!(scope("shallow").as_deref(), Some("outer"));
    }

    #[test]
    fn test_conditional_branch_not_a_definition() {
        let src = "var pick = ok ? handler : function () { return 1; };\nvar api = {\n  load: function () {},\n  save: (r) => r,\n};\n";
        let x = Extractor::default().try_extract(&backend(src)).unwrap();
        assert_eq!(def_names(&x), vec!["load", "save"]);
        assert!(crate::fix::function_span(UnitKind::BackendModule, src, "handler").is_none());
    }

    #[test]
    fn test_dom_handler_assignment_not_a_definition() {
        let src = "window.onload = function () { boot(); };\nUtils.fmt = function (v) { return v; };";
        let x = Extractor::default().try_extract(&backend(src)).unwrap();
        assert_eq!(def_names(&x), vec!["fmt"]);
    }
}
