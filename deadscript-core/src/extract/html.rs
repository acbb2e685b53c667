//! Script regions of an HTML template.
//!
//! Templates are analysed as script only where script actually runs:
//! `<script>` element bodies, `<? ?>` scriptlets and inline `on*=` event
//! handler attribute values. Everything else is replaced by spaces
//! (newlines kept), so offsets into the masked text are offsets into the
//! original file.

use regex::Regex;
use std::sync::OnceLock;

fn script_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<script\b[^>]*>(.*?)</script\s*>").expect("Hardcoded regex pattern is valid")
    })
}

fn scriptlet_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<\?(.*?)\?>").expect("Hardcoded regex pattern is valid"))
}

fn handler_attr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\son[a-z]+\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .expect("Hardcoded regex pattern is valid")
    })
}

/// Returns `html` with everything outside script regions blanked.
pub fn mask_markup(html: &str) -> String {
    let mut keep: Vec<(usize, usize)> = Vec::new();

    for caps in script_block_regex().captures_iter(html) {
        if let Some(body) = caps.get(1) {
            keep.push((body.start(), body.end()));
        }
    }
    for caps in scriptlet_regex().captures_iter(html) {
        if let Some(body) = caps.get(1) {
            // `<?= expr ?>` and `<?!= expr ?>` print; drop the marker so the
            // expression lexes as a statement.
            let text = body.as_str();
            let skip = if text.starts_with("!=") {
                2
            } else if text.starts_with('=') {
                1
            } else {
                0
            };
            keep.push((body.start() + skip, body.end()));
        }
    }
    for caps in handler_attr_regex().captures_iter(html) {
        if let Some(value) = caps.get(1).or_else(|| caps.get(2)) {
            keep.push((value.start(), value.end()));
        }
    }

    let src = html.as_bytes();
    let mut out: Vec<u8> = src
        .iter()
        .map(|&b| if b == b'\n' { b'\n' } else { b' ' })
        .collect();
    for (start, end) in keep {
        out[start..end].copy_from_slice(&src[start..end]);
    }
    // Ranges start and end on ASCII delimiters, so char boundaries survive.
    String::from_utf8_lossy(&out).into_owned()
}
