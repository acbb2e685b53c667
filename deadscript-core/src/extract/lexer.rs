//! Comment/string-aware byte classifier for script source.
//!
//! Every byte of the input is tagged as code, comment, string delimiter or
//! string body. The same classification backs three consumers:
//! - the `code` view (comments blanked, strings kept) used for string-argument
//!   patterns such as `include("Page")`,
//! - the `neutral` view (comments and string bodies blanked) used for name
//!   matching and delimiter counting,
//! - the brace scanner used when cutting a function out of a file.
//!
//! Views are byte-for-byte the same length as the input and keep every
//! newline, so offsets and line numbers are shared between them.
//!
//! All delimiters are ASCII, so scanning bytes is safe for UTF-8 input:
//! continuation bytes never equal a delimiter.

/// Lexical class of one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteClass {
    Code,
    Comment,
    /// Opening or closing quote of a string, template or regex literal
    Delimiter,
    /// Content of a string, template or regex literal
    Literal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Code,
    LineComment,
    BlockComment,
    Str(u8),
    Regex { in_class: bool },
}

/// An unterminated construct found at end of input or end of line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unterminated {
    pub what: &'static str,
    /// Byte offset where the construct started
    pub offset: usize,
}

/// Keywords after which a `/` starts a regex literal rather than a division.
const REGEX_PRECEDING_WORDS: &[&str] = &[
    "return", "typeof", "case", "do", "else", "in", "of", "void", "yield", "delete", "throw",
    "new", "instanceof",
];

#[inline]
fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

fn preceded_by_keyword(bytes: &[u8], p: usize) -> bool {
    let mut start = p;
    while start > 0 && is_ident_byte(bytes[start - 1]) {
        start -= 1;
    }
    let word = &bytes[start..=p];
    REGEX_PRECEDING_WORDS.iter().any(|w| w.as_bytes() == word)
}

/// Decides whether a `/` at the current position opens a regex literal,
/// given the last significant code byte before it. `closed_expression`
/// tells whether that byte is a `}` ending an object literal.
fn regex_allowed(bytes: &[u8], prev_sig: Option<usize>, closed_expression: bool) -> bool {
    let Some(p) = prev_sig else {
        return true;
    };
    let b = bytes[p];
    if b == b'}' {
        return !closed_expression;
    }
    if b"(,=:[!&|?{;+-*%<>~^".contains(&b) {
        return true;
    }
    is_ident_byte(b) && preceded_by_keyword(bytes, p)
}

/// Whether a `{` after `prev_sig` starts an object literal rather than a
/// block. An arrow body (`=> {`) is a block.
fn opens_expression(bytes: &[u8], prev_sig: Option<usize>) -> bool {
    let Some(p) = prev_sig else {
        return false;
    };
    match bytes[p] {
        b'>' => p == 0 || bytes[p - 1] != b'=',
        b if b"(,=:[!&|?+-*%<~^".contains(&b) => true,
        b if is_ident_byte(b) => preceded_by_keyword(bytes, p),
        _ => false,
    }
}

/// Classifies every byte of `text`.
///
/// Returns the per-byte classes and, if the input ends inside a block
/// comment, string or regex literal (or a quoted string runs into a
/// newline), the first such construct.
pub fn classify(text: &str) -> (Vec<ByteClass>, Option<Unterminated>) {
    let bytes = text.as_bytes();
    let mut classes = vec![ByteClass::Code; bytes.len()];
    let mut state = State::Code;
    let mut escaped = false;
    let mut prev_sig: Option<usize> = None;
    // One entry per open code `{`: true when it opened an object literal.
    let mut braces: Vec<bool> = Vec::new();
    let mut closed_expression = false;
    let mut opened_at = 0usize;
    let mut unterminated: Option<Unterminated> = None;

    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();

        match state {
            State::Code => {
                if b == b'/' && next == Some(b'/') {
                    classes[i] = ByteClass::Comment;
                    classes[i + 1] = ByteClass::Comment;
                    state = State::LineComment;
                    i += 2;
                    continue;
                }
                if b == b'/' && next == Some(b'*') {
                    classes[i] = ByteClass::Comment;
                    classes[i + 1] = ByteClass::Comment;
                    state = State::BlockComment;
                    opened_at = i;
                    i += 2;
                    continue;
                }
                if b == b'\'' || b == b'"' || b == b'`' {
                    classes[i] = ByteClass::Delimiter;
                    state = State::Str(b);
                    opened_at = i;
                    escaped = false;
                } else if b == b'/' && regex_allowed(bytes, prev_sig, closed_expression) {
                    classes[i] = ByteClass::Delimiter;
                    state = State::Regex { in_class: false };
                    opened_at = i;
                    escaped = false;
                } else if !b.is_ascii_whitespace() {
                    match b {
                        b'{' => braces.push(opens_expression(bytes, prev_sig)),
                        b'}' => closed_expression = braces.pop().unwrap_or(false),
                        _ => {}
                    }
                    prev_sig = Some(i);
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Code;
                } else {
                    classes[i] = ByteClass::Comment;
                }
            }
            State::BlockComment => {
                classes[i] = ByteClass::Comment;
                if b == b'*' && next == Some(b'/') {
                    classes[i + 1] = ByteClass::Comment;
                    state = State::Code;
                    i += 2;
                    continue;
                }
            }
            State::Str(quote) => {
                if escaped {
                    classes[i] = ByteClass::Literal;
                    escaped = false;
                } else if b == b'\\' {
                    classes[i] = ByteClass::Literal;
                    escaped = true;
                } else if b == quote {
                    classes[i] = ByteClass::Delimiter;
                    state = State::Code;
                    prev_sig = Some(i);
                } else if b == b'\n' && quote != b'`' {
                    // A plain string cannot span lines; recover at the newline.
                    unterminated.get_or_insert(Unterminated {
                        what: "string literal",
                        offset: opened_at,
                    });
                    state = State::Code;
                } else {
                    classes[i] = ByteClass::Literal;
                }
            }
            State::Regex { in_class } => {
                if escaped {
                    classes[i] = ByteClass::Literal;
                    escaped = false;
                } else if b == b'\\' {
                    classes[i] = ByteClass::Literal;
                    escaped = true;
                } else if b == b'\n' {
                    unterminated.get_or_insert(Unterminated {
                        what: "regex literal",
                        offset: opened_at,
                    });
                    state = State::Code;
                } else if b == b'/' && !in_class {
                    classes[i] = ByteClass::Delimiter;
                    state = State::Code;
                    prev_sig = Some(i);
                } else {
                    classes[i] = ByteClass::Literal;
                    if b == b'[' {
                        state = State::Regex { in_class: true };
                    } else if b == b']' {
                        state = State::Regex { in_class: false };
                    }
                }
            }
        }
        i += 1;
    }

    let what = match state {
        State::BlockComment => Some("block comment"),
        State::Str(_) => Some("string literal"),
        State::Regex { .. } => Some("regex literal"),
        _ => None,
    };
    if let Some(what) = what {
        unterminated.get_or_insert(Unterminated {
            what,
            offset: opened_at,
        });
    }

    (classes, unterminated)
}

/// Builds a view of `text` where bytes for which `blank` returns true are
/// replaced by spaces. Newlines always survive.
fn blanked(text: &str, classes: &[ByteClass], blank: impl Fn(ByteClass) -> bool) -> String {
    // All bytes of one char share a class, so the result stays valid UTF-8.
    let buf: Vec<u8> = text
        .bytes()
        .zip(classes.iter())
        .map(|(b, &c)| if b != b'\n' && blank(c) { b' ' } else { b })
        .collect();
    String::from_utf8_lossy(&buf).into_owned()
}

/// Two aligned views of one source text.
#[derive(Debug, Clone)]
pub struct Views {
    /// Comments blanked, strings intact
    pub code: String,
    /// Comments and literal bodies blanked
    pub neutral: String,
    pub classes: Vec<ByteClass>,
}

/// Lexes `text` and builds both views. Fails on unterminated constructs.
pub fn views(text: &str) -> Result<Views, Unterminated> {
    let (classes, unterminated) = classify(text);
    if let Some(u) = unterminated {
        return Err(u);
    }
    Ok(Views {
        code: blanked(text, &classes, |c| c == ByteClass::Comment),
        neutral: blanked(text, &classes, |c| {
            matches!(c, ByteClass::Comment | ByteClass::Literal)
        }),
        classes,
    })
}

/// Finds the `}` matching the `{` at `open`, counting only code bytes.
///
/// Returns `None` if `open` is not a code `{` or the braces never balance.
pub fn matching_brace(text: &str, classes: &[ByteClass], open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(open) != Some(&b'{') || classes.get(open) != Some(&ByteClass::Code) {
        return None;
    }
    let mut depth = 0usize;
    for i in open..bytes.len() {
        if classes[i] != ByteClass::Code {
            continue;
        }
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Byte offsets where each line starts.
pub fn line_starts(text: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(text.match_indices('\n').map(|(i, _)| i + 1))
        .collect()
}

/// 1-based line number of a byte offset.
pub fn line_of(starts: &[usize], offset: usize) -> usize {
    match starts.binary_search(&offset) {
        Ok(idx) => idx + 1,
        Err(idx) => idx,
    }
}
