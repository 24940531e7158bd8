//! Delimiter-aware scanning shared by every directive parser.
//!
//! All delimiters handled here are ASCII, so byte offsets returned by these
//! helpers are always valid `str` slice boundaries.

use std::fmt;

/// An opening delimiter whose matching close never appeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnbalancedDelimiter {
    /// Byte offset of the opening delimiter
    pub open: usize,
    pub delimiter: char,
}

impl UnbalancedDelimiter {
    /// Degraded content: everything after the opening delimiter.
    pub fn rest<'a>(&self, text: &'a str) -> &'a str {
        text.get(self.open + 1..).unwrap_or("")
    }
}

impl fmt::Display for UnbalancedDelimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' at offset {} is never closed", self.delimiter, self.open)
    }
}

fn closing_for(open: u8) -> Option<u8> {
    match open {
        b'(' => Some(b')'),
        b'[' => Some(b']'),
        b'{' => Some(b'}'),
        _ => None,
    }
}

/// Extract the text strictly between the delimiter at `open` and its match.
///
/// Returns the enclosed content and the index just past the closing
/// delimiter. Delimiters inside quoted strings (`'`, `"` or backticks) are ignored,
/// and a backslash-escaped quote does not close its string.
///
/// ```
/// use oneview_compiler::parser::balanced::extract_balanced;
///
/// let (content, next) = extract_balanced("foo(bar(1,2),baz)", 3).unwrap();
/// assert_eq!(content, "bar(1,2),baz");
/// assert_eq!(next, 17);
/// ```
pub fn extract_balanced(text: &str, open: usize) -> Result<(&str, usize), UnbalancedDelimiter> {
    let bytes = text.as_bytes();
    let Some(&open_byte) = bytes.get(open) else {
        return Err(UnbalancedDelimiter { open, delimiter: '(' });
    };
    let Some(close_byte) = closing_for(open_byte) else {
        return Err(UnbalancedDelimiter { open, delimiter: open_byte as char });
    };

    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = open;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
        } else if matches!(b, b'"' | b'\'' | b'`') {
            quote = Some(b);
        } else if b == open_byte {
            depth += 1;
        } else if b == close_byte {
            depth -= 1;
            if depth == 0 {
                return Ok((&text[open + 1..i], i + 1));
            }
        }
        i += 1;
    }

    Err(UnbalancedDelimiter { open, delimiter: open_byte as char })
}

/// Like [`extract_balanced`], but an unterminated delimiter yields the rest of
/// the text. The flag is `false` when that degradation happened.
pub fn extract_balanced_lossy(text: &str, open: usize) -> (&str, usize, bool) {
    match extract_balanced(text, open) {
        Ok((content, next)) => (content, next, true),
        Err(err) => (err.rest(text), text.len(), false),
    }
}

/// Iterator over the byte offsets of `text` that sit at nesting depth zero and
/// outside string literals.
///
/// Opening brackets at depth zero are yielded before descending; closing
/// brackets are yielded once they bring the depth back to zero.
pub struct TopLevel<'a> {
    bytes: &'a [u8],
    pos: usize,
    depth: i32,
    quote: Option<u8>,
}

impl<'a> TopLevel<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { bytes: text.as_bytes(), pos: 0, depth: 0, quote: None }
    }
}

impl Iterator for TopLevel<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.pos < self.bytes.len() {
            let i = self.pos;
            let b = self.bytes[i];
            self.pos += 1;

            if let Some(q) = self.quote {
                if b == b'\\' {
                    self.pos += 1;
                } else if b == q {
                    self.quote = None;
                }
                continue;
            }

            match b {
                b'"' | b'\'' | b'`' => {
                    let at_top = self.depth == 0;
                    self.quote = Some(b);
                    if at_top {
                        return Some(i);
                    }
                }
                b'(' | b'[' | b'{' => {
                    self.depth += 1;
                    if self.depth == 1 {
                        return Some(i);
                    }
                }
                b')' | b']' | b'}' => {
                    self.depth -= 1;
                    if self.depth <= 0 {
                        self.depth = 0;
                        return Some(i);
                    }
                }
                _ => {
                    if self.depth == 0 {
                        return Some(i);
                    }
                }
            }
        }
        None
    }
}

/// Byte offset of the first top-level occurrence of `needle`.
pub fn find_top_level(text: &str, needle: &str) -> Option<usize> {
    let first = *needle.as_bytes().first()?;
    TopLevel::new(text).find(|&i| text.as_bytes()[i] == first && text[i..].starts_with(needle))
}

/// Split on every top-level `sep`, trimming each piece and dropping empties.
pub fn split_top_level(text: &str, sep: u8) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;

    for i in TopLevel::new(text) {
        if bytes[i] == sep {
            parts.push(&text[start..i]);
            start = i + 1;
        }
    }
    parts.push(&text[start..]);

    parts.into_iter().map(str::trim).filter(|p| !p.is_empty()).collect()
}

/// Split a parameter list on top-level commas.
///
/// An empty (or whitespace-only) input yields no parameters at all.
pub fn split_params(text: &str) -> Vec<&str> {
    split_top_level(text, b',')
}

/// True when `text` is one string literal from its first to its last byte.
pub fn is_quoted(text: &str) -> bool {
    let bytes = text.as_bytes();
    if bytes.len() < 2 {
        return false;
    }
    let q = bytes[0];
    if !matches!(q, b'"' | b'\'' | b'`') || bytes[bytes.len() - 1] != q {
        return false;
    }
    // The opening quote must close exactly at the end.
    let mut i = 1;
    while i < bytes.len() - 1 {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == q => return false,
            _ => i += 1,
        }
    }
    i == bytes.len() - 1
}

/// Strip one layer of matching quotes, if present.
pub fn unquote(text: &str) -> &str {
    let text = text.trim();
    if is_quoted(text) { &text[1..text.len() - 1] } else { text }
}

/// True when `text` is entirely wrapped by one balanced pair starting at 0.
pub fn is_wrapped(text: &str, open: u8) -> bool {
    if text.as_bytes().first() != Some(&open) {
        return false;
    }
    matches!(extract_balanced(text, 0), Ok((_, next)) if next == text.len())
}
