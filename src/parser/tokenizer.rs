use super::balanced::extract_balanced;
use super::directives::{self, DirectiveKind, RawKind};
use crate::error::{Diagnostic, ErrorKind};
use tracing::trace;

/// Position in source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    /// Byte offset in source
    pub byte: usize,
    /// Line number (0-indexed)
    pub line: usize,
    /// Column number (0-indexed, in characters)
    pub col: usize,
}

impl Position {
    pub fn new() -> Self {
        Self { byte: 0, line: 0, col: 0 }
    }
}

/// Span in source code (a range from start position to end position)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

/// Tokens produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Literal markup, already unescaped (`@@x` becomes `@x`)
    Text { text: String, span: Span },
    /// `{{ code }}` (escaped) or `{!! code !!}` (raw)
    Echo { code: String, escaped: bool, span: Span },
    /// A registered `@name(args)` directive
    Directive {
        /// Canonical name
        name: &'static str,
        /// Spelling used in the source
        raw_name: String,
        kind: DirectiveKind,
        args: Option<String>,
        span: Span,
    },
    /// `@verbatim`, `@php`, `@register` or `@oninit` with its body taken as-is
    RawBlock { kind: RawKind, content: String, span: Span },
}

impl Token {
    pub fn span(&self) -> Span {
        match self {
            Token::Text { span, .. } => *span,
            Token::Echo { span, .. } => *span,
            Token::Directive { span, .. } => *span,
            Token::RawBlock { span, .. } => *span,
        }
    }
}

/// Token stream plus the non-fatal problems found while scanning
#[derive(Debug, Clone, Default)]
pub struct Tokenized {
    pub tokens: Vec<Token>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Maps byte offsets to line/column positions
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    fn position(&self, source: &str, byte: usize) -> Position {
        let line = self.starts.partition_point(|&s| s <= byte).saturating_sub(1);
        let line_start = self.starts[line];
        let col = source.get(line_start..byte).map_or(0, |s| s.chars().count());
        Position { byte, line, col }
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

struct Tokenizer<'a> {
    source: &'a str,
    lower: String,
    lines: LineIndex,
    pos: usize,
    text: String,
    text_start: usize,
    out: Tokenized,
}

impl<'a> Tokenizer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            lower: source.to_ascii_lowercase(),
            lines: LineIndex::new(source),
            pos: 0,
            text: String::new(),
            text_start: 0,
            out: Tokenized::default(),
        }
    }

    fn span(&self, start: usize, end: usize) -> Span {
        Span {
            start: self.lines.position(self.source, start),
            end: self.lines.position(self.source, end),
        }
    }

    fn push_text(&mut self, text: &str) {
        if self.text.is_empty() {
            self.text_start = self.pos;
        }
        self.text.push_str(text);
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            let span = self.span(self.text_start, self.pos);
            let text = std::mem::take(&mut self.text);
            self.out.tokens.push(Token::Text { text, span });
        }
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn tokenize(mut self) -> Tokenized {
        while self.pos < self.source.len() {
            let rest = self.rest();
            if rest.starts_with("{{--") {
                self.comment();
            } else if rest.starts_with("{!!") {
                self.echo("{!!", "!!}", false);
            } else if rest.starts_with("{{") {
                self.echo("{{", "}}", true);
            } else if rest.starts_with('@') {
                self.at_sign();
            } else {
                let len = rest.chars().next().map_or(1, char::len_utf8);
                let (start, end) = (self.pos, self.pos + len);
                self.push_text(&self.source[start..end]);
                self.pos = end;
            }
        }
        self.flush_text();
        self.out
    }

    fn comment(&mut self) {
        match self.rest().find("--}}") {
            Some(end) => {
                self.flush_text();
                self.pos += end + 4;
            }
            None => {
                let span = self.span(self.pos, self.pos + 4);
                self.out.diagnostics.push(Diagnostic::warning(
                    ErrorKind::UnbalancedDelimiter,
                    "comment '{{--' is never closed",
                    span,
                ));
                self.push_text("{{--");
                self.pos += 4;
            }
        }
    }

    fn echo(&mut self, open: &str, close: &str, escaped: bool) {
        let start = self.pos;
        let body_start = start + open.len();
        match self.source[body_start..].find(close) {
            Some(len) => {
                self.flush_text();
                let end = body_start + len + close.len();
                let code = self.source[body_start..body_start + len].trim().to_string();
                let span = self.span(start, end);
                self.out.tokens.push(Token::Echo { code, escaped, span });
                self.pos = end;
            }
            None => {
                let span = self.span(start, body_start);
                self.out.diagnostics.push(Diagnostic::warning(
                    ErrorKind::UnbalancedDelimiter,
                    format!("'{}' is never closed by '{}'", open, close),
                    span,
                ));
                self.push_text(open);
                self.pos = body_start;
            }
        }
    }

    fn at_sign(&mut self) {
        let bytes = self.source.as_bytes();
        let start = self.pos;
        let prev = start.checked_sub(1).map(|i| bytes[i]);

        if prev.is_some_and(|b| is_ident_char(b) || b == b'.' || b == b'@') {
            self.push_text("@");
            self.pos += 1;
            return;
        }

        // @@name -> literal @name
        if bytes.get(start + 1) == Some(&b'@') && bytes.get(start + 2).is_some_and(|&b| is_ident_start(b)) {
            let name_end = self.ident_end(start + 2);
            let literal = format!("@{}", &self.source[start + 2..name_end]);
            self.push_text(&literal);
            self.pos = name_end;
            return;
        }

        // @{{ x }} -> literal {{ x }}
        if self.source[start + 1..].starts_with("{{") {
            let end = self.source[start + 3..].find("}}").map_or(self.source.len(), |i| start + 3 + i + 2);
            let literal = &self.source[start + 1..end];
            self.push_text(literal);
            self.pos = end;
            return;
        }

        if !bytes.get(start + 1).is_some_and(|&b| is_ident_start(b)) {
            self.push_text("@");
            self.pos += 1;
            return;
        }

        let name_end = self.ident_end(start + 1);
        let raw_name = &self.source[start + 1..name_end];

        let Some(spec) = directives::lookup(raw_name) else {
            trace!(directive = raw_name, "unknown directive passed through");
            let span = self.span(start, name_end);
            self.out.diagnostics.push(
                Diagnostic::warning(ErrorKind::UnknownDirective, format!("unknown directive '@{}'", raw_name), span)
                    .with_directive(raw_name),
            );
            let literal = &self.source[start..name_end];
            self.push_text(literal);
            self.pos = name_end;
            return;
        };

        self.flush_text();
        let (args, end) = self.directive_args(name_end, raw_name);

        if let DirectiveKind::Raw(kind) = spec.kind
            && !(args.is_some() && kind.accepts_inline_args())
        {
            self.raw_block(kind, start, end);
            return;
        }

        let span = self.span(start, end);
        self.out.tokens.push(Token::Directive {
            name: spec.name,
            raw_name: raw_name.to_string(),
            kind: spec.kind,
            args,
            span,
        });
        self.pos = end;
    }

    fn ident_end(&self, from: usize) -> usize {
        let bytes = self.source.as_bytes();
        let mut end = from;
        while end < bytes.len() && is_ident_char(bytes[end]) {
            end += 1;
        }
        end
    }

    /// Parse an optional `( ... )` after a directive name. Returns the args
    /// and the offset just past the directive.
    fn directive_args(&mut self, name_end: usize, raw_name: &str) -> (Option<String>, usize) {
        let bytes = self.source.as_bytes();
        let mut open = name_end;
        while open < bytes.len() && matches!(bytes[open], b' ' | b'\t') {
            open += 1;
        }
        if bytes.get(open) != Some(&b'(') {
            return (None, name_end);
        }

        match extract_balanced(self.source, open) {
            Ok((content, next)) => (Some(content.to_string()), next),
            Err(err) => {
                let span = self.span(open, open + 1);
                self.out.diagnostics.push(
                    Diagnostic::warning(
                        ErrorKind::UnbalancedDelimiter,
                        format!("arguments of '@{}' are never closed", raw_name),
                        span,
                    )
                    .with_directive(raw_name)
                    .with_help("The rest of the template was used as the argument list"),
                );
                (Some(err.rest(self.source).to_string()), self.source.len())
            }
        }
    }

    fn raw_block(&mut self, kind: RawKind, start: usize, body_start: usize) {
        let closer = format!("@{}", kind.closer_name());
        let bytes = self.source.as_bytes();
        let mut search = body_start;
        let found = loop {
            match self.lower[search..].find(&closer) {
                Some(i) => {
                    let at = search + i;
                    let after = at + closer.len();
                    if bytes.get(after).is_some_and(|&b| is_ident_char(b)) {
                        search = after;
                        continue;
                    }
                    break Some(at);
                }
                None => break None,
            }
        };

        let (content_end, end) = match found {
            Some(at) => (at, at + closer.len()),
            None => {
                let span = self.span(start, body_start);
                let name = &self.source[start + 1..self.ident_end(start + 1)];
                self.out.diagnostics.push(
                    Diagnostic::new(ErrorKind::UnterminatedBlock, format!("'@{}' is never closed", name), span)
                        .with_directive(name)
                        .with_help(format!("Close the block with '{}'", closer)),
                );
                (self.source.len(), self.source.len())
            }
        };

        let content = self.source[body_start..content_end].to_string();
        let span = self.span(start, end);
        self.out.tokens.push(Token::RawBlock { kind, content, span });
        self.pos = end;
    }
}

/// Split template source into text, echo and directive tokens
pub fn tokenize(source: &str) -> Tokenized {
    Tokenizer::new(source).tokenize()
}
