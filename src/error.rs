use crate::parser::tokenizer::Span;
use std::fmt;

/// Kind of compile diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ErrorKind {
    UnbalancedDelimiter,
    MismatchedClose,
    UnterminatedBlock,
    UnknownDirective,
    AmbiguousHandlerClassification,
    MalformedMetaPayload,
    MisplacedBranch,
    DuplicateSection,
    NestingTooDeep,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnbalancedDelimiter => "Unbalanced delimiter",
            ErrorKind::MismatchedClose => "Mismatched close",
            ErrorKind::UnterminatedBlock => "Unterminated block",
            ErrorKind::UnknownDirective => "Unknown directive",
            ErrorKind::AmbiguousHandlerClassification => "Ambiguous handler classification",
            ErrorKind::MalformedMetaPayload => "Malformed meta payload",
            ErrorKind::MisplacedBranch => "Misplaced branch",
            ErrorKind::DuplicateSection => "Duplicate section",
            ErrorKind::NestingTooDeep => "Nesting too deep",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Aborts the compile of this view
    Error,
    /// Recorded, compile continues with a degraded emission
    Warning,
}

/// A problem found while compiling one view
#[derive(Debug, Clone, serde::Serialize)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    #[serde(skip)]
    pub span: Span,
    /// Directive the diagnostic is about, without the `@`
    pub directive: Option<String>,
    #[serde(skip)]
    pub related_span: Option<Span>,
    pub related_label: Option<String>,
    pub help: Option<String>,
}

impl Diagnostic {
    /// Create a new error diagnostic
    pub fn new(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            message: message.into(),
            span,
            directive: None,
            related_span: None,
            related_label: None,
            help: None,
        }
    }

    /// Create a warning: the compile keeps going
    pub fn warning(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self { severity: Severity::Warning, ..Self::new(kind, message, span) }
    }

    /// Name the directive this diagnostic is about
    pub fn with_directive(mut self, name: impl Into<String>) -> Self {
        self.directive = Some(name.into());
        self
    }

    /// Add a related span (e.g. where the block was opened)
    pub fn with_related(mut self, span: Span) -> Self {
        self.related_span = Some(span);
        self
    }

    /// Set the label for the related span
    pub fn with_related_label(mut self, label: impl Into<String>) -> Self {
        self.related_label = Some(label.into());
        self
    }

    /// Add help text
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Downgrade to a warning (lenient mode)
    pub fn into_warning(mut self) -> Self {
        self.severity = Severity::Warning;
        self
    }

    /// Render the diagnostic with source context
    pub fn render(&self, source: &str, filename: &str) -> String {
        self.render_inner(source, filename, false)
    }

    /// Render the diagnostic with ANSI color codes
    pub fn render_color(&self, source: &str, filename: &str) -> String {
        self.render_inner(source, filename, true)
    }

    fn render_inner(&self, source: &str, filename: &str, color: bool) -> String {
        let label_color = match (color, self.severity) {
            (false, _) => "",
            (true, Severity::Error) => "\x1b[1;31m",
            (true, Severity::Warning) => "\x1b[1;33m",
        };
        let dim = if color { "\x1b[2m" } else { "" };
        let cyan = if color { "\x1b[1;38;5;73m" } else { "" };
        let reset = if color { "\x1b[0m" } else { "" };
        let label = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };

        let mut output = String::new();
        output.push('\n');

        let loc_span = self.related_span.as_ref().unwrap_or(&self.span);
        output.push_str(&format!(
            " {}file:{} {}:{}:{}\n",
            dim,
            reset,
            filename,
            loc_span.start.line + 1,
            loc_span.start.col + 1
        ));

        let message = if color { highlight_inline_code(&self.message) } else { self.message.clone() };
        output.push_str(&format!("{}{}:{} {}\n", label_color, label, reset, message));

        let err_line = self.span.start.line + 1;
        if let Some(source_line) = source.lines().nth(self.span.start.line) {
            let width = format!("{}", err_line).len().max(2);
            let shown = if color { highlight_source(source_line) } else { source_line.to_string() };
            output.push_str(&format!("{}{:>width$} |{}\n", dim, "", reset, width = width));
            output.push_str(&format!("{}{:>width$} |{} {}\n", dim, err_line, reset, shown, width = width));
            output.push_str(&format!(
                "{}{:>width$} |{} {}{}{}{}\n",
                dim,
                "",
                reset,
                " ".repeat(self.span.start.col),
                label_color,
                "^".repeat(underline_len(&self.span, source_line)),
                reset,
                width = width
            ));
        }

        if let Some(ref related) = self.related_span {
            let related_line = related.start.line + 1;
            if let Some(related_source) = source.lines().nth(related.start.line) {
                let width = format!("{}", related_line).len().max(2);
                let shown = if color { highlight_source(related_source) } else { related_source.to_string() };
                output.push_str(&format!("{}{:>width$} |{} {}\n", dim, related_line, reset, shown, width = width));
                output.push_str(&format!(
                    "{}{:>width$} |{} {}{}{} {}{}\n",
                    dim,
                    "",
                    reset,
                    " ".repeat(related.start.col),
                    dim,
                    "^".repeat(underline_len(related, related_source)),
                    self.related_label.as_deref().unwrap_or("opened here"),
                    reset,
                    width = width
                ));
            }
        }

        if let Some(ref help) = self.help {
            output.push('\n');
            for (i, help_line) in help.lines().enumerate() {
                let content = if color { highlight_inline_code(help_line) } else { help_line.to_string() };
                if i == 0 {
                    output.push_str(&format!(" {}help:{} {}\n", cyan, reset, content));
                } else {
                    output.push_str(&format!("       {}\n", content));
                }
            }
        }

        output.push('\n');
        output
    }
}

fn underline_len(span: &Span, line: &str) -> usize {
    if span.end.line == span.start.line {
        span.end.col.saturating_sub(span.start.col).max(1)
    } else {
        line.chars().count().saturating_sub(span.start.col).max(1)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Diagnostic {}

/// Error returned when a view (or the CLI around it) cannot be compiled
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// The block structure of the view cannot be resolved
    #[error("{0}")]
    Structure(Diagnostic),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl CompileError {
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            CompileError::Structure(diag) => Some(diag),
            _ => None,
        }
    }

    /// Render the error with source context (no color)
    pub fn render(&self, source: &str, filename: &str) -> String {
        match self {
            CompileError::Structure(diag) => diag.render(source, filename),
            other => format!("error: {}\n", other),
        }
    }

    /// Render the error with ANSI color codes
    pub fn render_color(&self, source: &str, filename: &str) -> String {
        match self {
            CompileError::Structure(diag) => diag.render_color(source, filename),
            other => format!("\x1b[1;31merror\x1b[0m: \x1b[1m{}\x1b[0m\n", other),
        }
    }
}

impl From<Diagnostic> for CompileError {
    fn from(diag: Diagnostic) -> Self {
        CompileError::Structure(diag)
    }
}

/// Render 'quoted' code in prose as `code`
fn highlight_inline_code(text: &str) -> String {
    const CODE: &str = "\x1b[38;5;173m";
    const RESET: &str = "\x1b[0m";

    let mut result = String::with_capacity(text.len() * 2);
    let mut rest = text;
    while let Some(start) = rest.find('\'') {
        let after = &rest[start + 1..];
        match after.find('\'') {
            Some(end) if end > 0 => {
                result.push_str(&rest[..start]);
                result.push_str(CODE);
                result.push('`');
                result.push_str(&after[..end]);
                result.push('`');
                result.push_str(RESET);
                rest = &after[end + 1..];
            }
            _ => {
                result.push_str(&rest[..=start]);
                rest = after;
            }
        }
    }
    result.push_str(rest);
    result
}

/// Syntax highlighting for source context lines: directives, echoes and strings
fn highlight_source(line: &str) -> String {
    const DIRECTIVE: &str = "\x1b[38;5;173m";
    const ECHO: &str = "\x1b[38;5;72m";
    const STRING: &str = "\x1b[38;5;72m";
    const RESET: &str = "\x1b[0m";

    let chars: Vec<char> = line.chars().collect();
    let mut result = String::with_capacity(line.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let prev_is_word = i > 0 && (chars[i - 1].is_alphanumeric() || chars[i - 1] == '_');

        if c == '@' && !prev_is_word && chars.get(i + 1).is_some_and(|n| n.is_alphabetic()) {
            result.push_str(DIRECTIVE);
            result.push('@');
            i += 1;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                result.push(chars[i]);
                i += 1;
            }
            result.push_str(RESET);
            continue;
        }

        if (c == '{' && chars.get(i + 1) == Some(&'{')) || (c == '}' && chars.get(i + 1) == Some(&'}')) {
            result.push_str(ECHO);
            result.push(c);
            result.push(c);
            result.push_str(RESET);
            i += 2;
            continue;
        }

        if c == '"' || c == '\'' {
            result.push_str(STRING);
            result.push(c);
            i += 1;
            while i < chars.len() && chars[i] != c {
                if chars[i] == '\\' && i + 1 < chars.len() {
                    result.push(chars[i]);
                    i += 1;
                }
                result.push(chars[i]);
                i += 1;
            }
            if i < chars.len() {
                result.push(c);
                i += 1;
            }
            result.push_str(RESET);
            continue;
        }

        result.push(c);
        i += 1;
    }

    result
}
