use super::balanced::{split_params, unquote};
use super::directives::{BlockKind, Branch, DirectiveKind, RawKind};
use super::tokenizer::{Position, Span, Token};
use crate::ast::*;
use crate::error::{CompileError, Diagnostic, ErrorKind};
use std::sync::Arc;
use tracing::debug;

/// Open blocks allowed at once; deeper input is rejected in both modes
const MAX_BLOCK_DEPTH: usize = 128;

/// One arm of an open block: the directive that started it and what it holds so far
#[derive(Debug)]
struct Segment {
    branch: Option<Branch>,
    params: Option<String>,
    span: Span,
    body: Vec<Node>,
    breaks: bool,
}

/// An open block directive waiting for its closer
#[derive(Debug)]
struct BlockFrame {
    kind: BlockKind,
    raw_name: String,
    open_span: Span,
    segments: Vec<Segment>,
}

impl BlockFrame {
    fn current(&mut self) -> &mut Segment {
        // A frame always has its opening segment.
        let last = self.segments.len() - 1;
        &mut self.segments[last]
    }
}

/// Builds the directive tree from a token stream with one explicit block stack
pub struct TreeBuilder {
    tokens: Vec<Token>,
    source: Arc<str>,
    strict: bool,
    stack: Vec<BlockFrame>,
    root: Vec<Node>,
}

impl TreeBuilder {
    pub fn new(tokens: Vec<Token>, source: Arc<str>, strict: bool) -> Self {
        Self { tokens, source, strict, stack: Vec::new(), root: Vec::new() }
    }

    pub fn build(mut self, diagnostics: &mut Vec<Diagnostic>) -> Result<Vec<Node>, CompileError> {
        let tokens = std::mem::take(&mut self.tokens);
        for token in tokens {
            self.consume(token, diagnostics)?;
        }
        self.finish(diagnostics)?;
        Ok(self.root)
    }

    /// Strict mode turns a structural problem into an error; lenient records it.
    fn structural(&self, diag: Diagnostic, diagnostics: &mut Vec<Diagnostic>) -> Result<(), CompileError> {
        if self.strict {
            return Err(CompileError::Structure(diag));
        }
        debug!(kind = diag.kind.as_str(), "{}", diag.message);
        diagnostics.push(diag.into_warning());
        Ok(())
    }

    fn push_node(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some(frame) => frame.current().body.push(node),
            None => self.root.push(node),
        }
    }

    fn consume(&mut self, token: Token, diagnostics: &mut Vec<Diagnostic>) -> Result<(), CompileError> {
        match token {
            Token::Text { text, span } => {
                self.push_node(Node::Text(TextNode { content: text, span }));
            }
            Token::Echo { code, escaped, span } => {
                self.push_node(Node::Echo(EchoNode { expr: code, escaped, span }));
            }
            Token::RawBlock { kind, content, span } => match kind {
                RawKind::Verbatim => self.push_node(Node::Text(TextNode { content, span })),
                RawKind::Php => self.push_node(Node::Php(PhpNode { code: content, span })),
                // Meta payloads are lifted out before the tree is built.
                RawKind::Register | RawKind::OnInit => {}
            },
            Token::Directive { kind, raw_name, args, span, .. } => match kind {
                DirectiveKind::Open(block) => self.open(block, raw_name, args, span)?,
                DirectiveKind::Branch(branch) => self.branch(branch, &raw_name, args, span, diagnostics)?,
                DirectiveKind::Close(block) => self.close(block, &raw_name, span, diagnostics)?,
                DirectiveKind::Inline(inline) => {
                    self.push_node(Node::Inline(InlineNode { kind: inline, args, span }));
                }
                DirectiveKind::Event(event) => {
                    self.push_node(Node::Event(EventNode { event, args: args.unwrap_or_default(), span }));
                }
                DirectiveKind::Raw(RawKind::Php) => {
                    self.push_node(Node::Php(PhpNode { code: args.unwrap_or_default(), span }));
                }
                DirectiveKind::Raw(_) | DirectiveKind::Meta(_) => {}
            },
        }
        Ok(())
    }

    fn open(&mut self, kind: BlockKind, raw_name: String, params: Option<String>, span: Span) -> Result<(), CompileError> {
        // `@section('name', value)` is complete on its own.
        if kind == BlockKind::Section
            && let Some(args) = params.as_deref()
        {
            let parts = split_params(args);
            if parts.len() >= 2 {
                let name = unquote(parts[0]).to_string();
                let value = parts[1..].join(", ");
                self.push_node(Node::Section(SectionNode { name, content: SectionContent::Short(value), span }));
                return Ok(());
            }
        }

        if self.stack.len() >= MAX_BLOCK_DEPTH {
            let mut diag = Diagnostic::new(
                ErrorKind::NestingTooDeep,
                format!("'@{}' opens more than {} nested blocks", raw_name, MAX_BLOCK_DEPTH),
                span,
            )
            .with_directive(kind.name())
            .with_help("Split the template into smaller views or blocks");
            if let Some(outer) = self.stack.first() {
                diag = diag.with_related(outer.open_span).with_related_label("outermost block opened here");
            }
            return Err(CompileError::Structure(diag));
        }

        self.stack.push(BlockFrame {
            kind,
            raw_name,
            open_span: span,
            segments: vec![Segment { branch: None, params, span, body: Vec::new(), breaks: false }],
        });
        Ok(())
    }

    fn branch(
        &mut self,
        branch: Branch,
        raw_name: &str,
        params: Option<String>,
        span: Span,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<(), CompileError> {
        let Some(frame) = self.stack.last_mut() else {
            return self.misplaced(branch, raw_name, span, None, diagnostics);
        };

        match branch {
            Branch::ElseIf | Branch::Else if frame.kind.is_conditional() => {
                if frame.current().branch == Some(Branch::Else) {
                    let open_span = frame.open_span;
                    return self.misplaced(branch, raw_name, span, Some(open_span), diagnostics);
                }
                frame.segments.push(Segment { branch: Some(branch), params, span, body: Vec::new(), breaks: false });
                Ok(())
            }
            Branch::Case | Branch::Default if frame.kind == BlockKind::Switch => {
                frame.segments.push(Segment { branch: Some(branch), params, span, body: Vec::new(), breaks: false });
                Ok(())
            }
            Branch::Break if frame.kind == BlockKind::Switch => {
                frame.current().breaks = true;
                Ok(())
            }
            Branch::Break => {
                diagnostics.push(
                    Diagnostic::warning(ErrorKind::MisplacedBranch, "'@break' outside '@switch' was dropped", span)
                        .with_directive("break"),
                );
                Ok(())
            }
            _ => {
                let open_span = frame.open_span;
                self.misplaced(branch, raw_name, span, Some(open_span), diagnostics)
            }
        }
    }

    fn misplaced(
        &self,
        branch: Branch,
        raw_name: &str,
        span: Span,
        open_span: Option<Span>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<(), CompileError> {
        let expected = match branch {
            Branch::ElseIf | Branch::Else => "'@if'",
            _ => "'@switch'",
        };
        let message = match self.stack.last() {
            Some(frame) => format!("'@{}' cannot appear inside '@{}'", raw_name, frame.raw_name),
            None => format!("'@{}' appears outside of any block", raw_name),
        };
        let mut diag = Diagnostic::new(ErrorKind::MisplacedBranch, message, span)
            .with_directive(branch.name())
            .with_help(format!("'@{}' belongs directly inside {}", branch.name(), expected));
        if let Some(open) = open_span {
            diag = diag.with_related(open).with_related_label("enclosing block opened here");
        }
        self.structural(diag, diagnostics)
    }

    fn close(
        &mut self,
        kind: BlockKind,
        raw_name: &str,
        span: Span,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<(), CompileError> {
        match self.stack.last() {
            Some(frame) if frame.kind.closed_by(kind) => {
                if let Some(frame) = self.stack.pop() {
                    let node = self.finish_frame(frame, span, diagnostics);
                    self.push_node(node);
                }
                Ok(())
            }
            Some(frame) => {
                let diag = Diagnostic::new(
                    ErrorKind::MismatchedClose,
                    format!("'@{}' does not close the open '@{}' block", raw_name, frame.raw_name),
                    span,
                )
                .with_directive(frame.kind.name())
                .with_related(frame.open_span)
                .with_related_label(format!("'@{}' opened here", frame.raw_name))
                .with_help(format!("Close the block with '@{}'", frame.kind.closer_name()));
                self.structural(diag, diagnostics)
            }
            None => {
                let diag = Diagnostic::new(
                    ErrorKind::MismatchedClose,
                    format!("'@{}' has no open '@{}' block to close", raw_name, kind.name()),
                    span,
                )
                .with_directive(kind.name());
                self.structural(diag, diagnostics)
            }
        }
    }

    fn finish(&mut self, diagnostics: &mut Vec<Diagnostic>) -> Result<(), CompileError> {
        let eof = self.eof_span();
        while let Some(frame) = self.stack.pop() {
            let diag = Diagnostic::new(
                ErrorKind::UnterminatedBlock,
                format!("'@{}' block is never closed", frame.raw_name),
                frame.open_span,
            )
            .with_directive(frame.kind.name())
            .with_help(format!("Close the block with '@{}'", frame.kind.closer_name()));
            self.structural(diag, diagnostics)?;

            let node = self.finish_frame(frame, eof, diagnostics);
            self.push_node(node);
        }
        Ok(())
    }

    fn eof_span(&self) -> Span {
        let byte = self.source.len();
        let line = self.source.lines().count().saturating_sub(1);
        let col = self.source.lines().last().map(|l| l.chars().count()).unwrap_or(0);
        let end = Position { byte, line, col };
        Span { start: end, end }
    }

    /// Turn a closed frame into its node
    fn finish_frame(&self, frame: BlockFrame, close_span: Span, diagnostics: &mut Vec<Diagnostic>) -> Node {
        let span = Span { start: frame.open_span.start, end: close_span.end };
        let kind = frame.kind;
        let mut segments = frame.segments.into_iter();
        let Some(first) = segments.next() else {
            return Node::Text(TextNode { content: String::new(), span });
        };

        match kind {
            k if k.is_conditional() => {
                let mut branches = vec![CondBranch {
                    condition: Some(first.params.unwrap_or_default()),
                    body: first.body,
                    span: first.span,
                }];
                for seg in segments {
                    let condition = match seg.branch {
                        Some(Branch::Else) => None,
                        _ => Some(seg.params.unwrap_or_default()),
                    };
                    branches.push(CondBranch { condition, body: seg.body, span: seg.span });
                }
                Node::Conditional(ConditionalNode { kind, branches, span })
            }
            BlockKind::Foreach | BlockKind::For | BlockKind::While => Node::Loop(LoopNode {
                kind,
                header: first.params.unwrap_or_default(),
                body: first.body,
                span,
            }),
            BlockKind::Switch => {
                // Only whitespace may sit between `@switch` and the first `@case`.
                if let Some(stray) = first.body.iter().find(|n| !is_blank(n)) {
                    diagnostics.push(
                        Diagnostic::warning(
                            ErrorKind::MisplacedBranch,
                            "content before the first '@case' in '@switch' was dropped",
                            stray.span(),
                        )
                        .with_directive("switch")
                        .with_related(first.span)
                        .with_related_label("'@switch' opened here")
                        .with_help("Move the content into a '@case' or '@default' branch"),
                    );
                }
                let cases = segments
                    .map(|seg| CaseNode {
                        label: match seg.branch {
                            Some(Branch::Default) => None,
                            _ => Some(seg.params.unwrap_or_default()),
                        },
                        body: seg.body,
                        breaks: seg.breaks,
                        span: seg.span,
                    })
                    .collect();
                Node::Switch(SwitchNode { subject: first.params.unwrap_or_default(), cases, span })
            }
            BlockKind::Section => {
                let args = first.params.unwrap_or_default();
                let name = split_params(&args).first().map(|n| unquote(n).to_string()).unwrap_or_default();
                Node::Section(SectionNode { name, content: SectionContent::Long(first.body), span })
            }
            _ => Node::Scoped(ScopedNode { kind, args: first.params, body: first.body, span }),
        }
    }
}

fn is_blank(node: &Node) -> bool {
    matches!(node, Node::Text(text) if text.content.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tokenizer::tokenize;

    fn build(source: &str, strict: bool) -> (Result<Vec<Node>, CompileError>, Vec<Diagnostic>) {
        let tokenized = tokenize(source);
        let mut diagnostics = tokenized.diagnostics;
        let builder = TreeBuilder::new(tokenized.tokens, Arc::from(source), strict);
        (builder.build(&mut diagnostics), diagnostics)
    }

    #[test]
    fn test_if_chain() {
        let (nodes, _) = build("@if($x > 1) A @elseif($x == 1) B @else C @endif", true);
        let nodes = nodes.unwrap();
        assert_eq!(nodes.len(), 1);
        let Node::Conditional(cond) = &nodes[0] else { panic!("expected conditional") };
        assert_eq!(cond.kind, BlockKind::If);
        assert_eq!(cond.branches.len(), 3);
        assert_eq!(cond.branches[0].condition.as_deref(), Some("$x > 1"));
        assert_eq!(cond.branches[1].condition.as_deref(), Some("$x == 1"));
        assert!(cond.branches[2].condition.is_none());
    }

    #[test]
    fn test_nested_blocks() {
        let (nodes, _) = build("@foreach($a as $b) @if($b) x @endif @endforeach", true);
        let nodes = nodes.unwrap();
        let Node::Loop(lp) = &nodes[0] else { panic!("expected loop") };
        assert_eq!(lp.kind, BlockKind::Foreach);
        assert!(lp.body.iter().any(|n| matches!(n, Node::Conditional(_))));
    }

    #[test]
    fn test_mismatched_close_strict() {
        let (result, _) = build("@if($x>1) A @endforeach", true);
        let err = result.unwrap_err();
        let diag = err.diagnostic().unwrap();
        assert_eq!(diag.kind, ErrorKind::MismatchedClose);
        assert_eq!(diag.directive.as_deref(), Some("if"));
        assert!(diag.message.contains("@if"));
    }

    #[test]
    fn test_mismatched_close_lenient() {
        let (result, diags) = build("@if($x>1) A @endforeach @endif", false);
        let nodes = result.unwrap();
        assert!(matches!(&nodes[0], Node::Conditional(_)));
        assert!(diags.iter().any(|d| d.kind == ErrorKind::MismatchedClose && !d.is_error()));
    }

    #[test]
    fn test_unterminated() {
        let (result, _) = build("@while($x) A", true);
        assert!(matches!(result, Err(CompileError::Structure(ref d)) if d.kind == ErrorKind::UnterminatedBlock));

        let (result, diags) = build("@while($x) A", false);
        assert!(matches!(&result.unwrap()[0], Node::Loop(_)));
        assert_eq!(diags[0].kind, ErrorKind::UnterminatedBlock);
    }

    #[test]
    fn test_misplaced_else() {
        let (result, _) = build("@foreach($a as $b) @else @endforeach", true);
        assert!(matches!(result, Err(CompileError::Structure(ref d)) if d.kind == ErrorKind::MisplacedBranch));

        let (result, _) = build("@if($a) x @else y @else z @endif", true);
        assert!(result.is_err());
    }

    #[test]
    fn test_switch() {
        let (nodes, _) = build("@switch($t) @case(1) one @break @case(2) two @default other @endswitch", true);
        let Node::Switch(sw) = &nodes.unwrap()[0] else { panic!("expected switch") };
        assert_eq!(sw.subject, "$t");
        assert_eq!(sw.cases.len(), 3);
        assert!(sw.cases[0].breaks);
        assert!(!sw.cases[1].breaks);
        assert!(sw.cases[2].label.is_none());
    }

    #[test]
    fn test_text_before_first_case_is_reported() {
        let (nodes, diags) = build("@switch($t) <b>lost</b> {{ $t }} @case(1) one @endswitch", true);
        let Node::Switch(sw) = &nodes.unwrap()[0] else { panic!("expected switch") };
        assert_eq!(sw.cases.len(), 1);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, ErrorKind::MisplacedBranch);
        assert!(!diags[0].is_error());
        assert!(diags[0].message.contains("before the first '@case'"));

        let (_, diags) = build("@switch($t)\n    @case(1) one @endswitch", true);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_nesting_ceiling() {
        let within = format!("{}x{}", "@if($a) ".repeat(MAX_BLOCK_DEPTH), " @endif".repeat(MAX_BLOCK_DEPTH));
        let (result, _) = build(&within, true);
        assert!(result.is_ok());

        let deep = format!("{}x{}", "@if($a) ".repeat(2000), " @endif".repeat(2000));
        for strict in [true, false] {
            let (result, _) = build(&deep, strict);
            let err = result.unwrap_err();
            let diag = err.diagnostic().unwrap();
            assert_eq!(diag.kind, ErrorKind::NestingTooDeep);
            assert_eq!(diag.directive.as_deref(), Some("if"));
        }
    }

    #[test]
    fn test_break_outside_switch_is_dropped() {
        let (nodes, diags) = build("@foreach($a as $b) @break @endforeach", true);
        assert!(nodes.is_ok());
        assert_eq!(diags[0].kind, ErrorKind::MisplacedBranch);
    }

    #[test]
    fn test_short_and_long_sections() {
        let (nodes, _) = build("@section('title', 'Home')@section('content')<p>x</p>@endsection", true);
        let nodes = nodes.unwrap();
        assert!(matches!(&nodes[0], Node::Section(s) if s.name == "title" && matches!(s.content, SectionContent::Short(ref v) if v == "'Home'")));
        assert!(matches!(&nodes[1], Node::Section(s) if s.name == "content" && matches!(s.content, SectionContent::Long(_))));
    }

    #[test]
    fn test_has_section_closes_with_endif() {
        let (nodes, _) = build("@hasSection('nav') x @else y @endif", true);
        assert!(matches!(&nodes.unwrap()[0], Node::Conditional(c) if c.kind == BlockKind::HasSection && c.branches.len() == 2));
    }

    #[test]
    fn test_scoped_blocks() {
        let (nodes, _) = build("@wrapper('div', ['class' => 'x']) a @endWrapper @watch($a) b @endwatch", true);
        let nodes = nodes.unwrap();
        assert!(matches!(&nodes[0], Node::Scoped(s) if s.kind == BlockKind::Wrap));
        assert!(matches!(&nodes[2], Node::Scoped(s) if s.kind == BlockKind::Follow && s.args.as_deref() == Some("$a")));
    }
}
