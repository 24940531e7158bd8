use std::sync::Arc;

pub use crate::parser::directives::{BlockKind, InlineKind};
// Re-export Position and Span from tokenizer so the rest of the crate uses a single Span type
pub use crate::parser::tokenizer::{Position, Span};
use crate::meta::ViewMeta;

/// Parsed view: the directive tree plus the side-channel declarations
#[derive(Debug, Clone)]
pub struct Ast {
    pub nodes: Vec<Node>,
    pub meta: ViewMeta,
    pub source: Arc<str>,
}

impl Ast {
    pub fn new(nodes: Vec<Node>, meta: ViewMeta, source: Arc<str>) -> Self {
        Self { nodes, meta, source }
    }
}

/// AST Node
#[derive(Debug, Clone)]
pub enum Node {
    // Content
    Text(TextNode),
    Echo(EchoNode),
    Inline(InlineNode),
    Event(EventNode),
    Php(PhpNode),

    // Blocks
    Conditional(ConditionalNode),
    Loop(LoopNode),
    Switch(SwitchNode),
    Section(SectionNode),
    Scoped(ScopedNode),
}

/// Literal markup
#[derive(Debug, Clone)]
pub struct TextNode {
    pub content: String,
    pub span: Span,
}

/// `{{ expr }}` / `{!! expr !!}`
#[derive(Debug, Clone)]
pub struct EchoNode {
    pub expr: String,
    pub escaped: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct InlineNode {
    pub kind: InlineKind,
    pub args: Option<String>,
    pub span: Span,
}

/// `@click(...)` and friends
#[derive(Debug, Clone)]
pub struct EventNode {
    pub event: &'static str,
    pub args: String,
    pub span: Span,
}

/// `@php ... @endphp` / `@php(code)`: runs for side effects, renders nothing
#[derive(Debug, Clone)]
pub struct PhpNode {
    pub code: String,
    pub span: Span,
}

/// if / unless / isset / empty / hasSection with their else-if chain
#[derive(Debug, Clone)]
pub struct ConditionalNode {
    pub kind: BlockKind,
    pub branches: Vec<CondBranch>,
    pub span: Span,
}

/// One arm of a conditional. `condition` is `None` for `@else`.
#[derive(Debug, Clone)]
pub struct CondBranch {
    pub condition: Option<String>,
    pub body: Vec<Node>,
    pub span: Span,
}

/// foreach / for / while
#[derive(Debug, Clone)]
pub struct LoopNode {
    pub kind: BlockKind,
    pub header: String,
    pub body: Vec<Node>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct SwitchNode {
    pub subject: String,
    pub cases: Vec<CaseNode>,
    pub span: Span,
}

/// `@case(label)` or `@default` (label `None`)
#[derive(Debug, Clone)]
pub struct CaseNode {
    pub label: Option<String>,
    pub body: Vec<Node>,
    pub breaks: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum SectionContent {
    /// `@section('name', value)`
    Short(String),
    /// `@section('name') ... @endsection`
    Long(Vec<Node>),
}

#[derive(Debug, Clone)]
pub struct SectionNode {
    pub name: String,
    pub content: SectionContent,
    pub span: Span,
}

/// wrap / block / follow: a body plus the raw directive arguments
#[derive(Debug, Clone)]
pub struct ScopedNode {
    pub kind: BlockKind,
    pub args: Option<String>,
    pub body: Vec<Node>,
    pub span: Span,
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::Text(n) => n.span,
            Node::Echo(n) => n.span,
            Node::Inline(n) => n.span,
            Node::Event(n) => n.span,
            Node::Php(n) => n.span,
            Node::Conditional(n) => n.span,
            Node::Loop(n) => n.span,
            Node::Switch(n) => n.span,
            Node::Section(n) => n.span,
            Node::Scoped(n) => n.span,
        }
    }
}
