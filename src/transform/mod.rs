mod event_check;
mod metadata;
mod section_collect;
mod var_usage;

pub use event_check::EventCheckPlugin;
pub use metadata::TransformMetadata;
pub use section_collect::SectionCollectPlugin;
pub use var_usage::VarUsagePlugin;

use crate::ast::{Ast, Node, SectionContent};

/// Visitor trait for AST transformations
pub trait Visitor {
    /// Called before visiting children. Return `false` to skip children.
    fn enter(&mut self, _node: &mut Node, _metadata: &mut TransformMetadata) -> bool {
        true
    }

    /// Called after visiting children.
    fn exit(&mut self, _node: &mut Node, _metadata: &mut TransformMetadata) {}
}

/// Transformer that applies a series of plugins to an AST
pub struct Transformer {
    plugins: Vec<Box<dyn Visitor>>,
    pub metadata: TransformMetadata,
}

impl Transformer {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
            metadata: TransformMetadata::new(),
        }
    }

    pub fn add<V: Visitor + 'static>(mut self, visitor: V) -> Self {
        self.plugins.push(Box::new(visitor));
        self
    }

    pub fn transform(&mut self, ast: &mut Ast) -> &TransformMetadata {
        self.metadata.declared = ast.meta.variable_list().into_iter().map(str::to_string).collect();

        // Run all plugins
        for plugin in &mut self.plugins {
            Self::visit_nodes(&mut ast.nodes, plugin.as_mut(), &mut self.metadata);
        }

        &self.metadata
    }

    fn visit_nodes(nodes: &mut Vec<Node>, visitor: &mut dyn Visitor, metadata: &mut TransformMetadata) {
        for node in nodes {
            if visitor.enter(node, metadata) {
                // Visit children based on node type
                match node {
                    Node::Conditional(cond) => {
                        for branch in &mut cond.branches {
                            Self::visit_nodes(&mut branch.body, visitor, metadata);
                        }
                    }
                    Node::Loop(lp) => {
                        Self::visit_nodes(&mut lp.body, visitor, metadata);
                    }
                    Node::Switch(switch) => {
                        for case in &mut switch.cases {
                            Self::visit_nodes(&mut case.body, visitor, metadata);
                        }
                    }
                    Node::Section(section) => {
                        if let SectionContent::Long(body) = &mut section.content {
                            Self::visit_nodes(body, visitor, metadata);
                        }
                    }
                    Node::Scoped(scoped) => {
                        Self::visit_nodes(&mut scoped.body, visitor, metadata);
                    }
                    // Leaf nodes
                    Node::Text(_) | Node::Echo(_) | Node::Inline(_) | Node::Event(_) | Node::Php(_) => {}
                }
            }
            visitor.exit(node, metadata);
        }
    }
}

impl Default for Transformer {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a transformer with the standard plugins
pub fn standard_plugins() -> Transformer {
    Transformer::new()
        .add(VarUsagePlugin::default())
        .add(SectionCollectPlugin)
        .add(EventCheckPlugin)
}

/// Expression text a node evaluates directly, without its children
pub(crate) fn node_expressions(node: &Node) -> Vec<&str> {
    match node {
        Node::Echo(echo) => vec![echo.expr.as_str()],
        Node::Inline(inline) => inline.args.as_deref().into_iter().collect(),
        Node::Event(event) => vec![event.args.as_str()],
        Node::Php(php) => vec![php.code.as_str()],
        Node::Conditional(cond) => cond.branches.iter().filter_map(|b| b.condition.as_deref()).collect(),
        Node::Loop(lp) => vec![lp.header.as_str()],
        Node::Switch(switch) => std::iter::once(switch.subject.as_str())
            .chain(switch.cases.iter().filter_map(|c| c.label.as_deref()))
            .collect(),
        Node::Section(section) => match &section.content {
            SectionContent::Short(value) => vec![value.as_str()],
            SectionContent::Long(_) => Vec::new(),
        },
        Node::Scoped(scoped) => scoped.args.as_deref().into_iter().collect(),
        Node::Text(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{DirectiveParser, Parser};

    fn run(source: &str) -> TransformMetadata {
        let mut diagnostics = Vec::new();
        let mut ast = DirectiveParser::lenient().parse(source, &mut diagnostics).unwrap();
        let mut transformer = standard_plugins();
        transformer.transform(&mut ast);
        transformer.metadata
    }

    #[test]
    fn test_body_var_usage() {
        let metadata = run("@vars($user) <p>{{ $user->name }}</p>");
        assert!(metadata.body_uses_vars);
        assert!(metadata.vars_used.contains("user"));

        let metadata = run("@vars($user) <p>static</p>");
        assert!(!metadata.body_uses_vars);
    }

    #[test]
    fn test_section_var_usage() {
        let source = "@vars($items) @section('list') @foreach($items as $i) {{ $i }} @endforeach @endsection @section('title', 'Home')";
        let metadata = run(source);
        assert_eq!(metadata.sections, vec!["list", "title"]);
        assert!(metadata.section_uses_vars("list"));
        assert!(!metadata.section_uses_vars("title"));
        assert!(!metadata.body_uses_vars);
    }

    #[test]
    fn test_duplicate_sections_reported() {
        let metadata = run("@section('a', 1) @section('a', 2)");
        assert_eq!(metadata.sections, vec!["a"]);
        assert_eq!(metadata.diagnostics.len(), 1);
        assert_eq!(metadata.diagnostics[0].kind, crate::error::ErrorKind::DuplicateSection);
    }

    #[test]
    fn test_ambiguous_event_reported() {
        let metadata = run("<button @click(42)>x</button>");
        assert_eq!(metadata.events, 1);
        assert_eq!(metadata.diagnostics[0].kind, crate::error::ErrorKind::AmbiguousHandlerClassification);
        assert!(!metadata.diagnostics[0].is_error());
    }
}
