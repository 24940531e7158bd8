use super::{TransformMetadata, Visitor};
use crate::ast::Node;
use crate::error::{Diagnostic, ErrorKind};
use crate::events;

/// Counts event bindings and reports entries the handler compiler had to guess at
pub struct EventCheckPlugin;

impl Visitor for EventCheckPlugin {
    fn enter(&mut self, node: &mut Node, metadata: &mut TransformMetadata) -> bool {
        if let Node::Event(event) = node {
            metadata.events += 1;
            for entry in events::analyze(&event.args).ambiguous {
                metadata.diagnostics.push(
                    Diagnostic::warning(
                        ErrorKind::AmbiguousHandlerClassification,
                        format!("'{}' is neither a handler call nor an expression; passed as a literal", entry),
                        event.span,
                    )
                    .with_directive(event.event),
                );
            }
        }
        true
    }
}
