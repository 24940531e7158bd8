use super::{TransformMetadata, Visitor};
use crate::ast::{InlineKind, Node};
use crate::error::{Diagnostic, ErrorKind};
use crate::parser::balanced::{split_params, unquote};

/// Records section definitions and yield points, flagging duplicate section names
pub struct SectionCollectPlugin;

impl Visitor for SectionCollectPlugin {
    fn enter(&mut self, node: &mut Node, metadata: &mut TransformMetadata) -> bool {
        match node {
            Node::Section(section) => {
                if metadata.sections.contains(&section.name) {
                    metadata.diagnostics.push(
                        Diagnostic::new(
                            ErrorKind::DuplicateSection,
                            format!("section '{}' is defined more than once", section.name),
                            section.span,
                        )
                        .with_directive("section")
                        .with_help("Section names must be unique within one view"),
                    );
                } else {
                    metadata.sections.push(section.name.clone());
                }
            }
            Node::Inline(inline) if inline.kind == InlineKind::Yield => {
                if let Some(name) = inline.args.as_deref().and_then(|a| split_params(a).first().copied()) {
                    metadata.yields.push(unquote(name).to_string());
                }
            }
            _ => {}
        }
        true
    }
}
