use super::{TransformMetadata, Visitor, node_expressions};
use crate::ast::Node;
use crate::expr::referenced_names;

/// Tracks which declared view variables are read, and where: the main body
/// or a named section.
#[derive(Default)]
pub struct VarUsagePlugin {
    sections: Vec<String>,
}

impl Visitor for VarUsagePlugin {
    fn enter(&mut self, node: &mut Node, metadata: &mut TransformMetadata) -> bool {
        let used: Vec<String> = node_expressions(node)
            .into_iter()
            .flat_map(referenced_names)
            .filter(|name| metadata.declared.contains(*name))
            .map(str::to_string)
            .collect();

        if !used.is_empty() {
            match self.sections.last() {
                Some(section) => {
                    metadata.sections_using_vars.insert(section.clone());
                }
                None if !matches!(node, Node::Section(_)) => metadata.body_uses_vars = true,
                None => {
                    // Short section value
                    if let Node::Section(section) = node {
                        metadata.sections_using_vars.insert(section.name.clone());
                    }
                }
            }
            metadata.vars_used.extend(used);
        }

        if let Node::Section(section) = node {
            self.sections.push(section.name.clone());
        }
        true
    }

    fn exit(&mut self, node: &mut Node, _metadata: &mut TransformMetadata) {
        if matches!(node, Node::Section(_)) {
            self.sections.pop();
        }
    }
}
