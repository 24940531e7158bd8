use crate::error::Diagnostic;
use std::collections::HashSet;

/// Metadata collected during transformation
/// This is populated by analysis plugins and used by the generator
#[derive(Debug, Clone, Default)]
pub struct TransformMetadata {
    /// Names the view receives through its data object
    pub declared: HashSet<String>,
    pub vars_used: HashSet<String>,
    /// Whether markup outside every section reads view data
    pub body_uses_vars: bool,
    /// Section names in definition order, first definition wins
    pub sections: Vec<String>,
    pub sections_using_vars: HashSet<String>,
    pub yields: Vec<String>,
    pub events: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl TransformMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section_uses_vars(&self, name: &str) -> bool {
        self.sections_using_vars.contains(name)
    }

    pub fn any_section_uses_vars(&self) -> bool {
        !self.sections_using_vars.is_empty()
    }

    pub fn has_sections(&self) -> bool {
        !self.sections.is_empty()
    }
}
