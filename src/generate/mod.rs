mod body;
mod output;
mod view;

pub use body::{BodyEmitter, RenderedBody, escape_template};
pub use output::Output;
pub use view::{SectionInfo, ViewDefinition, ViewGenerator, view_function_name};

use crate::ast::Ast;
use crate::transform::TransformMetadata;

/// Generator options
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Dotted view path, e.g. `web.user-detail`
    pub view_path: String,
    /// Exported function name; derived from the view path when unset
    pub function_name: Option<String>,
    /// Runtime object the view helpers live on
    pub runtime_namespace: String,
    /// Prefix of runtime data attributes
    pub attr_prefix: String,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            view_path: String::new(),
            function_name: None,
            runtime_namespace: "App.View".to_string(),
            attr_prefix: "data-".to_string(),
        }
    }
}

/// Generation result
#[derive(Debug, Clone)]
pub struct GenerateResult {
    pub code: String,
    pub definition: ViewDefinition,
}

/// Generator trait - converts AST to code
pub trait Generator {
    fn generate(&self, ast: &Ast, metadata: &TransformMetadata, options: &GenerateOptions) -> GenerateResult;
}
