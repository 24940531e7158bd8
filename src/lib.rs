//! Compiler for directive templates (`@if`, `@foreach`, `@section`, `{{ }}` ...)
//! into JavaScript view modules.
//!
//! Every view compiles independently:
//!
//! ```text
//! source -> tokenize -> meta::extract -> tree -> transform -> generate -> module
//! ```

pub mod ast;
pub mod config;
pub mod error;
pub mod events;
pub mod expr;
pub mod generate;
pub mod meta;
pub mod parser;
pub mod sections;
pub mod transform;

pub use config::CompilerConfig;
pub use error::{CompileError, Diagnostic, ErrorKind, Severity};
pub use generate::{GenerateOptions, ViewDefinition, view_function_name};

use generate::{Generator, ViewGenerator};
use parser::{DirectiveParser, Parser};
use serde::Serialize;
use tracing::{debug, info_span, warn};

/// Options for one compilation
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Structural problems abort the compile instead of degrading to warnings
    pub strict: bool,
    pub runtime_namespace: String,
    pub attr_prefix: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            strict: true,
            runtime_namespace: "App.View".to_string(),
            attr_prefix: "data-".to_string(),
        }
    }
}

/// A compiled view
#[derive(Debug, Clone, Serialize)]
pub struct CompileResult {
    pub code: String,
    pub definition: ViewDefinition,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileResult {
    /// No diagnostics other than unknown directives, which pass through as text
    pub fn is_clean(&self) -> bool {
        self.diagnostics.iter().all(|d| d.kind == ErrorKind::UnknownDirective)
    }
}

/// The compile pipeline: parse, transform, generate
pub struct Pipeline {
    parser: DirectiveParser,
    generator: ViewGenerator,
    options: CompileOptions,
}

impl Pipeline {
    /// Strict pipeline with the default runtime namespace
    pub fn standard() -> Self {
        Self::new(CompileOptions::default())
    }

    pub fn new(options: CompileOptions) -> Self {
        Self {
            parser: DirectiveParser::with_strict(options.strict),
            generator: ViewGenerator::new(),
            options,
        }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile the template `source` registered under the dotted `view_path`
    pub fn compile(&self, source: &str, view_path: &str) -> Result<CompileResult, CompileError> {
        let span = info_span!("compile", view = %view_path);
        let _guard = span.enter();

        let mut diagnostics = Vec::new();
        let mut ast = self.parser.parse(source, &mut diagnostics)?;

        // Fresh metadata per view
        let mut transformer = transform::standard_plugins();
        transformer.transform(&mut ast);
        let metadata = &mut transformer.metadata;

        for diag in std::mem::take(&mut metadata.diagnostics) {
            match (diag.is_error(), self.options.strict) {
                (true, true) => return Err(CompileError::Structure(diag)),
                (true, false) => diagnostics.push(diag.into_warning()),
                _ => diagnostics.push(diag),
            }
        }
        for diag in diagnostics.iter().filter(|d| !d.is_error()) {
            warn!(kind = diag.kind.as_str(), "{}", diag.message);
        }

        let options = GenerateOptions {
            view_path: view_path.to_string(),
            function_name: None,
            runtime_namespace: self.options.runtime_namespace.clone(),
            attr_prefix: self.options.attr_prefix.clone(),
        };
        let generated = self.generator.generate(&ast, &transformer.metadata, &options);
        debug!(
            sections = generated.definition.sections.len(),
            prerender = generated.definition.has_prerender,
            "view compiled"
        );

        Ok(CompileResult { code: generated.code, definition: generated.definition, diagnostics })
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::standard()
    }
}

/// Compile one view with the default options
pub fn compile(source: &str, view_path: &str) -> Result<CompileResult, CompileError> {
    Pipeline::standard().compile(source, view_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_simple() {
        let result = compile("<h1>{{ $title }}</h1>", "web.home").unwrap();
        assert!(result.code.contains("export function WebHome("));
        assert!(result.code.contains("${App.View.escString(title)}"));
        assert!(result.is_clean());
    }

    #[test]
    fn test_duplicate_section_strict() {
        let err = Pipeline::standard()
            .compile("@section('a', 1)@section('a', 2)", "web.dup")
            .unwrap_err();
        assert_eq!(err.diagnostic().map(|d| d.kind), Some(ErrorKind::DuplicateSection));
    }

    #[test]
    fn test_duplicate_section_lenient() {
        let options = CompileOptions { strict: false, ..Default::default() };
        let result = Pipeline::new(options).compile("@section('a', 1)@section('a', 2)", "web.dup").unwrap();
        assert_eq!(result.definition.sections.len(), 1);
        assert_eq!(result.diagnostics[0].severity, Severity::Warning);
        assert!(!result.is_clean());
    }

    #[test]
    fn test_custom_namespace() {
        let options = CompileOptions { runtime_namespace: "Ov".to_string(), ..Default::default() };
        let result = Pipeline::new(options).compile("{{ $a }}", "a").unwrap();
        assert!(result.code.contains("${Ov.escString(a)}"));
        assert!(result.code.contains("Ov.generateViewId()"));
    }
}
