pub mod balanced;
pub mod directives;
pub mod tokenizer;
mod tree_builder;

pub use tokenizer::{Position, Span, Token, Tokenized, tokenize};
use tree_builder::TreeBuilder;

use crate::ast::Ast;
use crate::error::{CompileError, Diagnostic};
use crate::meta;
use std::sync::Arc;

/// Parser trait - converts template source to an AST
pub trait Parser {
    fn parse(&self, source: &str, diagnostics: &mut Vec<Diagnostic>) -> Result<Ast, CompileError>;
}

/// Directive template parser
pub struct DirectiveParser {
    // Configuration only, no state
    strict: bool,
}

impl DirectiveParser {
    pub fn new() -> Self {
        Self { strict: true }
    }

    /// Lenient parsing records structural problems as warnings and keeps going
    pub fn lenient() -> Self {
        Self { strict: false }
    }

    pub fn with_strict(strict: bool) -> Self {
        Self { strict }
    }
}

impl Default for DirectiveParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for DirectiveParser {
    fn parse(&self, source: &str, diagnostics: &mut Vec<Diagnostic>) -> Result<Ast, CompileError> {
        // Tokenize
        let Tokenized { tokens, diagnostics: found } = tokenize(source);
        for diag in found {
            match (diag.is_error(), self.strict) {
                (true, true) => return Err(CompileError::Structure(diag)),
                (true, false) => diagnostics.push(diag.into_warning()),
                _ => diagnostics.push(diag),
            }
        }

        // Lift meta directives out of the body
        let (meta, body) = meta::extract(tokens, diagnostics);

        // Build AST
        let source_arc: Arc<str> = Arc::from(source);
        let nodes = TreeBuilder::new(body, source_arc.clone(), self.strict).build(diagnostics)?;

        Ok(Ast::new(nodes, meta, source_arc))
    }
}
