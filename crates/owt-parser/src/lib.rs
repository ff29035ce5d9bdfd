//! owt Parser
//!
//! Recursive-descent parser from the `owt-lexer` token stream to a
//! location-tagged [`Program`]. Host-language code (expressions, function
//! bodies, type annotations) is never parsed; it is captured as raw source
//! text between balanced delimiters.

pub mod ast;
pub mod parser;

pub use ast::{Component, Node, Program};
pub use parser::{split_props_clause, Parser};

use owt_lexer::{LexerError, Span};

/// Parser error. Always carries the span of the offending construct.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Parse error at line {}, column {}: {message}", .span.start.line, .span.start.column)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    pub fn line(&self) -> usize {
        self.span.start.line
    }

    pub fn column(&self) -> usize {
        self.span.start.column
    }
}

impl From<LexerError> for ParseError {
    fn from(e: LexerError) -> Self {
        let span = e.span();
        ParseError {
            message: e.message,
            span,
        }
    }
}
