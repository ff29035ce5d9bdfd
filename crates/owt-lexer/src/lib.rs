//! owt Lexer
//!
//! Turns `.owt` source text into a flat token stream. Markup punctuation,
//! string and number literals, identifiers and reserved keywords each get
//! their own kind; anything else falls back to a text run so prose between
//! tags never needs a grammar of its own. Comments are kept out of the main
//! stream in a side list.
//!
//! # Example
//!
//! ```
//! use owt_lexer::{Scanner, TokenKind};
//!
//! let stream = Scanner::tokenize("").unwrap();
//! assert_eq!(stream.tokens.len(), 1);
//! assert_eq!(stream.tokens[0].kind, TokenKind::Eof);
//! ```

pub mod scanner;
pub mod token;

pub use scanner::Scanner;
pub use token::{is_void_element, Keyword, Position, Span, Token, TokenKind, TokenStream};

/// Lexer error with position information.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Lexer error at line {line}, column {column}: {message}")]
pub struct LexerError {
    pub message: String,
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl LexerError {
    /// Zero-width span at the offending position.
    pub fn span(&self) -> Span {
        let at = Position::new(self.offset, self.line, self.column);
        Span::new(at, at)
    }
}
