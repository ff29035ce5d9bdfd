use serde::Serialize;

/// A point in source text. `offset` is a byte offset, `line` and `column` are 1-based.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }
}

/// Source extent of a token or AST node, end exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Span from the start of `self` to the end of `other`.
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start, other.end)
    }

    /// The source text covered by this span.
    pub fn slice<'s>(&self, source: &'s str) -> &'s str {
        source.get(self.start.offset..self.end.offset).unwrap_or("")
    }

    pub fn contains(&self, other: &Span) -> bool {
        self.start.offset <= other.start.offset && other.end.offset <= self.end.offset
    }
}

/// Reserved words. They lex as their own kind but keep the same text as an identifier would.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Keyword {
    Export,
    Component,
    Var,
    Val,
    If,
    Else,
    For,
    Empty,
    Switch,
    Case,
    Default,
    Slot,
}

impl Keyword {
    pub fn lookup(word: &str) -> Option<Keyword> {
        let keyword = match word {
            "export" => Keyword::Export,
            "component" => Keyword::Component,
            "var" => Keyword::Var,
            "val" => Keyword::Val,
            "if" => Keyword::If,
            "else" => Keyword::Else,
            "for" => Keyword::For,
            "empty" => Keyword::Empty,
            "switch" => Keyword::Switch,
            "case" => Keyword::Case,
            "default" => Keyword::Default,
            "slot" => Keyword::Slot,
            _ => return None,
        };
        Some(keyword)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Export => "export",
            Keyword::Component => "component",
            Keyword::Var => "var",
            Keyword::Val => "val",
            Keyword::If => "if",
            Keyword::Else => "else",
            Keyword::For => "for",
            Keyword::Empty => "empty",
            Keyword::Switch => "switch",
            Keyword::Case => "case",
            Keyword::Default => "default",
            Keyword::Slot => "slot",
        }
    }
}

/// Token classification for owt source.
///
/// Literal variants carry their decoded value; the raw source text is on [`Token::text`].
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Punctuation
    LAngle,
    RAngle,
    Slash,
    Equals,
    Colon,
    Semicolon,
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,

    // Literals (carry data)
    String(String),
    Number(f64),
    Identifier(String),
    Keyword(Keyword),

    /// A run of characters with no structural meaning: prose, operators.
    Text(String),

    /// `// line` or `/* block */`. Only ever appears in [`TokenStream::comments`].
    Comment(String),

    Eof,
}

/// A token produced by the owt lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
        }
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.kind == TokenKind::Keyword(keyword)
    }

    /// Identifier text, with keywords counting as identifiers.
    pub fn word(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Identifier(name) => Some(name),
            TokenKind::Keyword(keyword) => Some(keyword.as_str()),
            _ => None,
        }
    }
}

/// Lexer output: the significant tokens plus comments on the side.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenStream {
    /// Always terminated by a single `Eof` token.
    pub tokens: Vec<Token>,
    /// Sorted by offset.
    pub comments: Vec<Token>,
}

impl TokenStream {
    pub fn new(tokens: Vec<Token>, comments: Vec<Token>) -> Self {
        Self { tokens, comments }
    }

    /// Push `end` past comments that start on its line before `limit`.
    pub fn extend_trailing_comments(&self, end: Position, limit: usize) -> Position {
        let mut end = end;
        let first = self
            .comments
            .partition_point(|c| c.span.start.offset < end.offset);
        for comment in &self.comments[first..] {
            if comment.span.start.offset >= limit || comment.span.start.line != end.line {
                break;
            }
            end = comment.span.end;
        }
        end
    }
}

/// HTML void elements (implicitly self-closing).
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Check if a tag name is an HTML void element.
pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS
        .iter()
        .any(|void| void.eq_ignore_ascii_case(tag))
}
