use crate::token::{Keyword, Position, Span, Token, TokenKind, TokenStream};
use crate::LexerError;

/// owt source scanner.
///
/// Walks the source by byte offset, keeping 1-based line and column counters
/// so every token carries a full [`Span`]. Whitespace separates tokens but is
/// never part of one; the parser recovers it by slicing the source between
/// token offsets.
pub struct Scanner<'a> {
    source: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    comments: Vec<Token>,
}

impl<'a> Scanner<'a> {
    /// Create a new scanner for the given source.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            comments: Vec::new(),
        }
    }

    /// Tokenize the entire source.
    pub fn tokenize(source: &str) -> Result<TokenStream, LexerError> {
        let mut scanner = Scanner::new(source);
        scanner.scan_tokens()?;
        tracing::trace!(
            tokens = scanner.tokens.len(),
            comments = scanner.comments.len(),
            "tokenized source"
        );
        Ok(TokenStream::new(scanner.tokens, scanner.comments))
    }

    fn scan_tokens(&mut self) -> Result<(), LexerError> {
        while !self.is_at_end() {
            self.scan_token()?;
        }

        let end = self.position();
        self.tokens
            .push(Token::new(TokenKind::Eof, "", Span::new(end, end)));
        Ok(())
    }

    fn scan_token(&mut self) -> Result<(), LexerError> {
        let start = self.position();
        let ch = self.peek();

        match ch {
            c if c.is_whitespace() => {
                self.advance();
                Ok(())
            }

            '/' if self.peek_next() == '/' => {
                self.scan_line_comment(start);
                Ok(())
            }
            '/' if self.peek_next() == '*' => self.scan_block_comment(start),

            '"' | '\'' => self.scan_string(start, ch),
            '`' => self.scan_template(start),

            '0'..='9' => self.scan_number(start),

            c if is_identifier_start(c) => {
                self.scan_identifier(start);
                Ok(())
            }

            c if is_structural(c) => {
                self.advance();
                self.emit(punctuation(c), start);
                if c == '>' && self.opens_style_tag() {
                    self.scan_raw_style();
                }
                Ok(())
            }

            c if c.is_control() => Err(self.error_at(
                start,
                format!("Unexpected control character {c:?}"),
            )),

            _ => {
                self.scan_text(start);
                Ok(())
            }
        }
    }

    // =========================================================================
    // Literals
    // =========================================================================

    /// Scan a single- or double-quoted string. Raw newlines are not allowed.
    fn scan_string(&mut self, start: Position, quote: char) -> Result<(), LexerError> {
        self.advance(); // opening quote

        let mut value = String::new();
        loop {
            if self.is_at_end() {
                return Err(self.error_at(start, "Unterminated string".into()));
            }
            match self.peek() {
                c if c == quote => {
                    self.advance();
                    break;
                }
                '\n' => {
                    return Err(
                        self.error_at(start, "Unterminated string: newline in string literal".into())
                    );
                }
                '\\' => {
                    self.advance();
                    if self.is_at_end() {
                        return Err(self.error_at(start, "Unterminated string".into()));
                    }
                    match self.advance() {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '0' => value.push('\0'),
                        // Line continuation
                        '\n' => {}
                        c => value.push(c),
                    }
                }
                _ => value.push(self.advance()),
            }
        }

        self.emit(TokenKind::String(value), start);
        Ok(())
    }

    /// Scan a backtick template literal. May span lines; `${...}` stays raw.
    fn scan_template(&mut self, start: Position) -> Result<(), LexerError> {
        self.advance(); // opening backtick

        let body_start = self.pos;
        loop {
            if self.is_at_end() {
                return Err(self.error_at(start, "Unterminated template literal".into()));
            }
            match self.advance() {
                '`' => break,
                '\\' if !self.is_at_end() => {
                    self.advance();
                }
                _ => {}
            }
        }

        let value = self.source[body_start..self.pos - 1].to_string();
        self.emit(TokenKind::String(value), start);
        Ok(())
    }

    /// Scan `\d+(_\d+)*(\.\d+(_\d+)*)?`.
    fn scan_number(&mut self, start: Position) -> Result<(), LexerError> {
        self.scan_digits();
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();
            self.scan_digits();
        }

        let text = &self.source[start.offset..self.pos];
        let value: f64 = text
            .replace('_', "")
            .parse()
            .map_err(|_| self.error_at(start, format!("Invalid number literal '{text}'")))?;
        self.emit(TokenKind::Number(value), start);
        Ok(())
    }

    fn scan_digits(&mut self) {
        while self.peek().is_ascii_digit()
            || (self.peek() == '_' && self.peek_next().is_ascii_digit())
        {
            self.advance();
        }
    }

    // =========================================================================
    // Words and text runs
    // =========================================================================

    /// Scan an identifier or keyword. Hyphens are allowed inside a name
    /// (`aria-label`, `on-click`) when followed by another word character.
    fn scan_identifier(&mut self, start: Position) {
        while !self.is_at_end() {
            let c = self.peek();
            if is_word_char(c) || (c == '-' && is_word_char(self.peek_next())) {
                self.advance();
            } else {
                break;
            }
        }

        let text = &self.source[start.offset..self.pos];
        let kind = match Keyword::lookup(text) {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Identifier(text.to_string()),
        };
        self.emit(kind, start);
    }

    /// Fallback: accumulate characters until something the other rules recognize.
    fn scan_text(&mut self, start: Position) {
        self.advance();
        while !self.is_at_end() {
            let c = self.peek();
            if c.is_whitespace()
                || c.is_control()
                || is_structural(c)
                || is_identifier_start(c)
                || c.is_ascii_digit()
                || matches!(c, '"' | '\'' | '`')
            {
                break;
            }
            self.advance();
        }

        let text = self.source[start.offset..self.pos].to_string();
        self.emit(TokenKind::Text(text), start);
    }

    // =========================================================================
    // Raw <style> content
    // =========================================================================

    /// True when the `>` just emitted closes a `<style ...>` open tag.
    fn opens_style_tag(&self) -> bool {
        let n = self.tokens.len();
        let Some(open) = self.tokens[..n - 1]
            .iter()
            .rposition(|t| t.kind == TokenKind::LAngle)
        else {
            return false;
        };
        if open + 1 >= n - 1 || self.tokens[n - 2].kind == TokenKind::Slash {
            return false;
        }
        self.tokens[open + 1]
            .word()
            .is_some_and(|name| name.eq_ignore_ascii_case("style"))
    }

    /// Emit everything up to the literal `</style` as one text token, verbatim.
    fn scan_raw_style(&mut self) {
        let start = self.position();
        let rest = self.source[self.pos..].to_ascii_lowercase();
        let end = match rest.find("</style") {
            Some(idx) => self.pos + idx,
            None => self.source.len(),
        };
        while self.pos < end {
            self.advance();
        }
        if self.pos > start.offset {
            let text = self.source[start.offset..self.pos].to_string();
            self.emit(TokenKind::Text(text), start);
        }
    }

    // =========================================================================
    // Comments
    // =========================================================================

    fn scan_line_comment(&mut self, start: Position) {
        while !self.is_at_end() && self.peek() != '\n' {
            self.advance();
        }
        let body = self.source[start.offset + 2..self.pos].trim().to_string();
        self.push_comment(body, start);
    }

    fn scan_block_comment(&mut self, start: Position) -> Result<(), LexerError> {
        self.advance();
        self.advance();
        loop {
            if self.is_at_end() {
                return Err(self.error_at(start, "Unterminated block comment".into()));
            }
            if self.peek() == '*' && self.peek_next() == '/' {
                self.advance();
                self.advance();
                break;
            }
            self.advance();
        }
        let body = self.source[start.offset + 2..self.pos - 2].trim().to_string();
        self.push_comment(body, start);
        Ok(())
    }

    fn push_comment(&mut self, body: String, start: Position) {
        let span = Span::new(start, self.position());
        let text = &self.source[start.offset..self.pos];
        self.comments
            .push(Token::new(TokenKind::Comment(body), text, span));
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn emit(&mut self, kind: TokenKind, start: Position) {
        let span = Span::new(start, self.position());
        let text = &self.source[start.offset..self.pos];
        self.tokens.push(Token::new(kind, text, span));
    }

    fn position(&self) -> Position {
        Position::new(self.pos, self.line, self.column)
    }

    fn peek(&self) -> char {
        self.source[self.pos..].chars().next().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        self.source[self.pos..].chars().nth(1).unwrap_or('\0')
    }

    fn advance(&mut self) -> char {
        let Some(c) = self.source[self.pos..].chars().next() else {
            return '\0';
        };
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn error_at(&self, at: Position, message: String) -> LexerError {
        LexerError {
            message,
            offset: at.offset,
            line: at.line,
            column: at.column,
        }
    }
}

fn is_structural(c: char) -> bool {
    matches!(
        c,
        '<' | '>' | '/' | '=' | ':' | ';' | '{' | '}' | '(' | ')' | '[' | ']' | ',' | '.'
    )
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn punctuation(c: char) -> TokenKind {
    match c {
        '<' => TokenKind::LAngle,
        '>' => TokenKind::RAngle,
        '/' => TokenKind::Slash,
        '=' => TokenKind::Equals,
        ':' => TokenKind::Colon,
        ';' => TokenKind::Semicolon,
        '{' => TokenKind::LBrace,
        '}' => TokenKind::RBrace,
        '(' => TokenKind::LParen,
        ')' => TokenKind::RParen,
        '[' => TokenKind::LBracket,
        ']' => TokenKind::RBracket,
        ',' => TokenKind::Comma,
        _ => TokenKind::Dot,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Helper: tokenize and return token kinds (ignoring spans).
    fn kinds(source: &str) -> Vec<TokenKind> {
        Scanner::tokenize(source)
            .unwrap()
            .tokens
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn tokens(source: &str) -> Vec<Token> {
        Scanner::tokenize(source).unwrap().tokens
    }

    fn ident(name: &str) -> TokenKind {
        TokenKind::Identifier(name.into())
    }

    // =========================================================================
    // Structure
    // =========================================================================

    #[test]
    fn test_empty_source() {
        let toks = tokens("");
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].kind, TokenKind::Eof);
    }

    #[test]
    fn test_whitespace_only() {
        assert_eq!(kinds("  \n\t\r\n "), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_punctuation() {
        assert_eq!(
            kinds("< > / = : ; { } ( ) [ ] , ."),
            vec![
                TokenKind::LAngle,
                TokenKind::RAngle,
                TokenKind::Slash,
                TokenKind::Equals,
                TokenKind::Colon,
                TokenKind::Semicolon,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBracket,
                TokenKind::RBracket,
                TokenKind::Comma,
                TokenKind::Dot,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_tag() {
        assert_eq!(
            kinds("<div class=\"a\"/>"),
            vec![
                TokenKind::LAngle,
                ident("div"),
                ident("class"),
                TokenKind::Equals,
                TokenKind::String("a".into()),
                TokenKind::Slash,
                TokenKind::RAngle,
                TokenKind::Eof,
            ]
        );
    }

    // =========================================================================
    // Identifiers and keywords
    // =========================================================================

    #[test]
    fn test_keywords() {
        let words = "export component var val if else for empty switch case default slot";
        let k = kinds(words);
        assert_eq!(k.len(), 13);
        for (kind, word) in k.iter().zip(words.split(' ')) {
            assert_eq!(kind, &TokenKind::Keyword(Keyword::lookup(word).unwrap()));
        }
    }

    #[test]
    fn test_keyword_keeps_text() {
        let toks = tokens("component");
        assert_eq!(toks[0].text, "component");
        assert_eq!(toks[0].word(), Some("component"));
    }

    #[test]
    fn test_keyword_prefix_is_identifier() {
        assert_eq!(kinds("variable"), vec![ident("variable"), TokenKind::Eof]);
        assert_eq!(kinds("iffy"), vec![ident("iffy"), TokenKind::Eof]);
    }

    #[test]
    fn test_identifier_with_hyphen() {
        assert_eq!(kinds("aria-label"), vec![ident("aria-label"), TokenKind::Eof]);
    }

    #[test]
    fn test_identifier_trailing_hyphen_not_included() {
        assert_eq!(
            kinds("i--"),
            vec![ident("i"), TokenKind::Text("--".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_identifier_underscore_and_digits() {
        assert_eq!(kinds("_item2"), vec![ident("_item2"), TokenKind::Eof]);
    }

    // =========================================================================
    // Strings
    // =========================================================================

    #[test]
    fn test_double_quoted_string() {
        assert_eq!(
            kinds("\"hello world\""),
            vec![TokenKind::String("hello world".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_single_quoted_string() {
        assert_eq!(
            kinds("'hi'"),
            vec![TokenKind::String("hi".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\"b\n\\c""#),
            vec![TokenKind::String("a\"b\n\\c".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_string_raw_text_kept() {
        let toks = tokens(r#"'it\'s'"#);
        assert_eq!(toks[0].text, r#"'it\'s'"#);
        assert_eq!(toks[0].kind, TokenKind::String("it's".into()));
    }

    #[test]
    fn test_unterminated_string() {
        let err = Scanner::tokenize("<p title=\"oops></p>").unwrap_err();
        assert!(err.message.contains("Unterminated string"));
        assert_eq!(err.offset, 9);
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 10);
    }

    #[test]
    fn test_string_with_raw_newline() {
        let err = Scanner::tokenize("'a\nb'").unwrap_err();
        assert!(err.message.contains("newline"));
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn test_template_literal_spans_lines() {
        let toks = tokens("`a\n${b}`");
        assert_eq!(toks[0].kind, TokenKind::String("a\n${b}".into()));
        assert_eq!(toks[1].kind, TokenKind::Eof);
    }

    #[test]
    fn test_unterminated_template() {
        assert!(Scanner::tokenize("`abc").is_err());
    }

    // =========================================================================
    // Numbers
    // =========================================================================

    #[test]
    fn test_integer() {
        assert_eq!(kinds("42"), vec![TokenKind::Number(42.0), TokenKind::Eof]);
    }

    #[test]
    fn test_decimal_and_separator() {
        assert_eq!(
            kinds("3.5 1_000"),
            vec![
                TokenKind::Number(3.5),
                TokenKind::Number(1000.0),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_range_is_not_decimal() {
        assert_eq!(
            kinds("1..5"),
            vec![
                TokenKind::Number(1.0),
                TokenKind::Dot,
                TokenKind::Dot,
                TokenKind::Number(5.0),
                TokenKind::Eof,
            ]
        );
    }

    // =========================================================================
    // Text runs
    // =========================================================================

    #[test]
    fn test_text_run_for_unknown_characters() {
        assert_eq!(
            kinds("a + b"),
            vec![
                ident("a"),
                TokenKind::Text("+".into()),
                ident("b"),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_text_run_stops_at_structural() {
        assert_eq!(
            kinds("!==?"),
            vec![
                TokenKind::Text("!".into()),
                TokenKind::Equals,
                TokenKind::Equals,
                TokenKind::Text("?".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_non_ascii_text() {
        assert_eq!(
            kinds("héllo ✓"),
            vec![
                ident("h"),
                TokenKind::Text("é".into()),
                ident("llo"),
                TokenKind::Text("✓".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_control_character_is_error() {
        let err = Scanner::tokenize("a \u{0001}").unwrap_err();
        assert_eq!(err.offset, 2);
    }

    // =========================================================================
    // Comments
    // =========================================================================

    #[test]
    fn test_line_comment_goes_to_side_list() {
        let stream = Scanner::tokenize("a // note\nb").unwrap();
        let k: Vec<_> = stream.tokens.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(k, vec![ident("a"), ident("b"), TokenKind::Eof]);
        assert_eq!(stream.comments.len(), 1);
        assert_eq!(stream.comments[0].kind, TokenKind::Comment("note".into()));
        assert_eq!(stream.comments[0].text, "// note");
    }

    #[test]
    fn test_block_comment() {
        let stream = Scanner::tokenize("a /* x\n y */ b").unwrap();
        assert_eq!(stream.tokens.len(), 3);
        assert_eq!(stream.comments[0].span.end.line, 2);
    }

    #[test]
    fn test_unterminated_block_comment() {
        assert!(Scanner::tokenize("/* open").is_err());
    }

    #[test]
    fn test_extend_trailing_comments() {
        let stream = Scanner::tokenize("a; // one\nb").unwrap();
        let semi = &stream.tokens[1];
        let next = &stream.tokens[2];
        let end = stream.extend_trailing_comments(semi.span.end, next.span.start.offset);
        assert_eq!(end.offset, 9);
    }

    #[test]
    fn test_extend_ignores_next_line_comment() {
        let stream = Scanner::tokenize("a;\n// later\nb").unwrap();
        let semi = &stream.tokens[1];
        let end = stream.extend_trailing_comments(semi.span.end, usize::MAX);
        assert_eq!(end, semi.span.end);
    }

    // =========================================================================
    // Positions
    // =========================================================================

    #[test]
    fn test_positions() {
        let toks = tokens("<a>\n  <b>");
        let b = &toks[4];
        assert_eq!(b.kind, ident("b"));
        assert_eq!(b.span.start, Position::new(7, 2, 4));
        assert_eq!(b.span.end, Position::new(8, 2, 5));
    }

    #[test]
    fn test_byte_offsets_with_multibyte() {
        let toks = tokens("é x");
        let x = &toks[1];
        assert_eq!(x.span.start.offset, 3);
        assert_eq!(x.span.start.column, 3);
    }

    #[test]
    fn test_span_slices_token_text() {
        let source = "var count = 0;";
        for tok in tokens(source) {
            assert_eq!(tok.span.slice(source), tok.text);
        }
    }

    #[test]
    fn test_component_snippet() {
        let k = kinds("export component C() { var n = 0; }");
        assert_eq!(
            k,
            vec![
                TokenKind::Keyword(Keyword::Export),
                TokenKind::Keyword(Keyword::Component),
                ident("C"),
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::Keyword(Keyword::Var),
                ident("n"),
                TokenKind::Equals,
                TokenKind::Number(0.0),
                TokenKind::Semicolon,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    // =========================================================================
    // Style blocks
    // =========================================================================

    #[test]
    fn test_style_content_is_raw() {
        let source = "<style>\n  .a { color: 'red' } /* x */\n</style>";
        let toks = tokens(source);
        assert_eq!(toks[3].kind, TokenKind::Text("\n  .a { color: 'red' } /* x */\n".into()));
        assert_eq!(toks[4].kind, TokenKind::LAngle);
        assert_eq!(toks[5].kind, TokenKind::Slash);
        assert_eq!(toks[6].kind, ident("style"));
    }

    #[test]
    fn test_style_with_apostrophe() {
        let toks = tokens("<style scoped>p::after { content: \"it's\" }</STYLE>");
        assert!(matches!(&toks[4].kind, TokenKind::Text(t) if t.contains("it's")));
    }

    #[test]
    fn test_self_closing_style_is_not_raw() {
        assert_eq!(
            kinds("<style/>{x}"),
            vec![
                TokenKind::LAngle,
                ident("style"),
                TokenKind::Slash,
                TokenKind::RAngle,
                TokenKind::LBrace,
                ident("x"),
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_void_elements() {
        assert!(crate::is_void_element("input"));
        assert!(crate::is_void_element("BR"));
        assert!(!crate::is_void_element("div"));
    }
}
