//! Program parser for owt.
//!
//! Recursive descent over the `owt-lexer` token stream with arbitrary
//! lookahead (`peek_at(n)`). Markup structure is parsed; everything written
//! in the host language (expressions, parameters, type annotations, function
//! bodies) is captured as raw source text through one balanced-group
//! primitive and stored on [`Expr`] nodes untouched.

use std::ops::Range;

use crate::ast::{
    Attribute, AttributeValue, CaseBlock, Component, ElseBranch, Element, Expr, ForBlock,
    FunctionDecl, IfBlock, IfBranch, Import, LoopMeta, Node, Program, RegularAttribute,
    ShorthandAttribute, SlotContent, SlotPlaceholder, SpreadAttribute, StyleBlock, SwitchBlock,
    Text, TopLevel, ValDecl, VarDecl, LOOP_META_FIELDS,
};
use crate::ParseError;
use owt_lexer::{is_void_element, Keyword, Position, Scanner, Span, Token, TokenKind, TokenStream};

/// Where a node list is being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    /// Directly inside a component body: declarations are allowed.
    Body,
    /// Element children and control-block bodies.
    Markup,
}

/// What the token under the cursor starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeStart {
    End,
    ClosingTag,
    Style,
    Element,
    Expr,
    StrayBrace,
    If,
    For,
    Switch,
    SlotContent,
    Declaration,
    Function,
    Text,
}

/// A consumed `open ... close` token group.
struct Group {
    open: Span,
    close: Span,
}

impl Group {
    fn inner(&self) -> Range<usize> {
        self.open.end.offset..self.close.start.offset
    }

    fn span(&self) -> Span {
        self.open.to(self.close)
    }
}

/// owt program parser.
pub struct Parser<'src> {
    source: &'src str,
    stream: TokenStream,
    pos: usize,
}

impl<'src> Parser<'src> {
    /// Create a parser over an already tokenized source.
    pub fn new(source: &'src str, stream: TokenStream) -> Self {
        Self {
            source,
            stream,
            pos: 0,
        }
    }

    /// Tokenize and parse source code into a program AST.
    pub fn parse(source: &str) -> Result<Program, ParseError> {
        let stream = Scanner::tokenize(source)?;
        Parser::new(source, stream).parse_program()
    }

    /// Parse the whole token stream. Unknown top-level tokens are skipped.
    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut imports = Vec::new();
        let mut body = Vec::new();

        while !self.is_at_end() {
            let tok = self.peek();
            let starts_component = tok.is_keyword(Keyword::Component)
                || (tok.is_keyword(Keyword::Export)
                    && self.peek_at(1).is_keyword(Keyword::Component));
            let starts_import = tok.kind == TokenKind::Identifier("import".into());

            if starts_component {
                body.push(TopLevel::Component(self.parse_component()?));
            } else if self.at_style_tag() {
                body.push(TopLevel::Style(self.parse_style_block()?));
            } else if starts_import {
                imports.push(self.parse_import());
            } else {
                self.advance();
            }
        }

        let program = Program {
            imports,
            body,
            span: Span::new(Position::new(0, 1, 1), self.peek().span.end),
        };
        tracing::debug!(
            components = program.components().count(),
            imports = program.imports.len(),
            "parsed program"
        );
        Ok(program)
    }

    // =========================================================================
    // Top level
    // =========================================================================

    /// `import ...` up to a `;` or the module specifier string.
    fn parse_import(&mut self) -> Import {
        let start = self.advance();
        let type_only = self.peek().word() == Some("type");
        let mut end = start.span.end;
        let mut depth = 0usize;

        loop {
            let tok = self.peek().clone();
            match tok.kind {
                TokenKind::Eof => break,
                TokenKind::Semicolon if depth == 0 => {
                    end = self.advance().span.end;
                    break;
                }
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => depth = depth.saturating_sub(1),
                _ => {}
            }
            self.advance();
            end = tok.span.end;
            if depth == 0 && matches!(tok.kind, TokenKind::String(_)) {
                if let Some(semi) = self.eat(&TokenKind::Semicolon) {
                    end = semi.span.end;
                }
                break;
            }
        }

        let span = Span::new(start.span.start, end);
        Import {
            code: span.slice(self.source).to_string(),
            type_only,
            span,
        }
    }

    /// `(export)? component Name(props)? { body }`
    fn parse_component(&mut self) -> Result<Component, ParseError> {
        let start = self.peek().span.start;
        let exported = self.eat_keyword(Keyword::Export);
        self.expect_keyword(Keyword::Component)?;
        let (name, _) = self.expect_identifier("component name")?;

        let props_type_text = if self.check(&TokenKind::LParen) {
            let group = self.balanced(TokenKind::LParen, TokenKind::RParen, "parameter list")?;
            let text = self.source[group.inner()].trim();
            (!text.is_empty()).then(|| text.to_string())
        } else {
            None
        };

        let open = self.expect(TokenKind::LBrace, "'{' to open the component body")?;
        let mut body = Vec::new();
        let mut style: Option<StyleBlock> = None;

        loop {
            match self.node_start(Context::Body) {
                NodeStart::StrayBrace => break,
                NodeStart::End => {
                    return Err(self.error_at(
                        open.span,
                        format!("unclosed component {name}: expected '}}'"),
                    ));
                }
                NodeStart::Style => {
                    let block = self.parse_style_block()?;
                    if style.is_some() {
                        return Err(self.error_at(
                            block.span,
                            format!("component {name} has more than one <style> block"),
                        ));
                    }
                    style = Some(block);
                }
                _ => body.push(self.parse_node(Context::Body)?),
            }
        }

        let close = self.advance();
        let end = self.trailing_end(close.span.end);
        tracing::debug!(component = %name, nodes = body.len(), "parsed component");

        Ok(Component {
            name,
            exported,
            props_type_text,
            body,
            style,
            span: Span::new(start, end),
        })
    }

    /// `<style ...> raw </style>`. The lexer hands over the content as one text token.
    fn parse_style_block(&mut self) -> Result<StyleBlock, ParseError> {
        let open = self.advance(); // <
        self.advance(); // style

        loop {
            match self.peek().kind {
                TokenKind::RAngle => break,
                TokenKind::Slash if self.peek_at(1).kind == TokenKind::RAngle => {
                    self.advance();
                    let gt = self.advance();
                    return Ok(StyleBlock {
                        content: String::new(),
                        span: open.span.to(gt.span),
                    });
                }
                TokenKind::Eof => {
                    return Err(self.error_at(open.span, "unclosed tag <style>".into()));
                }
                _ => {
                    self.advance();
                }
            }
        }
        self.advance(); // >

        let content = match self.peek().kind {
            TokenKind::Text(_) => self.advance().text,
            _ => String::new(),
        };

        let closes = self.check(&TokenKind::LAngle)
            && self.peek_at(1).kind == TokenKind::Slash
            && self
                .peek_at(2)
                .word()
                .is_some_and(|w| w.eq_ignore_ascii_case("style"));
        if !closes {
            return Err(self.error_at(open.span, "unclosed <style> block: expected </style>".into()));
        }
        self.advance();
        self.advance();
        self.advance();
        let gt = self.expect(TokenKind::RAngle, "'>' after </style")?;

        Ok(StyleBlock {
            content,
            span: open.span.to(gt.span),
        })
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    fn node_start(&self, ctx: Context) -> NodeStart {
        let tok = self.peek();
        let next = self.peek_at(1);
        match &tok.kind {
            TokenKind::Eof => NodeStart::End,
            TokenKind::LAngle if next.kind == TokenKind::Slash => NodeStart::ClosingTag,
            TokenKind::LAngle if self.at_style_tag() => NodeStart::Style,
            TokenKind::LAngle if next.word().is_some() => NodeStart::Element,
            TokenKind::LBrace => NodeStart::Expr,
            TokenKind::RBrace => NodeStart::StrayBrace,
            TokenKind::Keyword(Keyword::If) if next.kind == TokenKind::LParen => NodeStart::If,
            TokenKind::Keyword(Keyword::For) if next.kind == TokenKind::LParen => NodeStart::For,
            TokenKind::Keyword(Keyword::Switch) if next.kind == TokenKind::LParen => {
                NodeStart::Switch
            }
            TokenKind::Keyword(Keyword::Slot) if self.at_slot_content() => NodeStart::SlotContent,
            TokenKind::Keyword(Keyword::Var | Keyword::Val) if ctx == Context::Body => {
                NodeStart::Declaration
            }
            TokenKind::Identifier(word)
                if word == "function"
                    && ctx == Context::Body
                    && matches!(next.kind, TokenKind::Identifier(_)) =>
            {
                NodeStart::Function
            }
            _ => NodeStart::Text,
        }
    }

    fn parse_node(&mut self, ctx: Context) -> Result<Node, ParseError> {
        match self.node_start(ctx) {
            NodeStart::End => Err(self.error("unexpected end of input".into())),
            NodeStart::ClosingTag => {
                let name = self.peek_at(2).text.clone();
                Err(self.error(format!("unexpected closing tag </{name}>")))
            }
            NodeStart::StrayBrace => Err(self.error("unexpected '}'".into())),
            NodeStart::Style => {
                let style = self.parse_style_block()?;
                Ok(Node::Element(Element {
                    name: "style".into(),
                    self_closing: false,
                    attributes: Vec::new(),
                    children: vec![Node::Text(Text {
                        value: style.content,
                        span: style.span,
                    })],
                    span: style.span,
                }))
            }
            NodeStart::Element => self.parse_element(),
            NodeStart::Expr => {
                let group = self.balanced(TokenKind::LBrace, TokenKind::RBrace, "expression")?;
                Ok(Node::Expr(self.expr_from(group.inner())))
            }
            NodeStart::If => self.parse_if(),
            NodeStart::For => self.parse_for(),
            NodeStart::Switch => self.parse_switch(),
            NodeStart::SlotContent => self.parse_slot_content(),
            NodeStart::Declaration => self.parse_declaration(),
            NodeStart::Function => self.parse_function(),
            NodeStart::Text => Ok(self.parse_text(ctx)),
        }
    }

    /// A run of tokens with no markup meaning. Inner whitespace is kept as
    /// written; whitespace touching either end collapses to one space.
    fn parse_text(&mut self, ctx: Context) -> Node {
        let first_index = self.pos;
        let first = self.advance();
        let mut last = first.span;
        while self.node_start(ctx) == NodeStart::Text {
            last = self.advance().span;
        }

        let start = first.span.start;
        let end = last.end;
        let mut value = self.code_text(start.offset, end.offset);

        let before = match first_index.checked_sub(1) {
            Some(prev) => self.stream.tokens[prev].span.end.offset,
            None => 0,
        };
        if self.source[before..start.offset].chars().any(char::is_whitespace) {
            value.insert(0, ' ');
        }
        let after = self.peek().span.start.offset;
        if self.source[end.offset..after].chars().any(char::is_whitespace) {
            value.push(' ');
        }

        Node::Text(Text {
            value,
            span: Span::new(start, end),
        })
    }

    // =========================================================================
    // Elements
    // =========================================================================

    fn parse_element(&mut self) -> Result<Node, ParseError> {
        let open = self.advance(); // <
        let (name, _) = self.expect_name("tag name")?;
        let attributes = self.parse_attributes(&name)?;
        let self_closing = self.eat(&TokenKind::Slash).is_some();
        let gt = self.expect(TokenKind::RAngle, &format!("'>' to close <{name}>"))?;

        let is_slot = name.eq_ignore_ascii_case("slot");
        let is_void = is_void_element(&name)
            && name.chars().next().is_some_and(|c| c.is_ascii_lowercase());

        let (children, end) = if self_closing || is_void {
            (Vec::new(), gt.span.end)
        } else {
            self.parse_children(&name, open.span)?
        };
        let span = Span::new(open.span.start, self.trailing_end(end));

        if is_slot {
            let slot_name = attributes.iter().find_map(|attr| match attr {
                Attribute::Regular(RegularAttribute {
                    name,
                    value: Some(AttributeValue::Text(text)),
                    ..
                }) if name == "name" => Some(text.value.clone()),
                _ => None,
            });
            return Ok(Node::SlotPlaceholder(SlotPlaceholder {
                name: slot_name,
                fallback: children,
                span,
            }));
        }

        Ok(Node::Element(Element {
            name,
            self_closing,
            attributes,
            children,
            span,
        }))
    }

    /// Children up to the matching `</name>`. Returns the end of the closing tag.
    fn parse_children(
        &mut self,
        name: &str,
        open: Span,
    ) -> Result<(Vec<Node>, Position), ParseError> {
        let mut children = Vec::new();

        loop {
            match self.node_start(Context::Markup) {
                NodeStart::ClosingTag => {
                    let lt = self.advance();
                    self.advance(); // /
                    let (close_name, _) = self.expect_name("closing tag name")?;
                    let gt = self.expect(TokenKind::RAngle, "'>'")?;
                    if !close_name.eq_ignore_ascii_case(name) {
                        return Err(self.error_at(
                            lt.span.to(gt.span),
                            format!(
                                "mismatched closing tag: expected </{name}> but got </{close_name}>"
                            ),
                        ));
                    }
                    return Ok((children, gt.span.end));
                }
                NodeStart::End => {
                    return Err(self.error_at(open, format!("unclosed tag <{name}>")));
                }
                NodeStart::StrayBrace => {
                    return Err(self.error(format!("unexpected '}}' inside <{name}>")));
                }
                _ => children.push(self.parse_node(Context::Markup)?),
            }
        }
    }

    fn parse_attributes(&mut self, tag: &str) -> Result<Vec<Attribute>, ParseError> {
        let mut attributes = Vec::new();

        loop {
            match self.peek().kind {
                TokenKind::RAngle | TokenKind::Slash => break,
                TokenKind::Eof => return Err(self.error(format!("unclosed tag <{tag}>"))),
                TokenKind::LBrace => attributes.push(self.parse_brace_attribute(tag)?),
                TokenKind::Identifier(_) | TokenKind::Keyword(_) => {
                    attributes.push(self.parse_regular_attribute()?);
                }
                _ => {
                    return Err(self.error(format!(
                        "unexpected {} in <{tag}>",
                        self.describe()
                    )));
                }
            }
        }

        Ok(attributes)
    }

    /// `{...expr}` or `{name}`.
    fn parse_brace_attribute(&mut self, tag: &str) -> Result<Attribute, ParseError> {
        let is_spread = (1..=3).all(|n| self.peek_at(n).kind == TokenKind::Dot);
        if is_spread {
            let dots_end = self.peek_at(3).span.end.offset;
            let group = self.balanced(TokenKind::LBrace, TokenKind::RBrace, "spread attribute")?;
            let argument = self.expr_from(dots_end..group.close.start.offset);
            if argument.code.is_empty() {
                return Err(self.error_at(group.span(), "expected an expression after '...'".into()));
            }
            return Ok(Attribute::Spread(SpreadAttribute {
                argument,
                span: group.span(),
            }));
        }

        if let (TokenKind::Identifier(name), TokenKind::RBrace) =
            (&self.peek_at(1).kind, &self.peek_at(2).kind)
        {
            let name = name.clone();
            let open = self.advance();
            self.advance();
            let close = self.advance();
            return Ok(Attribute::Shorthand(ShorthandAttribute {
                name,
                span: open.span.to(close.span),
            }));
        }

        Err(self.error(format!("expected {{name}} or {{...expr}} in <{tag}>")))
    }

    /// `name`, `name="text"`, `name={expr}`. Namespaced names (`xlink:href`) are joined.
    fn parse_regular_attribute(&mut self) -> Result<Attribute, ParseError> {
        let first = self.advance();
        let mut name = first.text.clone();
        let mut end = first.span;

        while self.check(&TokenKind::Colon)
            && self.peek().span.start.offset == end.end.offset
            && self.peek_at(1).word().is_some()
        {
            self.advance();
            let part = self.advance();
            name.push(':');
            name.push_str(&part.text);
            end = part.span;
        }

        let value = if self.eat(&TokenKind::Equals).is_some() {
            match &self.peek().kind {
                TokenKind::String(text) => {
                    let value = text.clone();
                    let tok = self.advance();
                    end = tok.span;
                    Some(AttributeValue::Text(Text {
                        value,
                        span: tok.span,
                    }))
                }
                TokenKind::LBrace => {
                    let group =
                        self.balanced(TokenKind::LBrace, TokenKind::RBrace, "attribute value")?;
                    end = group.close;
                    Some(AttributeValue::Expr(self.expr_from(group.inner())))
                }
                _ => return Err(self.error(format!("Expected attribute value for '{name}'"))),
            }
        } else {
            None
        };

        Ok(Attribute::Regular(RegularAttribute {
            name,
            value,
            span: first.span.to(end),
        }))
    }

    // =========================================================================
    // Control blocks
    // =========================================================================

    /// `if (test) { ... } (else if (test) { ... })* (else { ... })?`
    fn parse_if(&mut self) -> Result<Node, ParseError> {
        let if_tok = self.advance();
        let test = self.parse_condition("if")?;
        let (consequent, block) = self.parse_block("if block")?;

        let mut branches = vec![IfBranch {
            test,
            consequent,
            span: if_tok.span.to(block),
        }];
        let mut alternate = None;
        let mut end = block;

        while self.peek().is_keyword(Keyword::Else) {
            let else_tok = self.advance();
            if self.eat_keyword(Keyword::If) {
                let test = self.parse_condition("else if")?;
                let (consequent, block) = self.parse_block("else-if block")?;
                branches.push(IfBranch {
                    test,
                    consequent,
                    span: else_tok.span.to(block),
                });
                end = block;
            } else {
                let (consequent, block) = self.parse_block("else block")?;
                alternate = Some(ElseBranch {
                    consequent,
                    span: else_tok.span.to(block),
                });
                end = block;
                break;
            }
        }

        Ok(Node::If(IfBlock {
            branches,
            alternate,
            span: if_tok.span.to(end),
        }))
    }

    /// `for (item of iterable[, meta]) { ... } (empty { ... })?`
    fn parse_for(&mut self) -> Result<Node, ParseError> {
        let for_tok = self.advance();
        let lparen = self.expect(TokenKind::LParen, "'(' after 'for'")?;

        let item = match &self.peek().kind {
            TokenKind::Identifier(name) => name.clone(),
            _ => return Err(self.error("invalid for(...) header: expected loop variable".into())),
        };
        self.advance();
        if self.peek().word() != Some("of") {
            return Err(self.error("invalid for(...) header: expected 'of'".into()));
        }
        self.advance();

        let iter_start = self.peek().span.start.offset;
        let mut iter_end = iter_start;
        let mut depth = 0usize;
        loop {
            let tok = self.peek();
            match tok.kind {
                TokenKind::Eof => {
                    return Err(self.error_at(lparen.span, "invalid for(...) header: missing ')'".into()));
                }
                TokenKind::Comma | TokenKind::RParen if depth == 0 => break,
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth = depth.saturating_sub(1)
                }
                _ => {}
            }
            iter_end = tok.span.end.offset;
            self.advance();
        }
        if iter_end == iter_start {
            return Err(self.error("invalid for(...) header: missing iterable".into()));
        }
        let iterable = self.expr_from(iter_start..iter_end);

        let meta = if self.eat(&TokenKind::Comma).is_some() {
            Some(self.parse_loop_meta()?)
        } else {
            None
        };
        if self.eat(&TokenKind::RParen).is_none() {
            return Err(self.error("invalid for-loop meta clause: expected ')'".into()));
        }

        let (body, block) = self.parse_block("for block")?;
        let mut end = block;
        let empty = if self.peek().is_keyword(Keyword::Empty)
            && self.peek_at(1).kind == TokenKind::LBrace
        {
            self.advance();
            let (nodes, block) = self.parse_block("empty block")?;
            end = block;
            Some(nodes)
        } else {
            None
        };

        Ok(Node::For(ForBlock {
            item,
            iterable,
            meta,
            body,
            empty,
            span: for_tok.span.to(end),
        }))
    }

    /// `meta` or `{ index, last, ... }`
    fn parse_loop_meta(&mut self) -> Result<LoopMeta, ParseError> {
        match self.peek().kind.clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(LoopMeta::Ident(name))
            }
            TokenKind::LBrace => {
                self.advance();
                let mut names = Vec::new();
                loop {
                    let field = match self.peek().kind.clone() {
                        TokenKind::Identifier(name) => name,
                        TokenKind::RBrace if !names.is_empty() => {
                            self.advance();
                            break;
                        }
                        _ => {
                            return Err(self.error(
                                "invalid for-loop meta clause: expected a field name".into(),
                            ));
                        }
                    };
                    if !LOOP_META_FIELDS.contains(&field.as_str()) {
                        return Err(self.error(format!(
                            "invalid for-loop meta clause: unknown field '{field}'"
                        )));
                    }
                    self.advance();
                    names.push(field);

                    if self.eat(&TokenKind::Comma).is_none() {
                        if self.eat(&TokenKind::RBrace).is_some() {
                            break;
                        }
                        return Err(self.error("invalid for-loop meta clause: expected ',' or '}'".into()));
                    }
                }
                Ok(LoopMeta::Destructured(names))
            }
            _ => Err(self.error(
                "invalid for-loop meta clause: expected an identifier or {...}".into(),
            )),
        }
    }

    /// `switch (expr) { case p [if (g)] { ... } default { ... } }`
    fn parse_switch(&mut self) -> Result<Node, ParseError> {
        let switch_tok = self.advance();
        let discriminant = self.parse_condition("switch")?;
        let open = self.expect(TokenKind::LBrace, "'{' to open switch cases")?;

        let mut cases = Vec::new();
        let mut default_case = None;

        let close = loop {
            let tok = self.peek();
            if tok.is_keyword(Keyword::Case) {
                cases.push(self.parse_case()?);
            } else if tok.is_keyword(Keyword::Default) {
                let default_tok = self.advance();
                if default_case.is_some() {
                    return Err(self.error_at(default_tok.span, "switch has more than one default".into()));
                }
                default_case = Some(self.parse_block("default block")?.0);
            } else if tok.kind == TokenKind::RBrace {
                break self.advance();
            } else if tok.kind == TokenKind::Eof {
                return Err(self.error_at(open.span, "unclosed switch: expected '}'".into()));
            } else {
                return Err(self.error(format!(
                    "expected 'case', 'default' or '}}' in switch, found {}",
                    self.describe()
                )));
            }
        };

        Ok(Node::Switch(SwitchBlock {
            discriminant,
            cases,
            default_case,
            span: switch_tok.span.to(close.span),
        }))
    }

    fn parse_case(&mut self) -> Result<CaseBlock, ParseError> {
        let case_tok = self.advance();

        let start = self.peek().span.start.offset;
        let mut end = start;
        let mut depth = 0usize;
        loop {
            let tok = self.peek();
            match tok.kind {
                TokenKind::Eof => {
                    return Err(self.error_at(case_tok.span, "unterminated case pattern".into()));
                }
                TokenKind::LBrace if depth == 0 => break,
                TokenKind::Keyword(Keyword::If) if depth == 0 => break,
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth = depth.saturating_sub(1)
                }
                _ => {}
            }
            end = tok.span.end.offset;
            self.advance();
        }
        if end == start {
            return Err(self.error_at(case_tok.span, "expected a case pattern".into()));
        }
        let pattern = self.expr_from(start..end);

        let guard = if self.eat_keyword(Keyword::If) {
            Some(self.parse_condition("case guard")?)
        } else {
            None
        };
        let (body, block) = self.parse_block("case block")?;

        Ok(CaseBlock {
            pattern,
            guard,
            body,
            span: case_tok.span.to(block),
        })
    }

    /// `slot [name] { ... }`
    fn parse_slot_content(&mut self) -> Result<Node, ParseError> {
        let slot_tok = self.advance();
        let name = match &self.peek().kind {
            TokenKind::String(name) => Some(name.clone()),
            TokenKind::LBrace => None,
            _ => self.peek().word().map(str::to_string),
        };
        if name.is_some() {
            self.advance();
        }
        let (body, block) = self.parse_block("slot content")?;

        Ok(Node::SlotContent(SlotContent {
            name,
            body,
            span: slot_tok.span.to(block),
        }))
    }

    /// `( expr )` of a control block. The expression must not be empty.
    fn parse_condition(&mut self, what: &str) -> Result<Expr, ParseError> {
        if !self.check(&TokenKind::LParen) {
            return Err(self.error(format!("malformed {what} header: expected '('")));
        }
        let group = self.balanced(TokenKind::LParen, TokenKind::RParen, &format!("{what} header"))?;
        let expr = self.expr_from(group.inner());
        if expr.code.is_empty() {
            return Err(self.error_at(group.span(), format!("malformed {what} header: empty expression")));
        }
        Ok(expr)
    }

    /// `{ nodes }` in markup context.
    fn parse_block(&mut self, what: &str) -> Result<(Vec<Node>, Span), ParseError> {
        let open = self.expect(TokenKind::LBrace, &format!("'{{' to open {what}"))?;
        let mut nodes = Vec::new();

        loop {
            match self.node_start(Context::Markup) {
                NodeStart::StrayBrace => {
                    let close = self.advance();
                    return Ok((nodes, open.span.to(close.span)));
                }
                NodeStart::End => {
                    return Err(self.error_at(open.span, format!("unclosed {what}: expected '}}'")));
                }
                _ => nodes.push(self.parse_node(Context::Markup)?),
            }
        }
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    /// `var name[: type] [= init];` / `val name[: type] = init;`
    fn parse_declaration(&mut self) -> Result<Node, ParseError> {
        let keyword = self.advance();
        let is_val = keyword.is_keyword(Keyword::Val);
        let (name, name_span) =
            self.expect_identifier(if is_val { "val name" } else { "var name" })?;
        let mut end = name_span.end;

        let ts_type_text = if let Some(colon) = self.eat(&TokenKind::Colon) {
            let range = self.capture_type_annotation();
            let text = self.source[range.clone()].trim();
            if text.is_empty() {
                return Err(self.error_at(colon.span, "expected a type after ':'".into()));
            }
            end = self.locate(range.end);
            Some(text.to_string())
        } else {
            None
        };

        let init = if let Some(eq) = self.eat(&TokenKind::Equals) {
            let range = self.capture_statement();
            let expr = self.expr_from(range);
            if expr.code.is_empty() {
                return Err(self.error_at(eq.span, "expected an initializer after '='".into()));
            }
            end = expr.span.end;
            Some(expr)
        } else {
            None
        };

        if let Some(semi) = self.eat(&TokenKind::Semicolon) {
            end = semi.span.end;
        }
        let span = Span::new(keyword.span.start, self.trailing_end(end));

        if is_val {
            let Some(init) = init else {
                return Err(self.error_at(
                    keyword.span.to(name_span),
                    format!("val '{name}' requires an initializer"),
                ));
            };
            return Ok(Node::ValDecl(ValDecl {
                name,
                ts_type_text,
                init,
                span,
            }));
        }

        Ok(Node::VarDecl(VarDecl {
            name,
            ts_type_text,
            init,
            span,
        }))
    }

    /// `function name(params)[: type] { body }`
    fn parse_function(&mut self) -> Result<Node, ParseError> {
        let keyword = self.advance();
        let (name, _) = self.expect_identifier("function name")?;

        if !self.check(&TokenKind::LParen) {
            return Err(self.error(format!("expected '(' after function {name}")));
        }
        let params = self.balanced(TokenKind::LParen, TokenKind::RParen, "parameter list")?;
        let params = self.source[params.inner()].trim().to_string();

        let return_type_text = if let Some(colon) = self.eat(&TokenKind::Colon) {
            let start = self.peek().span.start.offset;
            let mut end = start;
            let mut depth = 0usize;
            loop {
                let tok = self.peek();
                match tok.kind {
                    TokenKind::Eof => {
                        return Err(self.error_at(colon.span, "expected function body".into()));
                    }
                    TokenKind::LBrace if depth == 0 => break,
                    TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                    TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                        depth = depth.saturating_sub(1)
                    }
                    _ => {}
                }
                end = tok.span.end.offset;
                self.advance();
            }
            let text = self.source[start..end].trim();
            if text.is_empty() {
                return Err(self.error_at(colon.span, "expected a return type after ':'".into()));
            }
            Some(text.to_string())
        } else {
            None
        };

        if !self.check(&TokenKind::LBrace) {
            return Err(self.error(format!("expected '{{' to open the body of {name}")));
        }
        let body = self.balanced(TokenKind::LBrace, TokenKind::RBrace, "function body")?;
        let span = Span::new(keyword.span.start, self.trailing_end(body.close.end));

        Ok(Node::FunctionDecl(FunctionDecl {
            name,
            params,
            return_type_text,
            body: self.verbatim_expr(body.inner()),
            span,
        }))
    }

    /// Tokens of a type annotation, up to `=` (arrows excluded), `;`, or the statement end.
    fn capture_type_annotation(&mut self) -> Range<usize> {
        let start = self.peek().span.start.offset;
        let mut end = start;
        let mut depth = 0usize;

        loop {
            let tok = self.peek();
            let next = self.peek_at(1);
            match tok.kind {
                TokenKind::Eof => break,
                TokenKind::Equals
                    if next.kind == TokenKind::RAngle
                        && next.span.start.offset == tok.span.end.offset =>
                {
                    end = next.span.end.offset;
                    self.advance();
                    self.advance();
                    continue;
                }
                TokenKind::Equals | TokenKind::Semicolon if depth == 0 => break,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace if depth == 0 => break,
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => depth -= 1,
                _ => {}
            }
            end = tok.span.end.offset;
            self.advance();
        }

        start..end
    }

    /// Tokens of an initializer: up to a top-level `;`, the enclosing `}`,
    /// or a new line that starts another statement.
    fn capture_statement(&mut self) -> Range<usize> {
        let start = self.peek().span.start.offset;
        let mut end = start;
        let mut last_line = self.peek().span.start.line;
        let mut depth = 0usize;

        loop {
            let tok = self.peek();
            if depth == 0 && end > start && tok.span.start.line > last_line {
                let starts_statement = matches!(
                    self.node_start(Context::Body),
                    NodeStart::Element
                        | NodeStart::Style
                        | NodeStart::Declaration
                        | NodeStart::Function
                        | NodeStart::If
                        | NodeStart::For
                        | NodeStart::Switch
                );
                if starts_statement {
                    break;
                }
            }
            match tok.kind {
                TokenKind::Eof => break,
                TokenKind::Semicolon if depth == 0 => break,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace if depth == 0 => break,
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => depth -= 1,
                _ => {}
            }
            end = tok.span.end.offset;
            last_line = tok.span.end.line;
            self.advance();
        }

        start..end
    }

    // =========================================================================
    // Raw capture
    // =========================================================================

    /// Consume a balanced `open ... close` group starting at the cursor.
    fn balanced(&mut self, open: TokenKind, close: TokenKind, what: &str) -> Result<Group, ParseError> {
        let first = self.advance();
        let mut depth = 1usize;

        loop {
            let tok = self.advance();
            if tok.kind == TokenKind::Eof {
                return Err(self.error_at(first.span, format!("unterminated {what}")));
            }
            if tok.kind == open {
                depth += 1;
            } else if tok.kind == close {
                depth -= 1;
                if depth == 0 {
                    return Ok(Group {
                        open: first.span,
                        close: tok.span,
                    });
                }
            }
        }
    }

    /// Expression over a source range. The span runs from the first to the
    /// last token inside the range; comments are blanked out of the code.
    fn expr_from(&self, range: Range<usize>) -> Expr {
        let tokens = &self.stream.tokens;
        let first = tokens.partition_point(|t| t.span.start.offset < range.start);
        let mut inside = tokens[first..]
            .iter()
            .take_while(|t| t.kind != TokenKind::Eof && t.span.end.offset <= range.end);

        let Some(head) = inside.next() else {
            let at = self.locate(range.start);
            return Expr {
                code: String::new(),
                span: Span::new(at, at),
            };
        };
        let tail = inside.last().unwrap_or(head);
        let span = head.span.to(tail.span);

        Expr {
            code: self.code_text(span.start.offset, span.end.offset),
            span,
        }
    }

    /// Expression over a source range, comments kept.
    fn verbatim_expr(&self, range: Range<usize>) -> Expr {
        let (start, end) = self.trim_range(range);
        Expr {
            code: self.source[start..end].to_string(),
            span: Span::new(self.locate(start), self.locate(end)),
        }
    }

    fn trim_range(&self, range: Range<usize>) -> (usize, usize) {
        let raw = &self.source[range.clone()];
        let start = range.start + (raw.len() - raw.trim_start().len());
        let end = (range.end - (raw.len() - raw.trim_end().len())).max(start);
        (start, end)
    }

    /// Source text between two offsets with every comment replaced by a space.
    fn code_text(&self, start: usize, end: usize) -> String {
        let comments = &self.stream.comments;
        let first = comments.partition_point(|c| c.span.start.offset < start);
        let mut out = String::new();
        let mut cursor = start;

        for comment in &comments[first..] {
            if comment.span.start.offset >= end {
                break;
            }
            out.push_str(&self.source[cursor..comment.span.start.offset]);
            out.push(' ');
            cursor = comment.span.end.offset.min(end);
        }
        out.push_str(&self.source[cursor..end]);
        out.trim().to_string()
    }

    /// Line and column of a byte offset, walking forward from the nearest token.
    fn locate(&self, offset: usize) -> Position {
        let tokens = &self.stream.tokens;
        let idx = tokens.partition_point(|t| t.span.start.offset <= offset);
        let mut pos = match idx.checked_sub(1) {
            Some(i) => tokens[i].span.start,
            None => Position::new(0, 1, 1),
        };

        for c in self.source.get(pos.offset..offset).unwrap_or("").chars() {
            if c == '\n' {
                pos.line += 1;
                pos.column = 1;
            } else {
                pos.column += 1;
            }
            pos.offset += c.len_utf8();
        }
        pos
    }

    fn trailing_end(&self, end: Position) -> Position {
        self.stream
            .extend_trailing_comments(end, self.peek().span.start.offset)
    }

    // =========================================================================
    // Token navigation helpers
    // =========================================================================

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> &Token {
        static EOF: std::sync::LazyLock<Token> =
            std::sync::LazyLock::new(|| Token::new(TokenKind::Eof, "", Span::default()));
        self.stream
            .tokens
            .get(self.pos + n)
            .or_else(|| self.stream.tokens.last())
            .unwrap_or(&EOF)
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.stream.tokens.len() && tok.kind != TokenKind::Eof {
            self.pos += 1;
        }
        tok
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> Option<Token> {
        self.check(kind).then(|| self.advance())
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        self.eat(&TokenKind::Keyword(keyword)).is_some()
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected {what}, found {}", self.describe())))
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<Token, ParseError> {
        self.expect(TokenKind::Keyword(keyword), &format!("'{}'", keyword.as_str()))
    }

    fn expect_identifier(&mut self, what: &str) -> Result<(String, Span), ParseError> {
        if let TokenKind::Identifier(name) = &self.peek().kind {
            let name = name.clone();
            let span = self.advance().span;
            Ok((name, span))
        } else {
            Err(self.error(format!("expected {what}, found {}", self.describe())))
        }
    }

    /// An identifier or a keyword used as a name (`<slot>`, `for="id"`).
    fn expect_name(&mut self, what: &str) -> Result<(String, Span), ParseError> {
        match self.peek().word() {
            Some(word) => {
                let word = word.to_string();
                let span = self.advance().span;
                Ok((word, span))
            }
            None => Err(self.error(format!("expected {what}, found {}", self.describe()))),
        }
    }

    fn at_style_tag(&self) -> bool {
        self.check(&TokenKind::LAngle)
            && self
                .peek_at(1)
                .word()
                .is_some_and(|w| w.eq_ignore_ascii_case("style"))
    }

    fn at_slot_content(&self) -> bool {
        let next = self.peek_at(1);
        next.kind == TokenKind::LBrace
            || ((next.word().is_some() || matches!(next.kind, TokenKind::String(_)))
                && self.peek_at(2).kind == TokenKind::LBrace)
    }

    fn describe(&self) -> String {
        match &self.peek().kind {
            TokenKind::Eof => "end of input".into(),
            _ => format!("'{}'", self.peek().text),
        }
    }

    fn error(&self, message: String) -> ParseError {
        self.error_at(self.peek().span, message)
    }

    fn error_at(&self, span: Span, message: String) -> ParseError {
        ParseError { message, span }
    }
}

/// Split a props clause into its binding pattern and type annotation.
///
/// The separating `:` is the first one outside any bracket pair or string,
/// so `{ user: { name } }: Props` splits after the closing brace.
pub fn split_props_clause(text: &str) -> (&str, Option<&str>) {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut prev = '\0';

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if c == q && prev != '\\' {
                quote = None;
            }
            prev = c;
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '(' | '[' | '{' | '<' => depth += 1,
            '>' if prev == '=' => {}
            ')' | ']' | '}' | '>' => depth -= 1,
            ':' if depth == 0 => {
                let pattern = text[..i].trim().trim_end_matches('?').trim_end();
                let ty = text[i + 1..].trim();
                return (pattern, (!ty.is_empty()).then_some(ty));
            }
            _ => {}
        }
        prev = c;
    }

    (text.trim(), None)
}
