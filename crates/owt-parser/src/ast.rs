//! Abstract Syntax Tree for owt.
//!
//! A closed set of node types. Every node owns the [`Span`] of its exact
//! source extent; consumers match exhaustively so a new variant cannot be
//! silently dropped by the analyzer or the generator.

use owt_lexer::Span;
use serde::Serialize;

/// A complete `.owt` file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    /// Top-level `import ...` statements, in source order.
    pub imports: Vec<Import>,
    pub body: Vec<TopLevel>,
    pub span: Span,
}

impl Program {
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.body.iter().filter_map(|item| match item {
            TopLevel::Component(c) => Some(c),
            TopLevel::Style(_) => None,
        })
    }
}

/// An `import` statement copied through to the output verbatim.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Import {
    pub code: String,
    /// `import type ...`, erased from the output.
    pub type_only: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum TopLevel {
    Component(Component),
    Style(StyleBlock),
}

/// `(export)? component Name(props) { ... }`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Component {
    pub name: String,
    pub exported: bool,
    /// Raw text between the parentheses of the header, if any.
    pub props_type_text: Option<String>,
    pub body: Vec<Node>,
    pub style: Option<StyleBlock>,
    pub span: Span,
}

impl Component {
    /// The binding pattern of the props clause: `{ a, b }` in `({ a, b }: Props)`.
    pub fn props_pattern(&self) -> Option<&str> {
        let text = self.props_type_text.as_deref()?;
        let (pattern, _) = crate::parser::split_props_clause(text);
        (!pattern.is_empty()).then_some(pattern)
    }

    /// The type annotation of the props clause, if written.
    pub fn props_type(&self) -> Option<&str> {
        let text = self.props_type_text.as_deref()?;
        crate::parser::split_props_clause(text).1
    }
}

/// A node in a component body, block body, or element's children.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Node {
    /// An HTML element, or a component invocation when the name is capitalized.
    Element(Element),

    /// Literal text between tags.
    Text(Text),

    /// A `{expr}` interpolation.
    Expr(Expr),

    /// `var name[: type] [= init];`, mutable reactive state.
    VarDecl(VarDecl),

    /// `val name[: type] = init;`, a derived read-only value.
    ValDecl(ValDecl),

    /// `function name(params)[: type] { body }`
    FunctionDecl(FunctionDecl),

    If(IfBlock),
    For(ForBlock),
    Switch(SwitchBlock),

    /// `<slot/>` or `<slot name="x">fallback</slot>` inside a component body.
    SlotPlaceholder(SlotPlaceholder),

    /// `slot name { ... }` passed to a component invocation.
    SlotContent(SlotContent),
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::Element(n) => n.span,
            Node::Text(n) => n.span,
            Node::Expr(n) => n.span,
            Node::VarDecl(n) => n.span,
            Node::ValDecl(n) => n.span,
            Node::FunctionDecl(n) => n.span,
            Node::If(n) => n.span,
            Node::For(n) => n.span,
            Node::Switch(n) => n.span,
            Node::SlotPlaceholder(n) => n.span,
            Node::SlotContent(n) => n.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Element {
    pub name: String,
    pub self_closing: bool,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
    pub span: Span,
}

impl Element {
    /// Capitalized names invoke another component instead of creating a tag.
    pub fn is_component(&self) -> bool {
        self.name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Attribute {
    /// `name`, `name="text"` or `name={expr}`.
    Regular(RegularAttribute),
    /// `{name}`, value looked up by name in the enclosing scope.
    Shorthand(ShorthandAttribute),
    /// `{...expr}`
    Spread(SpreadAttribute),
}

impl Attribute {
    pub fn span(&self) -> Span {
        match self {
            Attribute::Regular(a) => a.span,
            Attribute::Shorthand(a) => a.span,
            Attribute::Spread(a) => a.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegularAttribute {
    pub name: String,
    /// `None` is a boolean-true flag.
    pub value: Option<AttributeValue>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum AttributeValue {
    Text(Text),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShorthandAttribute {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpreadAttribute {
    pub argument: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Text {
    pub value: String,
    pub span: Span,
}

/// Opaque host-language code. Never re-parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expr {
    pub code: String,
    pub span: Span,
}

impl Expr {
    /// The identifier, when the whole expression is exactly one.
    pub fn bare_identifier(&self) -> Option<&str> {
        let code = self.code.trim();
        let mut chars = code.chars();
        let first = chars.next()?;
        let starts = first.is_ascii_alphabetic() || first == '_' || first == '$';
        let rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
        (starts && rest).then_some(code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarDecl {
    pub name: String,
    pub ts_type_text: Option<String>,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValDecl {
    pub name: String,
    pub ts_type_text: Option<String>,
    pub init: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDecl {
    pub name: String,
    /// Parameter list as written, without the parentheses.
    pub params: String,
    pub return_type_text: Option<String>,
    pub body: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IfBlock {
    /// `if` followed by every `else if`. Never empty.
    pub branches: Vec<IfBranch>,
    pub alternate: Option<ElseBranch>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IfBranch {
    pub test: Expr,
    pub consequent: Vec<Node>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElseBranch {
    pub consequent: Vec<Node>,
    pub span: Span,
}

/// `for (item of iterable[, meta]) { body } [empty { ... }]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForBlock {
    pub item: String,
    pub iterable: Expr,
    pub meta: Option<LoopMeta>,
    pub body: Vec<Node>,
    pub empty: Option<Vec<Node>>,
    pub span: Span,
}

/// How per-iteration metadata is bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LoopMeta {
    /// `for (x of xs, meta)`
    Ident(String),
    /// `for (x of xs, { index, last })`
    Destructured(Vec<String>),
}

/// Fields available on loop metadata.
pub const LOOP_META_FIELDS: &[&str] = &["index", "first", "last", "even", "odd"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotPlaceholder {
    pub name: Option<String>,
    /// Children rendered when the caller supplies nothing for this slot.
    pub fallback: Vec<Node>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotContent {
    pub name: Option<String>,
    pub body: Vec<Node>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchBlock {
    pub discriminant: Expr,
    pub cases: Vec<CaseBlock>,
    pub default_case: Option<Vec<Node>>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseBlock {
    /// Matched with `===` against the discriminant.
    pub pattern: Expr,
    pub guard: Option<Expr>,
    pub body: Vec<Node>,
    pub span: Span,
}

/// `<style>` content, verbatim.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StyleBlock {
    pub content: String,
    pub span: Span,
}
