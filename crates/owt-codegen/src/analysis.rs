//! Reactivity analysis.
//!
//! Classifies a component's declarations into mutable `var` state and derived
//! `val` values, then computes for every dynamic point of the markup the set
//! of vars whose change must refresh it. The generator reads the result and
//! never rediscovers dependencies on its own.
//!
//! Dependency discovery is textual: any identifier outside string literals
//! and comments that matches a declared name counts, whatever scope it sits
//! in.

use std::collections::HashMap;

use owt_lexer::Span;
use owt_parser::ast::{Attribute, AttributeValue, Component, Expr, Node};

use crate::handlers::event_name;
use crate::script;

/// A `var` initializer that reads other reactive state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error(
    "Reactivity error at line {}, column {}: {}",
    .span.start.line,
    .span.start.column,
    violation_message(.variable, .references)
)]
pub struct ReactivityViolation {
    pub variable: String,
    pub references: Vec<String>,
    pub span: Span,
}

impl ReactivityViolation {
    pub fn message(&self) -> String {
        violation_message(&self.variable, &self.references)
    }
}

fn violation_message(variable: &str, references: &[String]) -> String {
    format!(
        "var '{variable}' initializer references reactive var(s) {}; use 'val' for derived state",
        references.join(", ")
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValInfo {
    pub name: String,
    pub init: Expr,
    /// Vars this val reads, directly or through other vals.
    pub deps: Vec<String>,
}

/// Analysis result for one component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reactivity {
    /// Declared vars, in declaration order.
    pub vars: Vec<String>,
    pub vals: Vec<ValInfo>,
    /// Subscriber set of each dynamic point, keyed by the span of the
    /// expression, attribute or control block.
    bindings: HashMap<Span, Vec<String>>,
}

impl Reactivity {
    pub fn is_var(&self, name: &str) -> bool {
        self.vars.iter().any(|v| v == name)
    }

    pub fn is_val(&self, name: &str) -> bool {
        self.val(name).is_some()
    }

    pub fn val(&self, name: &str) -> Option<&ValInfo> {
        self.vals.iter().find(|v| v.name == name)
    }

    /// Vars the dynamic point at `span` subscribes to. Empty means static.
    pub fn deps_of(&self, span: Span) -> &[String] {
        self.bindings.get(&span).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Keep the vars of `names`, in declaration order.
    fn ordered(&self, names: &[String]) -> Vec<String> {
        self.vars
            .iter()
            .filter(|v| names.contains(v))
            .cloned()
            .collect()
    }

    /// Vars named in `code`, with vals expanded to their own deps.
    fn referenced_vars(&self, code: &str) -> Vec<String> {
        let mut found = Vec::new();
        for ident in script::identifiers(code) {
            if self.is_var(ident.name) {
                found.push(ident.name.to_string());
            } else if let Some(val) = self.val(ident.name) {
                found.extend(val.deps.iter().cloned());
            }
        }
        self.ordered(&found)
    }

    /// Subscribers of a markup expression: the var itself, a val's deps,
    /// nothing for any other name, and every var for a computed expression.
    fn expr_deps(&self, code: &str) -> Vec<String> {
        let code = code.trim();
        let bare = Expr {
            code: code.to_string(),
            span: Span::default(),
        };
        match bare.bare_identifier() {
            Some(name) if self.is_var(name) => vec![name.to_string()],
            Some(name) => self.val(name).map(|v| v.deps.clone()).unwrap_or_default(),
            None => self.vars.clone(),
        }
    }
}

/// Analyze one component.
pub fn analyze(component: &Component) -> Result<Reactivity, ReactivityViolation> {
    let mut reactivity = Reactivity::default();
    let mut val_decls = Vec::new();

    for node in &component.body {
        match node {
            Node::VarDecl(decl) => reactivity.vars.push(decl.name.clone()),
            Node::ValDecl(decl) => val_decls.push(decl),
            _ => {}
        }
    }

    for node in &component.body {
        let Node::VarDecl(decl) = node else { continue };
        let Some(init) = &decl.init else { continue };

        let mut references: Vec<String> = Vec::new();
        for ident in script::identifiers(&init.code) {
            if reactivity.is_var(ident.name) && !references.iter().any(|r| r == ident.name) {
                references.push(ident.name.to_string());
            }
        }
        if !references.is_empty() {
            return Err(ReactivityViolation {
                variable: decl.name.clone(),
                references,
                span: decl.span,
            });
        }
    }

    for decl in &val_decls {
        let mut visited = Vec::new();
        let deps = val_deps(&reactivity, &val_decls, &decl.name, &mut visited);
        reactivity.vals.push(ValInfo {
            name: decl.name.clone(),
            init: decl.init.clone(),
            deps: reactivity.ordered(&deps),
        });
    }

    let mut top = Vec::new();
    walk(&mut reactivity, &component.body, &mut top);

    tracing::trace!(
        component = %component.name,
        vars = ?reactivity.vars,
        bindings = reactivity.bindings.len(),
        "reactivity analyzed"
    );
    Ok(reactivity)
}

fn val_deps(
    reactivity: &Reactivity,
    vals: &[&owt_parser::ast::ValDecl],
    name: &str,
    visited: &mut Vec<String>,
) -> Vec<String> {
    if visited.iter().any(|v| v == name) {
        return Vec::new();
    }
    visited.push(name.to_string());

    let Some(decl) = vals.iter().find(|v| v.name == name) else {
        return Vec::new();
    };
    let mut deps = Vec::new();
    for ident in script::identifiers(&decl.init.code) {
        if reactivity.is_var(ident.name) {
            deps.push(ident.name.to_string());
        } else if vals.iter().any(|v| v.name == ident.name) {
            deps.extend(val_deps(reactivity, vals, ident.name, visited));
        }
    }
    deps
}

// =============================================================================
// Binding collection
// =============================================================================

/// Record every dynamic point under `nodes` and add their subscribers to `acc`.
fn walk(reactivity: &mut Reactivity, nodes: &[Node], acc: &mut Vec<String>) {
    for node in nodes {
        match node {
            Node::Element(element) => {
                for attribute in &element.attributes {
                    attribute_deps(reactivity, attribute, element.is_component(), acc);
                }
                walk(reactivity, &element.children, acc);
            }
            Node::Expr(expr) => {
                let deps = reactivity.expr_deps(&expr.code);
                acc.extend(deps.iter().cloned());
                reactivity.bindings.insert(expr.span, deps);
            }
            Node::If(block) => {
                let mut inner = Vec::new();
                for branch in &block.branches {
                    inner.extend(reactivity.referenced_vars(&branch.test.code));
                    walk(reactivity, &branch.consequent, &mut inner);
                }
                if let Some(alternate) = &block.alternate {
                    walk(reactivity, &alternate.consequent, &mut inner);
                }
                region(reactivity, block.span, inner, acc);
            }
            Node::For(block) => {
                let mut inner = reactivity.referenced_vars(&block.iterable.code);
                walk(reactivity, &block.body, &mut inner);
                if let Some(empty) = &block.empty {
                    walk(reactivity, empty, &mut inner);
                }
                region(reactivity, block.span, inner, acc);
            }
            Node::Switch(block) => {
                let mut inner = reactivity.referenced_vars(&block.discriminant.code);
                for case in &block.cases {
                    inner.extend(reactivity.referenced_vars(&case.pattern.code));
                    if let Some(guard) = &case.guard {
                        inner.extend(reactivity.referenced_vars(&guard.code));
                    }
                    walk(reactivity, &case.body, &mut inner);
                }
                if let Some(default) = &block.default_case {
                    walk(reactivity, default, &mut inner);
                }
                region(reactivity, block.span, inner, acc);
            }
            Node::SlotPlaceholder(slot) => walk(reactivity, &slot.fallback, acc),
            Node::SlotContent(slot) => walk(reactivity, &slot.body, acc),
            Node::Text(_) | Node::VarDecl(_) | Node::ValDecl(_) | Node::FunctionDecl(_) => {}
        }
    }
}

fn region(reactivity: &mut Reactivity, span: Span, inner: Vec<String>, acc: &mut Vec<String>) {
    let deps = reactivity.ordered(&inner);
    acc.extend(deps.iter().cloned());
    reactivity.bindings.insert(span, deps);
}

fn attribute_deps(
    reactivity: &mut Reactivity,
    attribute: &Attribute,
    on_component: bool,
    acc: &mut Vec<String>,
) {
    let (deps, span) = match attribute {
        Attribute::Regular(attr) => {
            let Some(AttributeValue::Expr(expr)) = &attr.value else { return };
            if event_name(&attr.name).is_some() {
                return;
            }
            (reactivity.expr_deps(&expr.code), attr.span)
        }
        Attribute::Shorthand(attr) => {
            if event_name(&attr.name).is_some() {
                return;
            }
            (reactivity.expr_deps(&attr.name), attr.span)
        }
        Attribute::Spread(attr) => {
            acc.extend(reactivity.expr_deps(&attr.argument.code));
            return;
        }
    };
    acc.extend(deps.iter().cloned());
    if !on_component {
        reactivity.bindings.insert(span, deps);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use owt_parser::Parser;
    use pretty_assertions::assert_eq;

    fn first_component(source: &str) -> Component {
        let program = Parser::parse(source).unwrap();
        let component = program.components().next().unwrap().clone();
        component
    }

    fn analyze_ok(source: &str) -> (Component, Reactivity) {
        let component = first_component(source);
        let reactivity = analyze(&component).unwrap();
        (component, reactivity)
    }

    fn sorted(mut names: Vec<String>) -> Vec<String> {
        names.sort();
        names
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    #[test]
    fn test_vars_in_declaration_order() {
        let (_, r) = analyze_ok("component A() { var b = 1; var a = 2; val c = a; }");
        assert_eq!(r.vars, vec!["b", "a"]);
        assert!(r.is_val("c"));
        assert!(!r.is_var("c"));
    }

    #[test]
    fn test_val_dependency_set() {
        let (_, r) = analyze_ok(
            "component A() { var count = 1; var price = 2; var other = 3; val total = count * price; }",
        );
        assert_eq!(sorted(r.val("total").unwrap().deps.clone()), vec!["count", "price"]);
    }

    #[test]
    fn test_val_deps_are_transitive() {
        let (_, r) = analyze_ok(
            "component A() { var x = 1; var y = 2; val a = x + 1; val b = a * y; val c = b; }",
        );
        assert_eq!(r.val("b").unwrap().deps, vec!["x", "y"]);
        assert_eq!(r.val("c").unwrap().deps, vec!["x", "y"]);
    }

    #[test]
    fn test_cyclic_vals_terminate() {
        let (_, r) = analyze_ok("component A() { var x = 1; val a = b + x; val b = a; }");
        assert_eq!(r.val("a").unwrap().deps, vec!["x"]);
        assert_eq!(r.val("b").unwrap().deps, vec!["x"]);
    }

    #[test]
    fn test_var_reading_var_is_violation() {
        let component = first_component("component A() { var a = 0; var b = a + 1; }");
        let err = analyze(&component).unwrap_err();
        assert_eq!(err.variable, "b");
        assert_eq!(err.references, vec!["a"]);
        assert_eq!(
            err.message(),
            "var 'b' initializer references reactive var(s) a; use 'val' for derived state"
        );
        assert!(err.to_string().starts_with("Reactivity error at line 1, column 28:"));
    }

    #[test]
    fn test_var_reading_val_is_allowed() {
        let (_, r) = analyze_ok("component A() { var x = 1; val y = x * 2; var z = y + 1; }");
        assert_eq!(r.vars, vec!["x", "z"]);
    }

    #[test]
    fn test_var_name_inside_string_is_not_a_reference() {
        let (_, r) = analyze_ok("component A() { var a = 0; var b = 'a' + 1; }");
        assert_eq!(r.vars, vec!["a", "b"]);
    }

    // =========================================================================
    // Bindings
    // =========================================================================

    #[test]
    fn test_bare_var_binding() {
        let (c, r) = analyze_ok("component A() { var n = 0; var m = 1; <p>{n}</p> }");
        let Node::Element(p) = &c.body[2] else { panic!("expected element") };
        assert_eq!(r.deps_of(p.children[0].span()), ["n"]);
    }

    #[test]
    fn test_val_binding_uses_val_deps() {
        let (c, r) = analyze_ok(
            "component A() { var count = 1; var price = 2; val total = count * price; <p>{total}</p> }",
        );
        let Node::Element(p) = &c.body[3] else { panic!("expected element") };
        assert_eq!(r.deps_of(p.children[0].span()), ["count", "price"]);
    }

    #[test]
    fn test_computed_binding_subscribes_to_all_vars() {
        let (c, r) = analyze_ok("component A() { var a = 1; var b = 2; <p>{a + 1}</p> }");
        let Node::Element(p) = &c.body[2] else { panic!("expected element") };
        assert_eq!(r.deps_of(p.children[0].span()), ["a", "b"]);
    }

    #[test]
    fn test_unknown_identifier_is_static() {
        let (c, r) = analyze_ok("component A() { var a = 1; <p>{title}</p> }");
        let Node::Element(p) = &c.body[1] else { panic!("expected element") };
        assert!(r.deps_of(p.children[0].span()).is_empty());
    }

    #[test]
    fn test_attribute_bindings() {
        let (c, r) = analyze_ok(
            "component A() { var cls = 'x'; <p class={cls} onClick={() => cls = 'y'} {cls}></p> }",
        );
        let Node::Element(p) = &c.body[1] else { panic!("expected element") };
        assert_eq!(r.deps_of(p.attributes[0].span()), ["cls"]);
        assert!(r.deps_of(p.attributes[1].span()).is_empty());
        assert_eq!(r.deps_of(p.attributes[2].span()), ["cls"]);
    }

    #[test]
    fn test_if_region_deps() {
        let (c, r) = analyze_ok(
            "component A() { var open = false; var n = 0; var z = 1; if (open) { <p>{n}</p> } }",
        );
        assert_eq!(r.deps_of(c.body[3].span()), ["open", "n"]);
    }

    #[test]
    fn test_for_region_with_val_iterable() {
        let (c, r) = analyze_ok(
            "component A() { var items = []; var q = ''; val shown = items; for (item of shown) { <li>{item}</li> } }",
        );
        assert_eq!(r.deps_of(c.body[3].span()), ["items"]);
    }

    #[test]
    fn test_switch_region_deps() {
        let (c, r) = analyze_ok(
            "component A() { var mode = 'a'; var k = 1; switch (mode) { case 'a' if (k > 0) { <p>A</p> } default { <p>B</p> } } }",
        );
        assert_eq!(r.deps_of(c.body[2].span()), ["mode", "k"]);
    }
}
