//! Type-checking seam.
//!
//! A [`TypeChecker`] reports diagnostics before compilation; any
//! error-severity diagnostic aborts it. [`BasicChecker`] covers what can be
//! checked without a host-language type system.

use std::fmt;

use owt_lexer::Scanner;
use owt_parser::ast::{Attribute, AttributeValue, Component, Node};
use owt_parser::Parser;
use serde::Serialize;

use crate::analysis;
use crate::script;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub code: u32,
    pub severity: Severity,
}

impl Diagnostic {
    /// `file:line:column: severity OWTcode: message`
    pub fn render(&self, file_name: &str) -> String {
        format!(
            "{file_name}:{}:{}: {} OWT{}: {}",
            self.line, self.column, self.severity, self.code, self.message
        )
    }
}

pub trait TypeChecker {
    fn check(&self, source: &str, file_name: &str) -> Vec<Diagnostic>;
}

pub const CODE_LEX: u32 = 1001;
pub const CODE_PARSE: u32 = 1002;
pub const CODE_REACTIVITY: u32 = 1003;
pub const CODE_UNUSED_VAR: u32 = 2001;
pub const CODE_DUPLICATE: u32 = 2002;

/// Front-end errors plus unused and duplicate declaration warnings.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicChecker;

impl TypeChecker for BasicChecker {
    fn check(&self, source: &str, _file_name: &str) -> Vec<Diagnostic> {
        let stream = match Scanner::tokenize(source) {
            Ok(stream) => stream,
            Err(e) => {
                return vec![Diagnostic {
                    line: e.line,
                    column: e.column,
                    message: e.message,
                    code: CODE_LEX,
                    severity: Severity::Error,
                }]
            }
        };
        let program = match Parser::new(source, stream).parse_program() {
            Ok(program) => program,
            Err(e) => {
                return vec![Diagnostic {
                    line: e.line(),
                    column: e.column(),
                    message: e.message,
                    code: CODE_PARSE,
                    severity: Severity::Error,
                }]
            }
        };

        let mut diagnostics = Vec::new();
        for component in program.components() {
            if let Err(v) = analysis::analyze(component) {
                diagnostics.push(Diagnostic {
                    message: v.message(),
                    line: v.span.start.line,
                    column: v.span.start.column,
                    code: CODE_REACTIVITY,
                    severity: Severity::Error,
                });
            }
            declaration_warnings(component, &mut diagnostics);
        }
        diagnostics
    }
}

fn declaration_warnings(component: &Component, diagnostics: &mut Vec<Diagnostic>) {
    let mut seen: Vec<&str> = Vec::new();
    let mut code = Vec::new();
    collect_code(&component.body, &mut code);

    for node in &component.body {
        let (name, span) = match node {
            Node::VarDecl(d) => (d.name.as_str(), d.span),
            Node::ValDecl(d) => (d.name.as_str(), d.span),
            Node::FunctionDecl(d) => (d.name.as_str(), d.span),
            _ => continue,
        };

        if seen.contains(&name) {
            diagnostics.push(Diagnostic {
                message: format!("'{name}' is declared more than once in {}", component.name),
                line: span.start.line,
                column: span.start.column,
                code: CODE_DUPLICATE,
                severity: Severity::Warning,
            });
        }
        seen.push(name);

        if matches!(node, Node::VarDecl(_)) {
            let used = code
                .iter()
                .any(|c| script::identifiers(c).iter().any(|i| i.name == name));
            if !used {
                diagnostics.push(Diagnostic {
                    message: format!("var '{name}' is never read"),
                    line: span.start.line,
                    column: span.start.column,
                    code: CODE_UNUSED_VAR,
                    severity: Severity::Warning,
                });
            }
        }
    }
}

/// Every piece of embedded code under `nodes`, declarations' own names excluded.
fn collect_code(nodes: &[Node], out: &mut Vec<String>) {
    for node in nodes {
        match node {
            Node::Element(el) => {
                for attr in &el.attributes {
                    match attr {
                        Attribute::Regular(a) => {
                            if let Some(AttributeValue::Expr(e)) = &a.value {
                                out.push(e.code.clone());
                            }
                        }
                        Attribute::Shorthand(a) => out.push(a.name.clone()),
                        Attribute::Spread(a) => out.push(a.argument.code.clone()),
                    }
                }
                collect_code(&el.children, out);
            }
            Node::Expr(e) => out.push(e.code.clone()),
            Node::VarDecl(d) => out.extend(d.init.iter().map(|e| e.code.clone())),
            Node::ValDecl(d) => out.push(d.init.code.clone()),
            Node::FunctionDecl(d) => out.push(d.body.code.clone()),
            Node::If(b) => {
                for branch in &b.branches {
                    out.push(branch.test.code.clone());
                    collect_code(&branch.consequent, out);
                }
                if let Some(alt) = &b.alternate {
                    collect_code(&alt.consequent, out);
                }
            }
            Node::For(b) => {
                out.push(b.iterable.code.clone());
                collect_code(&b.body, out);
                if let Some(empty) = &b.empty {
                    collect_code(empty, out);
                }
            }
            Node::Switch(b) => {
                out.push(b.discriminant.code.clone());
                for case in &b.cases {
                    out.push(case.pattern.code.clone());
                    out.extend(case.guard.iter().map(|g| g.code.clone()));
                    collect_code(&case.body, out);
                }
                if let Some(default) = &b.default_case {
                    collect_code(default, out);
                }
            }
            Node::SlotPlaceholder(s) => collect_code(&s.fallback, out),
            Node::SlotContent(s) => collect_code(&s.body, out),
            Node::Text(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn check(source: &str) -> Vec<Diagnostic> {
        BasicChecker.check(source, "a.owt")
    }

    fn codes(source: &str) -> Vec<u32> {
        check(source).into_iter().map(|d| d.code).collect()
    }

    #[test]
    fn test_clean_component() {
        assert_eq!(codes("component A() { var n = 0; <p>{n}</p> }"), Vec::<u32>::new());
    }

    #[test]
    fn test_lex_error() {
        let diags = check("component A() { <p>\u{0}</p> }");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, CODE_LEX);
        assert_eq!(diags[0].severity, Severity::Error);
    }

    #[test]
    fn test_parse_error_position() {
        let diags = check("component A() {\n  <div><span></div>\n}");
        assert_eq!(diags[0].code, CODE_PARSE);
        assert_eq!(diags[0].line, 2);
    }

    #[test]
    fn test_reactivity_error() {
        let diags = check("component A() { var a = 0; var b = a + 1; <p>{b}</p> }");
        assert_eq!(diags[0].code, CODE_REACTIVITY);
        assert!(diags[0].message.contains("var 'b'"));
    }

    #[test]
    fn test_unused_var_warning() {
        let diags = check("component A() { var used = 0; var idle = 1; <p>{used}</p> }");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, CODE_UNUSED_VAR);
        assert_eq!(diags[0].severity, Severity::Warning);
        assert_eq!(diags[0].message, "var 'idle' is never read");
    }

    #[test]
    fn test_var_used_in_function_counts() {
        let diags = check("component A() { var n = 0; function inc() { n++; } <button onClick={inc}>+</button> }");
        assert_eq!(diags, vec![]);
    }

    #[test]
    fn test_duplicate_declaration_warning() {
        let c = codes("component A() { var x = 0; val x = 1; <p>{x}</p> }");
        assert!(c.contains(&CODE_DUPLICATE));
    }

    #[test]
    fn test_render() {
        let d = Diagnostic {
            message: "oops".into(),
            line: 3,
            column: 7,
            code: CODE_PARSE,
            severity: Severity::Error,
        };
        assert_eq!(d.render("app.owt"), "app.owt:3:7: error OWT1002: oops");
    }

    #[test]
    fn test_diagnostic_json() {
        let d = Diagnostic {
            message: "m".into(),
            line: 1,
            column: 2,
            code: CODE_UNUSED_VAR,
            severity: Severity::Warning,
        };
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["severity"], "warning");
        assert_eq!(json["code"], 2001);
    }
}
