//! owt Code Generator
//!
//! Compiles `.owt` components to JavaScript with fine-grained DOM updates.
//! Each component becomes one function that builds its DOM once, keeps a
//! per-variable registry of updater closures, and wraps every state write so
//! that only the vars that actually changed are notified.
//!
//! ```text
//! source → Scanner → Parser → analyze() → generate() → CompileOutput { code, map, css }
//! ```

pub mod analysis;
pub mod check;
pub mod emitter;
pub mod generate;
pub mod handlers;
pub mod runtime;
pub mod script;
pub mod sourcemap;

use std::fmt;
use std::sync::Arc;

use owt_lexer::{LexerError, Scanner, Span};
use owt_parser::{ParseError, Parser};
use serde::Serialize;

pub use analysis::{analyze, Reactivity, ReactivityViolation};
pub use check::{BasicChecker, Diagnostic, Severity, TypeChecker};
pub use sourcemap::{output_file_name, MappingTable, SourceMapBuilder};

/// The compiled output of one `.owt` file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompileOutput {
    pub code: String,
    pub map: MappingTable,
    /// Every `<style>` block of the file, concatenated.
    pub css: String,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexerError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Reactivity(#[from] ReactivityViolation),

    #[error("Type check failed:\n{message}")]
    TypeCheck { message: String },
}

impl CompileError {
    /// Location of the offending construct, when known.
    pub fn span(&self) -> Option<Span> {
        match self {
            CompileError::Lex(e) => Some(e.span()),
            CompileError::Parse(e) => Some(e.span),
            CompileError::Reactivity(e) => Some(e.span),
            CompileError::TypeCheck { .. } => None,
        }
    }
}

/// Where generated code gets its DOM helpers from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeMode {
    /// `import * as __rt from "<module>";`
    Import(String),
    /// Embed the helpers so the output runs without a package resolver.
    Inline,
}

impl Default for RuntimeMode {
    fn default() -> Self {
        RuntimeMode::Import("owt".into())
    }
}

pub type Logger = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone, Default)]
pub struct CompileOptions {
    pub debug: bool,
    /// Receives pipeline progress when `debug` is on.
    pub logger: Option<Logger>,
    pub runtime: RuntimeMode,
}

impl fmt::Debug for CompileOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompileOptions")
            .field("debug", &self.debug)
            .field("logger", &self.logger.as_ref().map(|_| "<fn>"))
            .field("runtime", &self.runtime)
            .finish()
    }
}

impl CompileOptions {
    pub(crate) fn log(&self, message: &str) {
        if !self.debug {
            tracing::debug!("{message}");
            return;
        }
        match &self.logger {
            Some(logger) => logger(message),
            None => tracing::info!("{message}"),
        }
    }
}

/// Per-component code generation state.
///
/// Created fresh for every component, so ids and dependency tables never leak
/// between components or files.
pub struct CompilerContext {
    pub reactivity: Reactivity,
    /// Name of the generated per-instance context object.
    pub ctx_var: String,
    next_id: usize,
    /// Loop items and parameters that hide component state.
    shadowed: Vec<String>,
    /// Props bound under another local name, such as `class` as `_class`.
    renamed: Vec<(String, String)>,
}

impl CompilerContext {
    pub fn new(reactivity: Reactivity) -> Self {
        let mut ctx = CompilerContext {
            reactivity,
            ctx_var: String::new(),
            next_id: 0,
            shadowed: Vec::new(),
            renamed: Vec::new(),
        };
        ctx.ctx_var = ctx.assign_id("ctx");
        ctx
    }

    /// A fresh local name: `_el_1`, `_text_a`, ...
    pub fn assign_id(&mut self, prefix: &str) -> String {
        let id = format!("_{prefix}_{}", base36(self.next_id));
        self.next_id += 1;
        id
    }

    /// Rewrite var and val references in `code` to live context reads.
    pub fn qualify(&self, code: &str) -> String {
        script::rewrite(code, |name| {
            if self.shadowed.iter().any(|s| s == name) {
                return None;
            }
            if let Some((_, local)) = self.renamed.iter().find(|(prop, _)| prop == name) {
                return Some(local.clone());
            }
            (self.reactivity.is_var(name) || self.reactivity.is_val(name))
                .then(|| format!("{}.state.{name}", self.ctx_var))
        })
    }

    /// Refer to the prop `name` through `local` from now on.
    pub fn rename(&mut self, name: impl Into<String>, local: impl Into<String>) {
        self.renamed.push((name.into(), local.into()));
    }

    pub fn shadow(&mut self, names: impl IntoIterator<Item = String>) -> usize {
        let before = self.shadowed.len();
        self.shadowed.extend(names);
        before
    }

    pub fn unshadow(&mut self, mark: usize) {
        self.shadowed.truncate(mark);
    }
}

fn base36(mut n: usize) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = Vec::new();
    loop {
        out.push(DIGITS[n % 36]);
        n /= 36;
        if n == 0 {
            break;
        }
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Compile one `.owt` file to JavaScript.
#[tracing::instrument(skip(source, options), fields(bytes = source.len()))]
pub fn compile(
    source: &str,
    file_name: &str,
    options: &CompileOptions,
) -> Result<CompileOutput, CompileError> {
    options.log(&format!("compile start: {file_name}"));

    let stream = Scanner::tokenize(source)?;
    let program = Parser::new(source, stream).parse_program()?;
    options.log(&format!("parsed {} components", program.components().count()));

    let output = generate::generate_program(&program, source, file_name, options)?;
    options.log(&format!("generated {} bytes", output.code.len()));
    Ok(output)
}

/// Run `checker` first; any error-severity diagnostic aborts compilation.
pub fn compile_checked(
    source: &str,
    file_name: &str,
    options: &CompileOptions,
    checker: &dyn TypeChecker,
) -> Result<CompileOutput, CompileError> {
    let diagnostics = checker.check(source, file_name);
    let mut errors = Vec::new();
    for d in &diagnostics {
        match d.severity {
            Severity::Error => errors.push(d.render(file_name)),
            Severity::Warning => tracing::warn!("{}", d.render(file_name)),
            Severity::Info => tracing::debug!("{}", d.render(file_name)),
        }
    }
    if !errors.is_empty() {
        return Err(CompileError::TypeCheck {
            message: errors.join("\n"),
        });
    }
    compile(source, file_name, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn compile_ok(source: &str) -> CompileOutput {
        compile(source, "test.owt", &CompileOptions::default()).unwrap()
    }

    // =========================================================================
    // Context
    // =========================================================================

    #[test]
    fn test_assign_id_is_per_context() {
        let mut a = CompilerContext::new(Reactivity::default());
        let mut b = CompilerContext::new(Reactivity::default());
        assert_eq!(a.ctx_var, "_ctx_0");
        assert_eq!(a.assign_id("el"), "_el_1");
        assert_eq!(b.assign_id("el"), "_el_1");
    }

    #[test]
    fn test_base36_ids() {
        assert_eq!(base36(0), "0");
        assert_eq!(base36(35), "z");
        assert_eq!(base36(36), "10");
    }

    #[test]
    fn test_qualify_respects_shadowing() {
        let source = "component A() { var item = 1; val twice = item * 2; }";
        let program = Parser::parse(source).unwrap();
        let component = program.components().next().unwrap();
        let mut ctx = CompilerContext::new(analyze(component).unwrap());

        assert_eq!(ctx.qualify("item + twice"), "_ctx_0.state.item + _ctx_0.state.twice");
        let mark = ctx.shadow(["item".to_string()]);
        assert_eq!(ctx.qualify("item + twice"), "item + _ctx_0.state.twice");
        ctx.unshadow(mark);
        assert_eq!(ctx.qualify("item"), "_ctx_0.state.item");
    }

    // =========================================================================
    // Pipeline
    // =========================================================================

    #[test]
    fn test_compile_counter() {
        let out = compile_ok(
            "export component C(){ var n = 0; <button onClick={() => n = n + 1}>{n}</button> }",
        );
        assert!(out.code.contains("export function C(props) {"));
        assert!(out.code.contains("_ctx_0.state.n = (0);"));
        assert!(out.code.contains(
            "addEventListener(\"click\", ($event) => _ctx_0.__handle(() => (() => _ctx_0.state.n = _ctx_0.state.n + 1)($event)));"
        ));
        assert!(out.code.contains("_ctx_0.__sub([\"n\"], () => {"));
        assert_eq!(out.map.version, 3);
        assert_eq!(out.css, "");
    }

    #[test]
    fn test_lex_error_propagates() {
        let err = compile("component A() { <p>{\"open</p> }", "a.owt", &CompileOptions::default())
            .unwrap_err();
        assert!(matches!(err, CompileError::Lex(_)));
        assert!(err.span().is_some());
    }

    #[test]
    fn test_parse_error_propagates() {
        let err = compile("component A() { <div><span></div> }", "a.owt", &CompileOptions::default())
            .unwrap_err();
        let CompileError::Parse(parse) = &err else {
            panic!("expected parse error, got {err:?}");
        };
        assert!(parse.message.contains("expected </span> but got </div>"));
    }

    #[test]
    fn test_reactivity_error_propagates() {
        let err = compile(
            "component A() { var a = 0; var b = a + 1; }",
            "a.owt",
            &CompileOptions::default(),
        )
        .unwrap_err();
        let CompileError::Reactivity(v) = &err else {
            panic!("expected reactivity error, got {err:?}");
        };
        assert_eq!(v.references, vec!["a"]);
    }

    #[test]
    fn test_debug_logger_receives_progress() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let options = CompileOptions {
            debug: true,
            logger: Some(Arc::new(move |msg: &str| {
                sink.lock().unwrap().push(msg.to_string());
            })),
            ..Default::default()
        };
        compile("component A() { var x = 1; var y = 2; }", "a.owt", &options).unwrap();

        let seen = seen.lock().unwrap();
        assert!(seen.iter().any(|m| m == "parsed 1 components"));
        assert!(seen.iter().any(|m| m == "component A: vars [x, y]"));
        assert!(seen.iter().any(|m| m.starts_with("generated ")));
    }

    #[test]
    fn test_logger_unused_without_debug() {
        let calls = Arc::new(Mutex::new(0));
        let sink = calls.clone();
        let options = CompileOptions {
            debug: false,
            logger: Some(Arc::new(move |_: &str| *sink.lock().unwrap() += 1)),
            ..Default::default()
        };
        compile("component A() {}", "a.owt", &options).unwrap();
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn test_compile_checked_aborts_on_errors() {
        struct Strict;
        impl TypeChecker for Strict {
            fn check(&self, _: &str, _: &str) -> Vec<Diagnostic> {
                vec![Diagnostic {
                    message: "Type 'string' is not assignable to type 'number'".into(),
                    line: 1,
                    column: 5,
                    code: 2322,
                    severity: Severity::Error,
                }]
            }
        }
        let err = compile_checked("component A() {}", "a.owt", &CompileOptions::default(), &Strict)
            .unwrap_err();
        let CompileError::TypeCheck { message } = &err else {
            panic!("expected type check error");
        };
        assert!(message.contains("a.owt:1:5"));
        assert!(message.contains("2322"));
        assert!(err.span().is_none());
    }

    #[test]
    fn test_compile_checked_passes_warnings() {
        let out = compile_checked(
            "component A() { var unused = 1; }",
            "a.owt",
            &CompileOptions::default(),
            &BasicChecker,
        );
        assert!(out.is_ok());
    }

    #[test]
    fn test_compilations_are_independent() {
        let a = compile_ok("component A() { var x = 1; <p>{x}</p> }");
        let b = compile_ok("component A() { var x = 1; <p>{x}</p> }");
        assert_eq!(a.code, b.code);
        assert_eq!(a.map, b.map);
    }
}
