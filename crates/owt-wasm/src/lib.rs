//! WASM bindings for the owt compiler.
//!
//! Exposes `compile()` and `check()` to JavaScript via wasm-bindgen.
//! `compile` returns `{ code, map, css }` or throws on error.

use std::sync::{Arc, Mutex};

use owt_codegen::{
    BasicChecker, CompileError, CompileOptions, CompileOutput, Diagnostic, TypeChecker,
};
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// Compile owt source to JavaScript.
///
/// Returns a JS object `{ code: string, map: SourceMap, css: string }`, where
/// `map` is a v3 source map object. With `debug`, pipeline progress is passed
/// to `logger` one message at a time. Throws a JS error if compilation fails.
#[wasm_bindgen]
pub fn compile(
    source: &str,
    file_name: &str,
    debug: bool,
    logger: Option<js_sys::Function>,
) -> Result<JsValue, JsError> {
    let (result, messages) = compile_native(source, file_name, debug);

    if let Some(logger) = logger {
        for message in &messages {
            logger
                .call1(&JsValue::NULL, &JsValue::from_str(message))
                .map_err(|_| JsError::new("logger threw"))?;
        }
    }

    let output = result.map_err(|e| JsError::new(&e.to_string()))?;
    to_js(&output)
}

/// Diagnostics for `source`: `[{ message, line, column, code, severity }]`.
#[wasm_bindgen]
pub fn check(source: &str, file_name: &str) -> Result<JsValue, JsError> {
    to_js(&check_native(source, file_name))
}

fn check_native(source: &str, file_name: &str) -> Vec<Diagnostic> {
    BasicChecker.check(source, file_name)
}

/// Get the compiler version.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Run the compiler, collecting debug messages instead of printing them.
fn compile_native(
    source: &str,
    file_name: &str,
    debug: bool,
) -> (Result<CompileOutput, CompileError>, Vec<String>) {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = messages.clone();
    let options = CompileOptions {
        debug,
        logger: Some(Arc::new(move |msg: &str| {
            if let Ok(mut sink) = sink.lock() {
                sink.push(msg.to_string());
            }
        })),
        ..Default::default()
    };

    let result = owt_codegen::compile(source, file_name, &options);
    let messages = messages.lock().map(|m| m.clone()).unwrap_or_default();
    (result, messages)
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsError> {
    let serializer = serde_wasm_bindgen::Serializer::json_compatible();
    value
        .serialize(&serializer)
        .map_err(|e| JsError::new(&e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // =========================================================================
    // Native tests (non-WASM): the pipeline behind the bindings
    // =========================================================================

    fn native_compile(source: &str) -> CompileOutput {
        compile_native(source, "app.owt", false).0.unwrap()
    }

    #[test]
    fn test_empty_file() {
        let output = native_compile("");
        assert!(output.code.starts_with("/* Generated from app.owt */"));
        assert_eq!(output.css, "");
        assert_eq!(output.map.file, "app.js");
        assert_eq!(output.map.sources, vec!["app.owt".to_string()]);
    }

    #[test]
    fn test_counter_example() {
        let output = native_compile(
            "export component Counter() {\n  var count = 0;\n  <button onClick={() => count++}>{count}</button>\n}",
        );
        assert!(output.code.contains("export function Counter(props) {"));
        assert!(output.code.contains("_ctx_0.state.count++"));
        assert!(!output.map.mappings.is_empty());
    }

    #[test]
    fn test_styles_example() {
        let output = native_compile("component A() { <p>x</p> <style>p { color: red; }</style> }");
        assert_eq!(output.css, "p { color: red; }\n");
    }

    #[test]
    fn test_compile_error() {
        let (result, _) = compile_native("component A() { <div></span> }", "app.owt", false);
        let err = result.unwrap_err();
        assert!(err.to_string().starts_with("Parse error at line 1"));
    }

    #[test]
    fn test_debug_messages_collected() {
        let (result, messages) = compile_native("component A() { var x = 1; }", "app.owt", true);
        assert!(result.is_ok());
        assert!(messages.contains(&"component A: vars [x]".to_string()));

        let (_, quiet) = compile_native("component A() { var x = 1; }", "app.owt", false);
        assert!(quiet.is_empty());
    }

    #[test]
    fn test_check_diagnostics_shape() {
        let diagnostics = check_native("component A() { var idle = 0; <p>x</p> }", "app.owt");
        assert_eq!(diagnostics.len(), 1);
        let json = serde_json::to_value(&diagnostics[0]).unwrap();
        assert_eq!(json["code"], 2001);
        assert_eq!(json["severity"], "warning");
        assert_eq!(json["message"], "var 'idle' is never read");
        assert_eq!(json["line"], 1);
    }

    #[test]
    fn test_check_reports_reactivity_error() {
        let diagnostics = check_native("component A() { var a = 0; var b = a; <p>{b}</p> }", "app.owt");
        assert_eq!(diagnostics[0].code, 1003);
        assert!(diagnostics[0].render("app.owt").starts_with("app.owt:1:28: error OWT1003:"));
    }

    #[test]
    fn test_multiple_compiles() {
        // No state leaks between compiles.
        let out1 = native_compile("component A() { var x = 0; <p>{x}</p> }");
        let out2 = native_compile("component A() { var y = 1; <p>{y}</p> }");
        assert!(out1.code.contains("state.x"));
        assert!(!out1.code.contains("state.y"));
        assert!(out2.code.contains("state.y"));
        assert!(!out2.code.contains("state.x"));
        assert!(out2.code.contains("const _ctx_0 = {"));
    }

    #[test]
    fn test_assignment_handler_goes_through_writeback() {
        let output = native_compile("component A() { var n = 0; <button onClick={n++}>+</button> }");
        assert!(output
            .code
            .contains("($event) => _ctx_0.__handle(() => { _ctx_0.state.n++; })"));
    }
}
