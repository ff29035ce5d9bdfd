//! Event handler shapes.
//!
//! An event attribute's code is classified by its outermost syntax and wrapped
//! so that it runs inside the component's writeback routine: vars are
//! snapshotted, the user code runs, and only the vars that actually changed
//! are notified.

use crate::script;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerShape {
    /// `n = n + 1`, `count++`
    Assignment,
    /// `() => n = n + 1`, `(e) => { text = e.target.value }`
    LambdaAssignment,
    /// `(e) => save(e)`
    Lambda,
    /// `save`, `actions.save`, `makeHandler(id)`
    FunctionRef,
}

/// DOM event name of an `on*` attribute: `onClick` is `click`.
pub fn event_name(attr: &str) -> Option<String> {
    let rest = attr.strip_prefix("on")?;
    (!rest.is_empty()).then(|| rest.to_ascii_lowercase())
}

pub fn classify(code: &str) -> HandlerShape {
    let code = code.trim();
    if is_identifier(code) {
        return HandlerShape::FunctionRef;
    }

    if let Some(&arrow) = script::top_level_matches(code, "=>").first() {
        let params = code[..arrow].trim();
        let params = params.strip_prefix("async").map(str::trim_start).unwrap_or(params);
        let is_params =
            is_identifier(params) || (params.starts_with('(') && params.ends_with(')'));
        if is_params {
            let body = &code[arrow + 2..];
            return if has_assignment(body, false) {
                HandlerShape::LambdaAssignment
            } else {
                HandlerShape::Lambda
            };
        }
    }

    if has_assignment(code, true) {
        HandlerShape::Assignment
    } else {
        HandlerShape::FunctionRef
    }
}

/// The JS listener for `code`, already qualified against the component
/// context named `ctx`.
pub fn wrap(code: &str, shape: HandlerShape, ctx: &str) -> String {
    let code = code.trim();
    match shape {
        HandlerShape::Assignment => {
            format!("($event) => {ctx}.__handle(() => {{ {code}; }})")
        }
        HandlerShape::LambdaAssignment | HandlerShape::Lambda => {
            format!("($event) => {ctx}.__handle(() => ({code})($event))")
        }
        HandlerShape::FunctionRef => format!(
            "($event) => {ctx}.__handle(() => {{ const __h = ({code}); if (typeof __h === \"function\") __h($event); }})"
        ),
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Whether `code` assigns anything: `=`, a compound operator, `++` or `--`.
fn has_assignment(code: &str, top_level_only: bool) -> bool {
    let masked = script::mask(code);
    let bytes = masked.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            _ if top_level_only && depth > 0 => {}
            b'+' | b'-' if bytes.get(i + 1) == Some(&b) => return true,
            b'=' => {
                let run = bytes[i..].iter().take_while(|&&c| c == b'=').count();
                if run == 1 && bytes.get(i + 1) != Some(&b'>') && is_assignment_eq(bytes, i) {
                    return true;
                }
                i += run;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    false
}

/// A single `=` at `i`: assignment unless it closes `!=`, `<=` or `>=`.
fn is_assignment_eq(bytes: &[u8], i: usize) -> bool {
    let prev = |back: usize| i.checked_sub(back).map(|j| bytes[j]);
    match prev(1) {
        Some(b'!') => false,
        Some(c @ (b'<' | b'>')) => prev(2) == Some(c),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // =========================================================================
    // Classification
    // =========================================================================

    #[test]
    fn test_assignments() {
        assert_eq!(classify("n = n + 1"), HandlerShape::Assignment);
        assert_eq!(classify("count++"), HandlerShape::Assignment);
        assert_eq!(classify("--count"), HandlerShape::Assignment);
        assert_eq!(classify("total += price"), HandlerShape::Assignment);
        assert_eq!(classify("flags <<= 1"), HandlerShape::Assignment);
        assert_eq!(classify("name ??= 'x'"), HandlerShape::Assignment);
    }

    #[test]
    fn test_comparisons_are_not_assignments() {
        assert_eq!(classify("a == b"), HandlerShape::FunctionRef);
        assert_eq!(classify("a !== b"), HandlerShape::FunctionRef);
        assert_eq!(classify("a <= b"), HandlerShape::FunctionRef);
        assert_eq!(classify("a >= b"), HandlerShape::FunctionRef);
    }

    #[test]
    fn test_lambdas() {
        assert_eq!(classify("() => n = n + 1"), HandlerShape::LambdaAssignment);
        assert_eq!(
            classify("(e) => { text = e.target.value }"),
            HandlerShape::LambdaAssignment
        );
        assert_eq!(classify("e => save(e)"), HandlerShape::Lambda);
        assert_eq!(classify("async () => await save()"), HandlerShape::Lambda);
        assert_eq!(classify("(e) => e.x === 1"), HandlerShape::Lambda);
    }

    #[test]
    fn test_function_refs() {
        assert_eq!(classify("save"), HandlerShape::FunctionRef);
        assert_eq!(classify("actions.save"), HandlerShape::FunctionRef);
        assert_eq!(classify("select(id)"), HandlerShape::FunctionRef);
        assert_eq!(classify("log('a = b')"), HandlerShape::FunctionRef);
    }

    #[test]
    fn test_nested_assignment_is_not_top_level() {
        assert_eq!(classify("run(() => n = 1)"), HandlerShape::FunctionRef);
    }

    #[test]
    fn test_event_name() {
        assert_eq!(event_name("onClick"), Some("click".into()));
        assert_eq!(event_name("onKeyDown"), Some("keydown".into()));
        assert_eq!(event_name("on"), None);
        assert_eq!(event_name("class"), None);
    }

    // =========================================================================
    // Wrapping
    // =========================================================================

    #[test]
    fn test_wrap_assignment() {
        assert_eq!(
            wrap("c.state.n++", HandlerShape::Assignment, "c"),
            "($event) => c.__handle(() => { c.state.n++; })"
        );
    }

    #[test]
    fn test_wrap_lambda() {
        assert_eq!(
            wrap("() => c.state.n = 1", HandlerShape::LambdaAssignment, "c"),
            "($event) => c.__handle(() => (() => c.state.n = 1)($event))"
        );
    }

    #[test]
    fn test_wrap_function_ref() {
        assert_eq!(
            wrap("save", HandlerShape::FunctionRef, "c"),
            "($event) => c.__handle(() => { const __h = (save); if (typeof __h === \"function\") __h($event); })"
        );
    }
}
