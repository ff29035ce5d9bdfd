//! DOM helper vocabulary used by generated code.
//!
//! Normally imported from the `owt` package as `__rt`; [`RUNTIME`] is the
//! same vocabulary as a self-contained script for standalone output.

/// Every helper generated code may call as `__rt.<name>`.
pub const HELPERS: &[&str] = &[
    "e",
    "ens",
    "t",
    "a",
    "ap",
    "df",
    "cm",
    "applyProps",
    "beforeRemove",
    "range",
    "toArray",
    "rev",
    "mount",
    "setDevLogger",
    "devLog",
];

pub const SVG_NS: &str = "http://www.w3.org/2000/svg";

/// Inline runtime. Binds `__rt` in the module scope.
pub const RUNTIME: &str = r#"const __rt = (() => {
  const SVG_NS = "http://www.w3.org/2000/svg";
  const READONLY = new Set(["viewBox", "className", "id", "innerHTML", "outerHTML", "textContent"]);
  let devLogger = null;
  function e(tag) { return document.createElement(tag); }
  function ens(ns, tag) { return document.createElementNS(ns, tag); }
  function t(data) { return document.createTextNode(data); }
  function a(el, name, value) { el.setAttribute(name, String(value)); }
  function ap(parent, child) { parent.appendChild(child); return child; }
  function df() { return document.createDocumentFragment(); }
  function cm(text) { return document.createComment(text); }
  function applyProps(el, props) {
    if (!props) return;
    const svg = el.namespaceURI === SVG_NS;
    for (const k in props) {
      const v = props[k];
      if (k.startsWith("on") && typeof v === "function") {
        el.addEventListener(k.slice(2).toLowerCase(), (ev) => v(ev));
      } else if (v == null) {
        continue;
      } else if (svg) {
        el.setAttribute(k, String(v));
      } else if (k in el && !READONLY.has(k)) {
        el[k] = v;
      } else {
        el.setAttribute(k, String(v));
      }
    }
  }
  function beforeRemove(n) {
    try {
      if (!n) return;
      const stack = [n];
      while (stack.length) {
        const node = stack.pop();
        if (!node) continue;
        if (node.nodeType === 8 && node.data === "comp") {
          const inst = node.__owtInst;
          if (inst && typeof inst.destroy === "function") inst.destroy();
        }
        for (let c = node.firstChild; c; c = c.nextSibling) stack.push(c);
      }
    } catch {}
  }
  function range(a, b) {
    const out = [];
    const start = Math.trunc(Number(a));
    const end = Math.trunc(Number(b));
    if (!Number.isFinite(start) || !Number.isFinite(end)) return out;
    for (let i = start; i <= end; i++) out.push(i);
    return out;
  }
  function toArray(x) {
    if (!x) return [];
    return Array.isArray(x) ? x.slice() : Array.from(x);
  }
  function rev(x) { return toArray(x).reverse(); }
  function mount(Component, options) {
    const inst = Component((options && options.props) || {});
    inst.mount(options.target);
    return inst;
  }
  function setDevLogger(logger) { devLogger = logger; }
  function devLog(event, payload) {
    if (!devLogger) return;
    try { devLogger(event, payload); } catch {}
  }
  return { e, ens, t, a, ap, df, cm, applyProps, beforeRemove, range, toArray, rev, mount, setDevLogger, devLog };
})();"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_defines_every_helper() {
        for helper in HELPERS {
            assert!(
                RUNTIME.contains(&format!("function {helper}(")),
                "runtime is missing {helper}"
            );
        }
    }

    #[test]
    fn test_runtime_exports_every_helper() {
        let exports = RUNTIME
            .lines()
            .find(|l| l.trim_start().starts_with("return { e,"))
            .unwrap();
        for helper in HELPERS {
            assert!(exports.contains(&format!(" {helper},")) || exports.contains(&format!(" {helper} }}")));
        }
    }

    #[test]
    fn test_range_bounds_are_truncated_not_wrapped() {
        assert!(RUNTIME.contains("const start = Math.trunc(Number(a));"));
        assert!(RUNTIME.contains("const end = Math.trunc(Number(b));"));
        assert!(!RUNTIME.contains("| 0"));
    }

    #[test]
    fn test_runtime_has_no_eval() {
        assert!(!RUNTIME.contains("eval("));
        assert!(!RUNTIME.contains("new Function"));
    }
}
