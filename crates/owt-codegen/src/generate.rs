//! JavaScript generation.
//!
//! Each component becomes one exported function. Its body:
//!
//! ```text
//! context object   props, state, subscriber registry, notify/write routines
//! setup            props binding, val getters, hoisted functions, var inits
//! render           DOM built once into a root fragment
//! api              { mount, update, destroy }
//! ```
//!
//! Markup at component level renders *live*: every dynamic binding gets its
//! own updater subscribed to its vars. Inside a control block the whole
//! region is rebuilt by one updater, so its contents render *static*.

use owt_lexer::{Position, Span};
use owt_parser::ast::{
    Attribute, AttributeValue, Component, Element, Expr, ForBlock, IfBlock, LoopMeta, Node,
    Program, SlotPlaceholder, SwitchBlock, TopLevel, LOOP_META_FIELDS,
};

use crate::emitter::Emitter;
use crate::handlers::{self, event_name};
use crate::runtime::{RUNTIME, SVG_NS};
use crate::script::IdentKind;
use crate::{analysis, script, CompileError, CompileOptions, CompileOutput, CompilerContext, RuntimeMode};

/// Element names always created in the SVG namespace.
pub const SVG_TAGS: &[&str] = &[
    "svg",
    "path",
    "circle",
    "rect",
    "line",
    "polygon",
    "polyline",
    "ellipse",
    "g",
    "defs",
    "use",
    "text",
    "tspan",
    "textPath",
    "image",
    "foreignObject",
];

/// Attributes assigned as boolean DOM properties.
pub const BOOLEAN_ATTRIBUTES: &[&str] = &[
    "checked",
    "disabled",
    "selected",
    "readonly",
    "required",
    "autofocus",
    "multiple",
    "hidden",
    "defer",
    "async",
    "autoplay",
    "controls",
    "loop",
    "muted",
    "preload",
    "reversed",
    "scoped",
    "seamless",
    "sortable",
    "truespeed",
];

/// Words that cannot name a binding in generated JavaScript.
pub const RESERVED_WORDS: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for", "function",
    "if", "implements", "import", "in", "instanceof", "interface", "let", "new", "null",
    "package", "private", "protected", "public", "return", "static", "super", "switch", "this",
    "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Dynamic points subscribe their own updaters.
    Live,
    /// Evaluated once where built; an enclosing region refreshes them.
    Static,
}

/// Generate the whole file.
pub fn generate_program(
    program: &Program,
    source: &str,
    file_name: &str,
    options: &CompileOptions,
) -> Result<CompileOutput, CompileError> {
    let mut out = Emitter::new(file_name, source);
    let mut css = String::new();

    out.line(&format!("/* Generated from {file_name} */"));
    for import in program.imports.iter().filter(|i| !i.type_only) {
        out.block_at(&import.code, import.span.start);
    }
    match &options.runtime {
        RuntimeMode::Import(module) => {
            out.line(&format!("import * as __rt from {};", js_string(module)));
        }
        RuntimeMode::Inline => {
            for line in RUNTIME.lines() {
                out.line(line);
            }
        }
    }

    for item in &program.body {
        match item {
            TopLevel::Style(style) => push_css(&mut css, &style.content),
            TopLevel::Component(component) => {
                let reactivity = analysis::analyze(component)?;
                options.log(&format!(
                    "component {}: vars [{}]",
                    component.name,
                    reactivity.vars.join(", ")
                ));

                out.blank();
                let mut writer = ComponentWriter {
                    out: &mut out,
                    ctx: CompilerContext::new(reactivity),
                    component,
                    debug: options.debug,
                };
                writer.component();

                if let Some(style) = &component.style {
                    push_css(&mut css, &style.content);
                }
            }
        }
    }

    let (code, map) = out.finish();
    Ok(CompileOutput { code, map, css })
}

fn push_css(css: &mut String, content: &str) {
    let content = content.trim();
    if content.is_empty() {
        return;
    }
    if !css.is_empty() {
        css.push('\n');
    }
    css.push_str(content);
    css.push('\n');
}

/// A JS string literal.
pub fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn js_array(names: &[String]) -> String {
    let items: Vec<String> = names.iter().map(|n| js_string(n)).collect();
    format!("[{}]", items.join(", "))
}

struct ComponentWriter<'a> {
    out: &'a mut Emitter,
    ctx: CompilerContext,
    component: &'a Component,
    debug: bool,
}

impl ComponentWriter<'_> {
    fn component(&mut self) {
        let component = self.component;
        let export = if component.exported { "export " } else { "" };
        self.out.open_at(
            &format!("{export}function {}(props) {{", component.name),
            component.span.start,
        );

        self.context_object();
        self.setup();

        let root = self.ctx.assign_id("root");
        self.out.line(&format!("const {root} = __rt.df();"));
        self.nodes(&component.body, &root, Mode::Live, false);

        self.api(&root);
        self.out.close("}");
    }

    // =========================================================================
    // Instance context
    // =========================================================================

    fn context_object(&mut self) {
        let ctx = self.ctx.ctx_var.clone();
        let name = js_string(&self.component.name);
        let order = js_array(&self.ctx.reactivity.vars);
        let out = &mut *self.out;

        out.open(&format!("const {ctx} = {{"));
        out.line("props,");
        out.line("state: {},");
        out.line("__subs: Object.create(null),");
        out.line(&format!("__order: {order},"));
        out.line("__depth: 0,");
        out.line("__nodes: [],");
        out.line("__destroyed: false,");

        out.open("__sub(names, fn) {");
        out.line("for (const name of names) (this.__subs[name] || (this.__subs[name] = [])).push(fn);");
        out.close("},");

        out.open("__notify(names) {");
        if self.debug {
            out.line(&format!("__rt.devLog(\"notify\", {{ component: {name}, names }});"));
        }
        out.line("const ran = new Set();");
        out.open("for (const name of this.__order) {");
        out.line("if (!names.includes(name)) continue;");
        out.open("for (const fn of this.__subs[name] || []) {");
        out.line("if (ran.has(fn)) continue;");
        out.line("ran.add(fn);");
        out.open("try {");
        out.line("fn();");
        out.reopen("} catch (err) {");
        out.line(&format!("console.error(\"[owt] update failed in \" + {name}, err);"));
        out.close("}");
        out.close("}");
        out.close("}");
        out.close("},");

        out.open("__write(fn) {");
        out.line("if (this.__depth > 0) return fn();");
        out.line("const before = this.__order.map((name) => this.state[name]);");
        out.line("this.__depth++;");
        out.open("try {");
        out.line("return fn();");
        out.reopen("} finally {");
        out.line("this.__depth--;");
        out.line("const changed = this.__order.filter((name, i) => this.state[name] !== before[i]);");
        out.line("if (changed.length > 0) this.__notify(changed);");
        out.close("}");
        out.close("},");

        out.open("__handle(fn) {");
        out.open("try {");
        out.line("return this.__write(fn);");
        out.reopen("} catch (err) {");
        out.line(&format!("console.error(\"[owt] handler failed in \" + {name}, err);"));
        out.close("}");
        out.close("},");

        out.close("};");
    }

    fn setup(&mut self) {
        let ctx = self.ctx.ctx_var.clone();
        let component = self.component;

        if let Some(pattern) = component.props_pattern() {
            let (pattern, renamed) = rename_reserved_props(pattern.trim());
            for (prop, local) in renamed {
                self.ctx.rename(prop, local);
            }
            if pattern != "props" {
                self.out.line(&format!("const {pattern} = props;"));
            }
        }

        for node in &component.body {
            if let Node::ValDecl(decl) = node {
                let init = self.ctx.qualify(&decl.init.code);
                self.out.line_at(
                    &format!(
                        "Object.defineProperty({ctx}.state, {}, {{ enumerable: true, get: () => ({init}) }});",
                        js_string(&decl.name)
                    ),
                    decl.span.start,
                );
            }
        }

        for node in &component.body {
            match node {
                Node::FunctionDecl(decl) => {
                    let ret = decl
                        .return_type_text
                        .as_deref()
                        .map(|t| format!(": {t}"))
                        .unwrap_or_default();
                    self.out.open_at(
                        &format!("function {}({}){ret} {{", decl.name, decl.params),
                        decl.span.start,
                    );
                    self.out.open(&format!("return {ctx}.__write(() => {{"));
                    let mark = self.ctx.shadow(param_names(&decl.params));
                    let body = self.ctx.qualify(&decl.body.code);
                    self.ctx.unshadow(mark);
                    if !body.trim().is_empty() {
                        self.out.block_at(&body, decl.body.span.start);
                    }
                    self.out.close("});");
                    self.out.close("}");
                }
                Node::VarDecl(decl) => {
                    let init = match &decl.init {
                        Some(init) => format!("({})", self.ctx.qualify(&init.code)),
                        None => "undefined".to_string(),
                    };
                    self.out.line_at(
                        &format!("{ctx}.state.{} = {init};", decl.name),
                        decl.span.start,
                    );
                }
                _ => {}
            }
        }
    }

    fn api(&mut self, root: &str) {
        let ctx = self.ctx.ctx_var.clone();
        let out = &mut *self.out;

        out.open("return {");
        out.open("mount(target) {");
        out.line(&format!("if ({ctx}.__destroyed) return;"));
        out.line(&format!(
            "if ({ctx}.__nodes.length === 0) {ctx}.__nodes = Array.from({root}.childNodes);"
        ));
        out.line(&format!("__rt.ap(target, {root});"));
        out.close("},");

        out.open("update() {");
        out.line(&format!("{ctx}.__notify({ctx}.__order);"));
        out.close("},");

        out.open("destroy() {");
        out.line(&format!("if ({ctx}.__destroyed) return;"));
        out.line(&format!("{ctx}.__destroyed = true;"));
        out.line(&format!("const nodes = {ctx}.__nodes;"));
        out.line("if (nodes.length === 0) return;");
        out.line("const last = nodes[nodes.length - 1];");
        out.line("let n = nodes[0];");
        out.open("while (n) {");
        out.line("__rt.beforeRemove(n);");
        out.line("const next = n === last ? null : n.nextSibling;");
        out.line("if (n.parentNode) n.parentNode.removeChild(n);");
        out.line("n = next;");
        out.close("}");
        out.close("},");
        out.close("};");
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    fn nodes(&mut self, nodes: &[Node], parent: &str, mode: Mode, svg: bool) {
        for node in nodes {
            self.node(node, parent, mode, svg);
        }
    }

    fn node(&mut self, node: &Node, parent: &str, mode: Mode, svg: bool) {
        match node {
            Node::Element(el) if el.is_component() => self.invocation(el, parent),
            Node::Element(el) => self.element(el, parent, mode, svg),
            Node::Text(text) => {
                self.out.line_at(
                    &format!("__rt.ap({parent}, __rt.t({}));", js_string(&text.value)),
                    text.span.start,
                );
            }
            Node::Expr(expr) => self.text_binding(expr, parent, mode),
            Node::If(block) => {
                self.region(block.span, "if", parent, mode, |w, target| {
                    w.if_block(block, target, svg)
                });
            }
            Node::For(block) => {
                self.region(block.span, "for", parent, mode, |w, target| {
                    w.for_block(block, target, svg)
                });
            }
            Node::Switch(block) => {
                self.region(block.span, "switch", parent, mode, |w, target| {
                    w.switch_block(block, target, svg)
                });
            }
            Node::SlotPlaceholder(slot) => self.slot_placeholder(slot, parent, mode, svg),
            Node::SlotContent(slot) => self.nodes(&slot.body, parent, mode, svg),
            // Emitted by setup().
            Node::VarDecl(_) | Node::ValDecl(_) | Node::FunctionDecl(_) => {}
        }
    }

    fn text_binding(&mut self, expr: &Expr, parent: &str, mode: Mode) {
        if expr.code.trim().is_empty() {
            return;
        }
        let value = format!("String(({}) ?? \"\")", self.ctx.qualify(&expr.code));
        let deps = self.live_deps(expr.span, mode);

        if deps.is_empty() {
            self.out
                .line_at(&format!("__rt.ap({parent}, __rt.t({value}));"), expr.span.start);
            return;
        }

        let ctx = self.ctx.ctx_var.clone();
        let node = self.ctx.assign_id("text");
        self.out
            .line_at(&format!("const {node} = __rt.t({value});"), expr.span.start);
        self.out.line(&format!("__rt.ap({parent}, {node});"));
        self.out.line(&format!(
            "{ctx}.__sub({}, () => {{ {node}.data = {value}; }});",
            js_array(&deps)
        ));
    }

    fn live_deps(&self, span: Span, mode: Mode) -> Vec<String> {
        match mode {
            Mode::Live => self.ctx.reactivity.deps_of(span).to_vec(),
            Mode::Static => Vec::new(),
        }
    }

    // =========================================================================
    // Elements and attributes
    // =========================================================================

    fn element(&mut self, el: &Element, parent: &str, mode: Mode, svg_parent: bool) {
        let svg = svg_parent || SVG_TAGS.contains(&el.name.as_str());
        let id = self.ctx.assign_id("el");
        let create = if svg {
            format!("__rt.ens({}, {})", js_string(SVG_NS), js_string(&el.name))
        } else {
            format!("__rt.e({})", js_string(&el.name))
        };
        self.out.line_at(&format!("const {id} = {create};"), el.span.start);

        for attribute in &el.attributes {
            self.attribute(&id, attribute, mode, svg);
        }

        let children_svg = svg && el.name != "foreignObject";
        self.nodes(&el.children, &id, mode, children_svg);
        self.out.line(&format!("__rt.ap({parent}, {id});"));
    }

    fn attribute(&mut self, el: &str, attribute: &Attribute, mode: Mode, svg: bool) {
        let pos = attribute.span().start;
        match attribute {
            Attribute::Regular(attr) => match &attr.value {
                None => {
                    let setter = match boolean_property(&attr.name) {
                        Some(prop) if !svg => format!("{el}.{prop} = true;"),
                        _ => format!("__rt.a({el}, {}, \"\");", js_string(&attr.name)),
                    };
                    self.out.line_at(&setter, pos);
                }
                Some(AttributeValue::Text(text)) => {
                    self.out.line_at(
                        &format!(
                            "__rt.a({el}, {}, {});",
                            js_string(&attr.name),
                            js_string(&text.value)
                        ),
                        pos,
                    );
                }
                Some(AttributeValue::Expr(expr)) => {
                    if let Some(event) = event_name(&attr.name) {
                        self.listener(el, &event, &expr.code, pos);
                    } else {
                        self.bound_attribute(el, &attr.name, &expr.code, attr.span, mode, svg);
                    }
                }
            },
            Attribute::Shorthand(attr) => match event_name(&attr.name) {
                Some(event) => self.listener(el, &event, &attr.name, pos),
                None => self.bound_attribute(el, &attr.name, &attr.name, attr.span, mode, svg),
            },
            Attribute::Spread(attr) => {
                let value = self.ctx.qualify(&attr.argument.code);
                self.out
                    .line_at(&format!("__rt.applyProps({el}, ({value}));"), pos);
            }
        }
    }

    fn listener(&mut self, el: &str, event: &str, code: &str, pos: Position) {
        let handler = self.handler(code);
        self.out.line_at(
            &format!("{el}.addEventListener({}, {handler});", js_string(event)),
            pos,
        );
    }

    fn handler(&self, code: &str) -> String {
        let shape = handlers::classify(code);
        handlers::wrap(&self.ctx.qualify(code), shape, &self.ctx.ctx_var)
    }

    fn bound_attribute(
        &mut self,
        el: &str,
        name: &str,
        code: &str,
        span: Span,
        mode: Mode,
        svg: bool,
    ) {
        let value = self.ctx.qualify(code);
        let setter = attribute_setter(el, name, &value, svg);
        self.out.line_at(&setter, span.start);

        let deps = self.live_deps(span, mode);
        if !deps.is_empty() {
            let ctx = &self.ctx.ctx_var;
            self.out
                .line(&format!("{ctx}.__sub({}, () => {{ {setter} }});", js_array(&deps)));
        }
    }

    // =========================================================================
    // Regions
    // =========================================================================

    /// Anchor a rebuildable region between two comments, or build inline
    /// when already inside one.
    fn region(
        &mut self,
        span: Span,
        label: &str,
        parent: &str,
        mode: Mode,
        build: impl FnOnce(&mut Self, &str),
    ) {
        if mode == Mode::Static {
            build(self, parent);
            return;
        }

        let ctx = self.ctx.ctx_var.clone();
        let deps = self.ctx.reactivity.deps_of(span).to_vec();
        let start = self.ctx.assign_id("start");
        let end = self.ctx.assign_id("end");
        let update = self.ctx.assign_id("region");
        let host = self.ctx.assign_id("host");
        let cursor = self.ctx.assign_id("n");
        let frag = self.ctx.assign_id("frag");

        self.out.line_at(
            &format!("const {start} = __rt.cm({});", js_string(label)),
            span.start,
        );
        self.out.line(&format!("__rt.ap({parent}, {start});"));
        self.out.line(&format!(
            "const {end} = __rt.cm({});",
            js_string(&format!("/{label}"))
        ));
        self.out.line(&format!("__rt.ap({parent}, {end});"));

        self.out.open(&format!("const {update} = () => {{"));
        self.out.line(&format!("const {host} = {start}.parentNode;"));
        self.out.line(&format!("if (!{host}) return;"));
        self.out.line(&format!("let {cursor} = {start}.nextSibling;"));
        self.out.open(&format!("while ({cursor} && {cursor} !== {end}) {{"));
        self.out.line(&format!("__rt.beforeRemove({cursor});"));
        self.out.line(&format!("const next = {cursor}.nextSibling;"));
        self.out.line(&format!("{host}.removeChild({cursor});"));
        self.out.line(&format!("{cursor} = next;"));
        self.out.close("}");
        self.out.line(&format!("const {frag} = __rt.df();"));
        build(self, &frag);
        self.out.line(&format!("{host}.insertBefore({frag}, {end});"));
        self.out.close("};");

        self.out.line(&format!("{update}();"));
        if !deps.is_empty() {
            self.out
                .line(&format!("{ctx}.__sub({}, {update});", js_array(&deps)));
        }
    }

    fn if_block(&mut self, block: &IfBlock, parent: &str, svg: bool) {
        for (i, branch) in block.branches.iter().enumerate() {
            let test = self.ctx.qualify(&branch.test.code);
            if i == 0 {
                self.out
                    .open_at(&format!("if ({test}) {{"), branch.span.start);
            } else {
                self.out
                    .reopen_at(&format!("}} else if ({test}) {{"), branch.span.start);
            }
            self.nodes(&branch.consequent, parent, Mode::Static, svg);
        }
        if let Some(alternate) = &block.alternate {
            self.out.reopen_at("} else {", alternate.span.start);
            self.nodes(&alternate.consequent, parent, Mode::Static, svg);
        }
        self.out.close("}");
    }

    fn for_block(&mut self, block: &ForBlock, parent: &str, svg: bool) {
        let items = self.ctx.assign_id("items");
        let index = self.ctx.assign_id("i");
        let iterable = self.iterable(&block.iterable.code);
        self.out.line_at(
            &format!("const {items} = __rt.toArray({iterable});"),
            block.iterable.span.start,
        );

        let has_empty = block.empty.is_some();
        if let Some(empty) = &block.empty {
            self.out.open(&format!("if ({items}.length === 0) {{"));
            self.nodes(empty, parent, Mode::Static, svg);
            self.out.reopen("} else {");
        }

        self.out.open(&format!(
            "for (let {index} = 0; {index} < {items}.length; {index}++) {{"
        ));
        self.out.line(&format!("const {} = {items}[{index}];", block.item));

        let mut shadowed = vec![block.item.clone()];
        if let Some(meta) = &block.meta {
            let fields = LOOP_META_FIELDS
                .iter()
                .map(|field| format!("{field}: {}", meta_value(field, &index, &items)))
                .collect::<Vec<_>>()
                .join(", ");
            match meta {
                LoopMeta::Ident(name) => {
                    self.out.line(&format!("const {name} = {{ {fields} }};"));
                    shadowed.push(name.clone());
                }
                LoopMeta::Destructured(names) => {
                    self.out
                        .line(&format!("const {{ {} }} = {{ {fields} }};", names.join(", ")));
                    shadowed.extend(names.iter().cloned());
                }
            }
        }

        let mark = self.ctx.shadow(shadowed);
        self.nodes(&block.body, parent, Mode::Static, svg);
        self.ctx.unshadow(mark);

        self.out.close("}");
        if has_empty {
            self.out.close("}");
        }
    }

    /// JS for a loop source: `rev x` reverses, `a..b` is an inclusive range.
    fn iterable(&self, code: &str) -> String {
        let code = code.trim();
        if let Some(rest) = code
            .strip_prefix("rev")
            .filter(|rest| rest.starts_with(|c: char| c.is_whitespace() || c == '('))
        {
            return format!("__rt.rev({})", self.iterable(strip_parens(rest.trim())));
        }
        if let Some(at) = range_operator(code) {
            let low = self.ctx.qualify(code[..at].trim());
            let high = self.ctx.qualify(code[at + 2..].trim());
            return format!("__rt.range(({low}), ({high}))");
        }
        format!("({})", self.ctx.qualify(code))
    }

    fn switch_block(&mut self, block: &SwitchBlock, parent: &str, svg: bool) {
        if block.cases.is_empty() {
            if let Some(default) = &block.default_case {
                self.nodes(default, parent, Mode::Static, svg);
            }
            return;
        }

        let value = self.ctx.assign_id("switch");
        let discriminant = self.ctx.qualify(&block.discriminant.code);
        self.out.line_at(
            &format!("const {value} = ({discriminant});"),
            block.discriminant.span.start,
        );

        for (i, case) in block.cases.iter().enumerate() {
            let mut test = format!("{value} === ({})", self.ctx.qualify(&case.pattern.code));
            if let Some(guard) = &case.guard {
                test.push_str(&format!(" && ({})", self.ctx.qualify(&guard.code)));
            }
            if i == 0 {
                self.out.open_at(&format!("if ({test}) {{"), case.span.start);
            } else {
                self.out
                    .reopen_at(&format!("}} else if ({test}) {{"), case.span.start);
            }
            self.nodes(&case.body, parent, Mode::Static, svg);
        }
        if let Some(default) = &block.default_case {
            self.out.reopen("} else {");
            self.nodes(default, parent, Mode::Static, svg);
        }
        self.out.close("}");
    }

    // =========================================================================
    // Components and slots
    // =========================================================================

    fn invocation(&mut self, el: &Element, parent: &str) {
        let props = self.ctx.assign_id("props");
        self.out
            .line_at(&format!("const {props} = {{}};"), el.span.start);

        for attribute in &el.attributes {
            let pos = attribute.span().start;
            match attribute {
                Attribute::Regular(attr) => {
                    let value = match &attr.value {
                        None => "true".to_string(),
                        Some(AttributeValue::Text(text)) => js_string(&text.value),
                        Some(AttributeValue::Expr(expr)) if event_name(&attr.name).is_some() => {
                            self.handler(&expr.code)
                        }
                        Some(AttributeValue::Expr(expr)) => {
                            format!("({})", self.ctx.qualify(&expr.code))
                        }
                    };
                    self.out
                        .line_at(&format!("{props}[{}] = {value};", js_string(&attr.name)), pos);
                }
                Attribute::Shorthand(attr) => {
                    let value = match event_name(&attr.name) {
                        Some(_) => self.handler(&attr.name),
                        None => self.ctx.qualify(&attr.name),
                    };
                    self.out
                        .line_at(&format!("{props}[{}] = {value};", js_string(&attr.name)), pos);
                }
                Attribute::Spread(attr) => {
                    let value = self.ctx.qualify(&attr.argument.code);
                    self.out
                        .line_at(&format!("Object.assign({props}, ({value}));"), pos);
                }
            }
        }

        self.slots(el, &props);

        let start = self.ctx.assign_id("start");
        let end = self.ctx.assign_id("end");
        let inst = self.ctx.assign_id("inst");
        let cont = self.ctx.assign_id("cont");
        self.out.line(&format!("const {start} = __rt.cm(\"comp\");"));
        self.out.line(&format!("__rt.ap({parent}, {start});"));
        self.out.line(&format!("const {inst} = {}({props});", el.name));
        self.out.line(&format!("{start}.__owtInst = {inst};"));
        self.out.line(&format!("const {cont} = __rt.df();"));
        self.out.line(&format!("{inst}.mount({cont});"));
        self.out.line(&format!("__rt.ap({parent}, {cont});"));
        self.out.line(&format!("const {end} = __rt.cm(\"/comp\");"));
        self.out.line(&format!("__rt.ap({parent}, {end});"));
    }

    /// `props.__slots`: named `slot x { }` blocks, plus everything else as
    /// the default slot.
    fn slots(&mut self, el: &Element, props: &str) {
        let mut named: Vec<(&str, &[Node])> = Vec::new();
        let mut default: Vec<&Node> = Vec::new();
        for child in &el.children {
            match child {
                Node::SlotContent(slot) => match slot.name.as_deref() {
                    Some(name) if name != "default" => named.push((name, slot.body.as_slice())),
                    _ => default.extend(slot.body.iter()),
                },
                Node::Text(text) if text.value.trim().is_empty() => {}
                other => default.push(other),
            }
        }
        if named.is_empty() && default.is_empty() {
            return;
        }

        self.out.line(&format!("{props}.__slots = {{}};"));
        if !default.is_empty() {
            self.slot_function(props, "default", &default);
        }
        for (name, body) in named {
            let body: Vec<&Node> = body.iter().collect();
            self.slot_function(props, name, &body);
        }
    }

    fn slot_function(&mut self, props: &str, name: &str, body: &[&Node]) {
        let frag = self.ctx.assign_id("frag");
        self.out
            .open(&format!("{props}.__slots[{}] = () => {{", js_string(name)));
        self.out.line(&format!("const {frag} = __rt.df();"));
        for node in body {
            self.node(node, &frag, Mode::Static, false);
        }
        self.out.line(&format!("return {frag};"));
        self.out.close("};");
    }

    fn slot_placeholder(&mut self, slot: &SlotPlaceholder, parent: &str, mode: Mode, svg: bool) {
        let id = self.ctx.assign_id("slot");
        let name = js_string(slot.name.as_deref().unwrap_or("default"));
        self.out.line_at(
            &format!("const {id} = props.__slots && props.__slots[{name}];"),
            slot.span.start,
        );

        let has_fallback = slot
            .fallback
            .iter()
            .any(|n| !matches!(n, Node::Text(t) if t.value.trim().is_empty()));
        if !has_fallback {
            self.out.line(&format!(
                "if (typeof {id} === \"function\") __rt.ap({parent}, {id}());"
            ));
            return;
        }
        self.out.open(&format!("if (typeof {id} === \"function\") {{"));
        self.out.line(&format!("__rt.ap({parent}, {id}());"));
        self.out.reopen("} else {");
        self.nodes(&slot.fallback, parent, mode, svg);
        self.out.close("}");
    }
}

fn attribute_setter(el: &str, name: &str, value: &str, svg: bool) -> String {
    if svg {
        return format!("__rt.a({el}, {}, ({value}));", js_string(name));
    }
    if let Some(prop) = boolean_property(name) {
        return format!("{el}.{prop} = !!({value});");
    }
    if name == "value" || name == "textContent" {
        return format!("{el}.{name} = String(({value}) ?? \"\");");
    }
    format!("__rt.a({el}, {}, ({value}));", js_string(name))
}

/// DOM property behind a boolean attribute.
fn boolean_property(name: &str) -> Option<&'static str> {
    let lower = name.to_ascii_lowercase();
    let found = BOOLEAN_ATTRIBUTES.iter().find(|b| **b == lower)?;
    Some(if *found == "readonly" { "readOnly" } else { *found })
}

fn meta_value(field: &str, index: &str, items: &str) -> String {
    match field {
        "index" => index.to_string(),
        "first" => format!("{index} === 0"),
        "last" => format!("{index} === {items}.length - 1"),
        "even" => format!("{index} % 2 === 0"),
        _ => format!("{index} % 2 === 1"),
    }
}

/// Offset of a top-level `..` that is not part of `...`.
fn range_operator(code: &str) -> Option<usize> {
    let bytes = code.as_bytes();
    script::top_level_matches(code, "..")
        .into_iter()
        .find(|&at| {
            (at == 0 || bytes[at - 1] != b'.') && bytes.get(at + 2) != Some(&b'.')
        })
}

/// `x` for `(x)`, when the outer parentheses enclose all of `code`.
fn strip_parens(code: &str) -> &str {
    let masked = script::mask(code);
    if !masked.starts_with('(') || !masked.ends_with(')') {
        return code;
    }
    let mut depth = 0usize;
    for (i, b) in masked.bytes().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return if i == masked.len() - 1 { &code[1..i] } else { code };
                }
            }
            _ => {}
        }
    }
    code
}

/// Bind reserved-word props under a legal local name: `{ class }` becomes
/// `{ class: _class }`. Returns the pattern and each (prop, local) pair.
fn rename_reserved_props(pattern: &str) -> (String, Vec<(String, String)>) {
    let masked = script::mask(pattern);
    let bytes = masked.as_bytes();
    let mut out = String::with_capacity(pattern.len());
    let mut renamed: Vec<(String, String)> = Vec::new();
    let mut cursor = 0;

    for ident in script::identifiers(pattern) {
        if matches!(ident.kind, IdentKind::Key | IdentKind::Property)
            || !RESERVED_WORDS.contains(&ident.name)
        {
            continue;
        }
        let local = format!("_{}", ident.name);
        out.push_str(&pattern[cursor..ident.range.start]);
        if in_object_pattern(bytes, ident.range.start) {
            out.push_str(ident.name);
            out.push_str(": ");
        }
        out.push_str(&local);
        cursor = ident.range.end;
        if !renamed.iter().any(|(prop, _)| prop == ident.name) {
            renamed.push((ident.name.to_string(), local));
        }
    }
    out.push_str(&pattern[cursor..]);
    (out, renamed)
}

/// Whether the binding at `at` stands directly in an object pattern, right
/// after `{` or `,`.
fn in_object_pattern(masked: &[u8], at: usize) -> bool {
    let mut open = Vec::new();
    for &b in &masked[..at] {
        match b {
            b'{' | b'[' | b'(' => open.push(b),
            b'}' | b']' | b')' => {
                open.pop();
            }
            _ => {}
        }
    }
    let prev = masked[..at].iter().rev().find(|b| !b.is_ascii_whitespace());
    open.last() == Some(&b'{') && matches!(prev, Some(b'{') | Some(b','))
}

/// Plain identifier parameters, which hide component state inside the body.
fn param_names(params: &str) -> Vec<String> {
    let masked = script::mask(params);
    let mut names = Vec::new();
    let mut depth = 0usize;
    let mut segment_start = 0;
    let bytes = masked.as_bytes();

    let mut push = |segment: &str| {
        let segment = segment.trim().trim_start_matches("...");
        let name: String = segment
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '$')
            .collect();
        if !name.is_empty() && !name.starts_with(|c: char| c.is_ascii_digit()) {
            names.push(name);
        }
    };

    for (i, b) in bytes.iter().enumerate() {
        match b {
            b'(' | b'[' | b'{' | b'<' => depth += 1,
            b')' | b']' | b'}' | b'>' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                push(&masked[segment_start..i]);
                segment_start = i + 1;
            }
            _ => {}
        }
    }
    push(&masked[segment_start..]);
    names
}
