//! The tree-walking renderer. Pipeline-internal conditions are always
//! `Diagnostic`s, never `Result::Err` — a broken `extends` chain or a
//! missing macro degrades to partial output plus diagnostics rather than
//! aborting the whole render.

pub mod context;
mod expr;
pub mod inherit;
pub mod loop_var;
pub mod macros;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{MacroParam, Node, NodeKind};
use crate::diagnostics::{Diagnostic, DiagnosticType, Diagnostics};
use crate::environment::{Arguments, Environment};
use crate::value::{MacroValue, Object, Value};
use crate::{lexer, parser};

pub use context::Context;
pub use expr::eval_expr;
pub use macros::Macro;

use context::{BlockChain, RecursiveFrame, Scope, SuperTarget};
use loop_var::LoopState;

/// Lexes, parses, resolves `extends`, and executes `template_name`, returning
/// the rendered output and every diagnostic collected along the way.
pub fn render(
    source: &str,
    template_name: &str,
    env: &Environment,
    globals: HashMap<String, Value>,
) -> (String, Diagnostics) {
    let mut diagnostics = Diagnostics::new();
    let (tokens, lex_diags) = lexer::lex(source);
    diagnostics.extend(lex_diags);
    let (template, parse_diags) = parser::parse(tokens);
    diagnostics.extend(parse_diags);

    let (root_body, block_chains) =
        inherit::resolve_chain(template.body, template_name, env, &mut diagnostics);

    let mut ctx = Context::with_globals(globals);
    ctx.block_chains = block_chains;
    ctx.auto_escape_stack = vec![matches!(
        env.auto_escape_policy,
        crate::environment::AutoEscapePolicy::Enabled
    )];
    ctx.visited_templates.push(template_name.to_string());
    exec_body(&root_body, env, &mut ctx, &mut diagnostics);
    (ctx.output, diagnostics)
}

pub(crate) fn exec_body(nodes: &[Node], env: &Environment, ctx: &mut Context, diags: &mut Diagnostics) {
    for node in nodes {
        exec_node(node, env, ctx, diags);
    }
}

fn capture_body(nodes: &[Node], env: &Environment, ctx: &mut Context, diags: &mut Diagnostics) -> String {
    let saved = std::mem::take(&mut ctx.output);
    exec_body(nodes, env, ctx, diags);
    std::mem::replace(&mut ctx.output, saved)
}

fn bind_targets(target: &[String], item: &Value, ctx: &mut Context) {
    if target.len() == 1 {
        ctx.assign(target[0].clone(), item.clone());
        return;
    }
    let parts = item.iter_values().unwrap_or_default();
    for (i, name) in target.iter().enumerate() {
        ctx.assign(
            name.clone(),
            parts.get(i).cloned().unwrap_or_else(|| Value::undefined(name.clone())),
        );
    }
}

fn exec_node(node: &Node, env: &Environment, ctx: &mut Context, diags: &mut Diagnostics) {
    match &node.kind {
        NodeKind::Text(s) => ctx.output.push_str(s),
        NodeKind::Raw(s) => ctx.output.push_str(s),
        NodeKind::Comment(_) => {}
        NodeKind::Output(expr) => {
            let value = eval_expr(expr, env, ctx, diags);
            let escape = *ctx.auto_escape_stack.last().unwrap_or(&true);
            ctx.output.push_str(&if escape { value.escaped() } else { value.finalize() });
        }
        NodeKind::If { branches, else_body } => {
            for (cond, body) in branches {
                if eval_expr(cond, env, ctx, diags).is_truthy() {
                    exec_body(body, env, ctx, diags);
                    return;
                }
            }
            exec_body(else_body, env, ctx, diags);
        }
        NodeKind::For { target, iter, body, else_body, filter, recursive } => {
            let iterable = eval_expr(iter, env, ctx, diags);
            run_for_loop(target, &iterable, body, else_body, filter.as_deref(), *recursive, env, ctx, diags, node);
        }
        NodeKind::Set { target, value } => {
            let v = eval_expr(value, env, ctx, diags);
            bind_targets(target, &v, ctx);
        }
        NodeKind::SetBlock { target, body, filter } => {
            let captured = capture_body(body, env, ctx, diags);
            let value = match filter {
                Some(f) => expr::apply_named_filter(f, Value::string(captured), env, ctx, diags),
                None => Value::string(captured),
            };
            ctx.assign(target.clone(), value);
        }
        NodeKind::Macro { name, params, body } => {
            let mac = Macro {
                name: name.clone(),
                params: params.clone(),
                body: body.clone(),
                closure: ctx.snapshot_scopes(),
            };
            ctx.assign(name.clone(), Value::Macro(MacroValue(Rc::new(mac))));
        }
        NodeKind::CallBlock { call, call_params, body } => {
            exec_call_block(call, call_params, body, env, ctx, diags);
        }
        NodeKind::FilterBlock { filter, body } => {
            let captured = capture_body(body, env, ctx, diags);
            let value = expr::apply_named_filter(filter, Value::string(captured), env, ctx, diags);
            let escape = *ctx.auto_escape_stack.last().unwrap_or(&true);
            ctx.output.push_str(&if escape { value.escaped() } else { value.finalize() });
        }
        NodeKind::With { assignments, body } => {
            ctx.push_scope();
            for (name, expr) in assignments {
                let v = eval_expr(expr, env, ctx, diags);
                ctx.assign(name.clone(), v);
            }
            exec_body(body, env, ctx, diags);
            ctx.pop_scope();
        }
        NodeKind::Include { expr, ignore_missing, with_context } => {
            exec_include(expr, *ignore_missing, *with_context, env, ctx, diags, node);
        }
        NodeKind::Import { expr, name, with_context } => {
            let module = load_module(expr, *with_context, env, ctx, diags, node);
            ctx.assign(name.clone(), Value::string_dict(module.into_iter().collect()));
        }
        NodeKind::FromImport { expr, names, with_context } => {
            let module = load_module(expr, *with_context, env, ctx, diags, node);
            for (src_name, alias) in names {
                let v = module.get(src_name).cloned().unwrap_or_else(|| {
                    diags.push(Diagnostic::new(
                        DiagnosticType::UnknownVariable,
                        format!("`{src_name}` is not exported by the imported template"),
                        node.span,
                    ));
                    Value::undefined(src_name.clone())
                });
                ctx.assign(alias.clone().unwrap_or_else(|| src_name.clone()), v);
            }
        }
        NodeKind::Extends { .. } => {}
        NodeKind::Block { name, body, required, .. } => {
            exec_block(name, body, *required, env, ctx, diags, node);
        }
        NodeKind::Do { expr } => {
            eval_expr(expr, env, ctx, diags);
        }
        NodeKind::AutoEscape { enabled, body } => {
            ctx.auto_escape_stack.push(*enabled);
            exec_body(body, env, ctx, diags);
            ctx.auto_escape_stack.pop();
        }
    }
}

/// Renders a `{% block name %}` occurrence: the most-derived override if
/// `extends` resolution found one, else the literal body in front of us.
fn exec_block(name: &str, own_body: &[Node], required: bool, env: &Environment, ctx: &mut Context, diags: &mut Diagnostics, node: &Node) {
    let chain = ctx.block_chains.get(name).map(|c| c.bodies.clone());
    match chain {
        Some(bodies) if !bodies.is_empty() => {
            let root_fallback = Rc::new(own_body.to_vec());
            render_chain_level(&bodies, bodies.len() - 1, &root_fallback, env, ctx, diags);
        }
        _ => {
            if required {
                diags.push(Diagnostic::new(
                    DiagnosticType::UnsupportedNode,
                    format!("block `{name}` is `required` but has no overriding definition"),
                    node.span,
                ));
            }
            exec_body(own_body, env, ctx, diags);
        }
    }
}

/// Renders `bodies[index]`, pushing the `super()` target a caller inside it
/// should resolve to.
pub(crate) fn render_chain_level(
    bodies: &[Rc<Vec<Node>>],
    index: usize,
    root_fallback: &Rc<Vec<Node>>,
    env: &Environment,
    ctx: &mut Context,
    diags: &mut Diagnostics,
) {
    let next = if index > 0 {
        SuperTarget::ChainIndex {
            bodies: bodies.to_vec(),
            index: index - 1,
            root_fallback: root_fallback.clone(),
        }
    } else {
        SuperTarget::RootBody(root_fallback.clone())
    };
    ctx.super_stack.push(next);
    exec_body(&bodies[index], env, ctx, diags);
    ctx.super_stack.pop();
}

fn exec_call_block(call: &crate::ast::Expr, call_params: &[MacroParam], body: &[Node], env: &Environment, ctx: &mut Context, diags: &mut Diagnostics) {
    let caller = Macro {
        name: "caller".to_string(),
        params: call_params.to_vec(),
        body: body.to_vec(),
        closure: ctx.snapshot_scopes(),
    };
    let crate::ast::ExprKind::Call { callee, args } = &call.kind else {
        diags.push(Diagnostic::new(
            DiagnosticType::UnsupportedNode,
            "`call` tag target must be a call expression".to_string(),
            call.span,
        ));
        return;
    };
    let mut arguments = expr::eval_args(args, env, ctx, diags);
    arguments
        .kwargs
        .insert("caller".to_string(), Value::Macro(MacroValue(Rc::new(caller))));
    let callee_val = eval_expr(callee, env, ctx, diags);
    let result = invoke_resolved(callee_val, arguments, env, ctx, diags, call.span);
    ctx.output.push_str(&result.finalize());
}

pub(crate) fn invoke_resolved(value: Value, arguments: Arguments, env: &Environment, ctx: &mut Context, diags: &mut Diagnostics, span: crate::diagnostics::Span) -> Value {
    match value {
        Value::Macro(MacroValue(mac)) => call_macro(&mac, arguments, env, ctx, diags),
        Value::Object(obj) => obj.call(arguments).unwrap_or_else(|e| {
            diags.push(Diagnostic::new(DiagnosticType::InvalidOperand, e, span));
            Value::undefined("call")
        }),
        other => {
            diags.push(Diagnostic::new(
                DiagnosticType::UnknownFunction,
                format!("value of type `{}` is not callable", other.type_name()),
                span,
            ));
            Value::undefined("call")
        }
    }
}

pub(crate) fn call_macro(mac: &Macro, args: Arguments, env: &Environment, ctx: &mut Context, diags: &mut Diagnostics) -> Value {
    if ctx.depth() > 256 {
        diags.push(Diagnostic::new(
            DiagnosticType::TemplateCycle,
            format!("macro `{}` recursion is too deep", mac.name),
            crate::diagnostics::Span::point(crate::diagnostics::Position::start()),
        ));
        return Value::undefined(mac.name.clone());
    }
    let new_scope: Scope = Rc::new(RefCell::new(HashMap::new()));
    for (i, param) in mac.params.iter().enumerate() {
        let value = args
            .positional
            .get(i)
            .cloned()
            .or_else(|| args.kwargs.get(&param.name).cloned())
            .or_else(|| param.default.as_ref().map(|d| eval_expr(d, env, ctx, diags)))
            .unwrap_or_else(|| Value::undefined(param.name.clone()));
        new_scope.borrow_mut().insert(param.name.clone(), value);
    }
    if let Some(caller) = args.kwargs.get("caller") {
        new_scope.borrow_mut().insert("caller".to_string(), caller.clone());
    }
    let mut closure_scopes = mac.closure.clone();
    closure_scopes.push(new_scope);
    let saved = ctx.swap_scopes(closure_scopes);
    let captured = capture_body(&mac.body, env, ctx, diags);
    ctx.swap_scopes(saved);
    Value::safe(captured)
}

#[allow(clippy::too_many_arguments)]
fn run_for_loop(
    target: &[String],
    iterable: &Value,
    body: &[Node],
    else_body: &[Node],
    filter: Option<&crate::ast::Expr>,
    recursive: bool,
    env: &Environment,
    ctx: &mut Context,
    diags: &mut Diagnostics,
    node: &Node,
) {
    let raw_items = match iterable.iter_values() {
        Some(items) => items,
        None => {
            if !iterable.is_undefined() {
                diags.push(Diagnostic::new(
                    DiagnosticType::NotIterable,
                    format!("value of type `{}` is not iterable", iterable.type_name()),
                    node.span,
                ));
            }
            exec_body(else_body, env, ctx, diags);
            return;
        }
    };

    let filtered = if let Some(filter_expr) = filter {
        ctx.push_scope();
        let mut kept = Vec::new();
        for item in &raw_items {
            bind_targets(target, item, ctx);
            if eval_expr(filter_expr, env, ctx, diags).is_truthy() {
                kept.push(item.clone());
            }
        }
        ctx.pop_scope();
        kept
    } else {
        raw_items
    };

    if filtered.is_empty() {
        exec_body(else_body, env, ctx, diags);
        return;
    }

    let length = filtered.len();
    if recursive {
        ctx.recursive_for_stack.push(RecursiveFrame {
            target: target.to_vec(),
            body: Rc::new(body.to_vec()),
            filter: filter.cloned().map(Rc::new),
        });
    }
    ctx.for_depth += 1;
    let mut prev_loop: Option<LoopState> = None;
    for (i, item) in filtered.iter().enumerate() {
        ctx.push_scope();
        bind_targets(target, item, ctx);
        let previtem = if i > 0 { filtered[i - 1].clone() } else { Value::undefined("previtem") };
        let nextitem = if i + 1 < length { filtered[i + 1].clone() } else { Value::undefined("nextitem") };
        let mut loop_state = LoopState::new(i, length, ctx.for_depth - 1, previtem, nextitem);
        if let Some(prev) = &prev_loop {
            loop_state.share_changed_state(prev);
        }
        ctx.assign("loop", Value::Object(Rc::new(loop_state.clone())));
        prev_loop = Some(loop_state);
        exec_body(body, env, ctx, diags);
        ctx.pop_scope();
    }
    ctx.for_depth -= 1;
    if recursive {
        ctx.recursive_for_stack.pop();
    }
}

/// Handles `{{ loop(iterable) }}` inside a `{% for ... recursive %}` body.
pub(crate) fn call_recursive_loop(args: Arguments, env: &Environment, ctx: &mut Context, diags: &mut Diagnostics) -> Value {
    let frame = match ctx.recursive_for_stack.last() {
        Some(f) => f,
        None => return Value::safe(String::new()),
    };
    let target = frame.target.clone();
    let body = frame.body.clone();
    let filter = frame.filter.clone();
    let iterable = args.positional.into_iter().next().unwrap_or(Value::None);
    let saved_out = std::mem::take(&mut ctx.output);
    let synthetic_span = crate::diagnostics::Span::point(crate::diagnostics::Position::start());
    let dummy = Node::new(NodeKind::Text(String::new()), synthetic_span);
    run_for_loop(&target, &iterable, &body, &[], filter.as_deref(), true, env, ctx, diags, &dummy);
    let captured = std::mem::replace(&mut ctx.output, saved_out);
    Value::safe(captured)
}

fn load_module(
    expr: &crate::ast::Expr,
    with_context: bool,
    env: &Environment,
    ctx: &mut Context,
    diags: &mut Diagnostics,
    node: &Node,
) -> HashMap<String, Value> {
    let name = match eval_expr(expr, env, ctx, diags).as_str() {
        Some(s) => s.to_string(),
        None => {
            diags.push(Diagnostic::new(
                DiagnosticType::TemplateNotFound,
                "import target must evaluate to a template name".to_string(),
                node.span,
            ));
            return HashMap::new();
        }
    };
    if ctx.visited_templates.contains(&name) || ctx.visited_templates.len() > 64 {
        diags.push(Diagnostic::new(
            DiagnosticType::TemplateCycle,
            format!("cycle while importing `{name}`"),
            node.span,
        ));
        return HashMap::new();
    }
    let module_template = match inherit::load_and_parse(env, &name, diags) {
        Some(t) => t,
        None => {
            diags.push(Diagnostic::new(
                DiagnosticType::TemplateNotFound,
                format!("template `{name}` not found"),
                node.span,
            ));
            return HashMap::new();
        }
    };
    ctx.visited_templates.push(name);
    let base_scope: Scope = Rc::new(RefCell::new(HashMap::new()));
    if with_context {
        for scope in ctx.snapshot_scopes() {
            for (k, v) in scope.borrow().iter() {
                base_scope.borrow_mut().insert(k.clone(), v.clone());
            }
        }
    }
    let saved = ctx.swap_scopes(vec![base_scope]);
    let saved_out = std::mem::take(&mut ctx.output);
    exec_body(&module_template.body, env, ctx, diags);
    ctx.output = saved_out;
    let module_scope = ctx.current_scope();
    let result = module_scope.borrow().clone();
    ctx.swap_scopes(saved);
    ctx.visited_templates.pop();
    result
}

fn exec_include(
    expr: &crate::ast::Expr,
    ignore_missing: bool,
    with_context: bool,
    env: &Environment,
    ctx: &mut Context,
    diags: &mut Diagnostics,
    node: &Node,
) {
    let name = match eval_expr(expr, env, ctx, diags).as_str() {
        Some(s) => s.to_string(),
        None => {
            if !ignore_missing {
                diags.push(Diagnostic::new(
                    DiagnosticType::TemplateNotFound,
                    "include target must evaluate to a template name".to_string(),
                    node.span,
                ));
            }
            return;
        }
    };
    if ctx.visited_templates.contains(&name) || ctx.visited_templates.len() > 64 {
        diags.push(Diagnostic::new(
            DiagnosticType::TemplateCycle,
            format!("cycle while including `{name}`"),
            node.span,
        ));
        return;
    }
    let included = match inherit::load_and_parse(env, &name, diags) {
        Some(t) => t,
        None => {
            if !ignore_missing {
                diags.push(Diagnostic::new(
                    DiagnosticType::TemplateNotFound,
                    format!("template `{name}` not found"),
                    node.span,
                ));
            }
            return;
        }
    };
    ctx.visited_templates.push(name);
    if with_context {
        exec_body(&included.body, env, ctx, diags);
    } else {
        let saved = ctx.swap_scopes(vec![Rc::new(RefCell::new(HashMap::new()))]);
        exec_body(&included.body, env, ctx, diags);
        ctx.swap_scopes(saved);
    }
    ctx.visited_templates.pop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::MemoryLoader;

    fn render_str(source: &str) -> String {
        let env = Environment::new();
        let (out, _diags) = render(source, "<test>", &env, HashMap::new());
        out
    }

    #[test]
    fn renders_text_and_output() {
        assert_eq!(render_str("hi {{ 1 + 2 }}"), "hi 3");
    }

    #[test]
    fn if_else_branches() {
        assert_eq!(render_str("{% if false %}a{% else %}b{% endif %}"), "b");
    }

    #[test]
    fn for_loop_with_loop_var() {
        assert_eq!(
            render_str("{% for x in [1,2,3] %}{{ loop.index }}:{{ x }} {% endfor %}"),
            "1:1 2:2 3:3 "
        );
    }

    #[test]
    fn undefined_variable_renders_empty_and_warns() {
        let env = Environment::new();
        let (out, diags) = render("{{ missing }}", "<t>", &env, HashMap::new());
        assert_eq!(out, "");
        assert!(diags.iter().any(|d| d.id == "Renderer/UnknownVariable"));
    }

    #[test]
    fn macro_call_renders_body() {
        assert_eq!(
            render_str("{% macro greet(name) %}hi {{ name }}{% endmacro %}{{ greet('x') }}"),
            "hi x"
        );
    }

    #[test]
    fn extends_overrides_block_with_super() {
        let loader =
            MemoryLoader::new().with("base.html", "before{% block body %}base{% endblock %}after");
        let env = Environment::new().with_loader(loader);
        let child = "{% extends 'base.html' %}{% block body %}[{{ super() }}]{% endblock %}";
        let (out, diags) = render(child, "child.html", &env, HashMap::new());
        assert!(!diags.has_errors());
        assert_eq!(out, "before[base]after");
    }

    #[test]
    fn autoescape_escapes_html_by_default() {
        assert_eq!(render_str("{{ '<b>' }}"), "&lt;b&gt;");
    }
}
