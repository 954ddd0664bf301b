//! Expression evaluation.

use std::collections::HashMap;

use crate::ast::{BinOp, CallArgs, Expr, ExprKind, Literal, UnaryOp};
use crate::diagnostics::{Diagnostic, DiagnosticType, Diagnostics};
use crate::environment::{Arguments, Environment};
use crate::value::{values_compare, values_equal, Value};

use super::context::Context;
use super::invoke_resolved;

pub fn eval_expr(expr: &Expr, env: &Environment, ctx: &mut Context, diags: &mut Diagnostics) -> Value {
    match &expr.kind {
        ExprKind::Literal(lit) => eval_literal(lit),
        ExprKind::Name(name) => eval_name(name, env, ctx, diags, expr),
        ExprKind::ListLiteral(items) | ExprKind::TupleLiteral(items) => {
            Value::array(items.iter().map(|e| eval_expr(e, env, ctx, diags)).collect())
        }
        ExprKind::DictLiteral(pairs) => Value::dict(
            pairs
                .iter()
                .map(|(k, v)| (eval_expr(k, env, ctx, diags), eval_expr(v, env, ctx, diags)))
                .collect(),
        ),
        ExprKind::Group(inner) => eval_expr(inner, env, ctx, diags),
        ExprKind::Unary(op, inner) => eval_unary(*op, inner, env, ctx, diags, expr),
        ExprKind::Binary(BinOp::And, lhs, rhs) => {
            let l = eval_expr(lhs, env, ctx, diags);
            if l.is_truthy() {
                eval_expr(rhs, env, ctx, diags)
            } else {
                l
            }
        }
        ExprKind::Binary(BinOp::Or, lhs, rhs) => {
            let l = eval_expr(lhs, env, ctx, diags);
            if l.is_truthy() {
                l
            } else {
                eval_expr(rhs, env, ctx, diags)
            }
        }
        ExprKind::Binary(op, lhs, rhs) => {
            let l = eval_expr(lhs, env, ctx, diags);
            let r = eval_expr(rhs, env, ctx, diags);
            eval_binary(*op, l, r, diags, expr)
        }
        ExprKind::Ternary { cond, then_expr, else_expr } => {
            if eval_expr(cond, env, ctx, diags).is_truthy() {
                eval_expr(then_expr, env, ctx, diags)
            } else {
                eval_expr(else_expr, env, ctx, diags)
            }
        }
        ExprKind::GetAttr(base, name) => {
            let base_val = eval_expr(base, env, ctx, diags);
            if base_val.is_strict_undefined() {
                diags.push(Diagnostic::new(
                    DiagnosticType::InvalidOperand,
                    format!("cannot access `.{name}` on an undefined value"),
                    expr.span,
                ));
                return base_val;
            }
            base_val.get_attr(name)
        }
        ExprKind::GetItem(base, index) => {
            let base_val = eval_expr(base, env, ctx, diags);
            if base_val.is_strict_undefined() {
                diags.push(Diagnostic::new(
                    DiagnosticType::InvalidOperand,
                    "cannot index an undefined value".to_string(),
                    expr.span,
                ));
                return base_val;
            }
            eval_get_item(base_val, index, env, ctx, diags)
        }
        ExprKind::Slice { .. } => Value::None,
        ExprKind::Call { callee, args } => eval_call(callee, args, env, ctx, diags, expr.span),
        ExprKind::Filter { name, expr: inner, args } => {
            let value = if name == "default" || name == "d" {
                eval_operand_for_definedness(inner, env, ctx, diags)
            } else {
                eval_expr(inner, env, ctx, diags)
            };
            apply_filter(name, args, value, env, ctx, diags, expr.span)
        }
        ExprKind::Test { expr: inner, name, args, negated } => {
            let value = if matches!(name.as_str(), "defined" | "undefined" | "none") {
                eval_operand_for_definedness(inner, env, ctx, diags)
            } else {
                eval_expr(inner, env, ctx, diags)
            };
            let arguments = eval_args(args, env, ctx, diags);
            let result = match env.test(name) {
                Some(f) => f(value, arguments).unwrap_or_else(|e| {
                    diags.push(Diagnostic::new(DiagnosticType::InvalidOperand, e, expr.span));
                    false
                }),
                None => {
                    diags.push(Diagnostic::new(
                        DiagnosticType::UnknownTest,
                        format!("unknown test `{name}`"),
                        expr.span,
                    ));
                    false
                }
            };
            Value::Bool(if *negated { !result } else { result })
        }
        ExprKind::Concat(parts) => {
            let mut out = String::new();
            for part in parts {
                out.push_str(&eval_expr(part, env, ctx, diags).finalize());
            }
            Value::string(out)
        }
    }
}

fn eval_literal(lit: &Literal) -> Value {
    match lit {
        Literal::None => Value::None,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int64(*i),
        Literal::Float(f) => Value::Float64(*f),
        Literal::Str(s) => Value::string(s.clone()),
    }
}

fn eval_name(name: &str, env: &Environment, ctx: &mut Context, diags: &mut Diagnostics, expr: &Expr) -> Value {
    if let Some(v) = ctx.lookup(name) {
        return v;
    }
    if let Some(v) = env.global(name) {
        return v;
    }
    diags.push(
        Diagnostic::new(
            DiagnosticType::UnknownVariable,
            format!("`{name}` is undefined"),
            expr.span,
        ),
    );
    use crate::environment::UndefinedPolicy;
    if env.undefined_policy == UndefinedPolicy::Strict {
        Value::strict_undefined(name.to_string())
    } else {
        Value::undefined(name.to_string())
    }
}

/// Evaluates a name without reporting it as unknown, for use where a missing
/// variable is itself the thing under test (`is defined`/`undefined`/`none`,
/// the `default`/`d` filter). Anything other than a bare name is evaluated
/// normally, diagnostics and all.
fn eval_operand_for_definedness(expr: &Expr, env: &Environment, ctx: &mut Context, diags: &mut Diagnostics) -> Value {
    match &expr.kind {
        ExprKind::Name(name) => eval_name_quiet(name, env, ctx),
        _ => eval_expr(expr, env, ctx, diags),
    }
}

fn eval_name_quiet(name: &str, env: &Environment, ctx: &Context) -> Value {
    if let Some(v) = ctx.lookup(name) {
        return v;
    }
    if let Some(v) = env.global(name) {
        return v;
    }
    use crate::environment::UndefinedPolicy;
    if env.undefined_policy == UndefinedPolicy::Strict {
        Value::strict_undefined(name.to_string())
    } else {
        Value::undefined(name.to_string())
    }
}

fn eval_unary(op: UnaryOp, inner: &Expr, env: &Environment, ctx: &mut Context, diags: &mut Diagnostics, expr: &Expr) -> Value {
    let v = eval_expr(inner, env, ctx, diags);
    match op {
        UnaryOp::Not => Value::Bool(!v.is_truthy()),
        UnaryOp::Neg => match &v {
            Value::Int64(i) => Value::Int64(-i),
            Value::Float64(f) => Value::Float64(-f),
            _ => match v.as_f64() {
                Some(f) => Value::Float64(-f),
                None => {
                    diags.push(Diagnostic::new(
                        DiagnosticType::InvalidOperand,
                        format!("cannot negate a {}", v.type_name()),
                        expr.span,
                    ));
                    v
                }
            },
        },
        UnaryOp::Pos => match v.as_f64() {
            Some(_) => v,
            None => {
                diags.push(Diagnostic::new(
                    DiagnosticType::InvalidOperand,
                    format!("unary `+` is not defined for {}", v.type_name()),
                    expr.span,
                ));
                v
            }
        },
    }
}

fn is_stringy(v: &Value) -> bool {
    matches!(v, Value::String(_) | Value::SafeString(_))
}

fn eval_binary(op: BinOp, l: Value, r: Value, diags: &mut Diagnostics, expr: &Expr) -> Value {
    match op {
        BinOp::Add => match (&l, &r) {
            (Value::Array(_), Value::Array(_)) => {
                let mut items = l.iter_values().unwrap_or_default();
                items.extend(r.iter_values().unwrap_or_default());
                Value::array(items)
            }
            _ if is_stringy(&l) || is_stringy(&r) => {
                Value::string(format!("{}{}", l.finalize(), r.finalize()))
            }
            _ => numeric_binary(l, r, diags, expr, |a, b| a + b, |a, b| a.checked_add(b)),
        },
        BinOp::Sub => numeric_binary(l, r, diags, expr, |a, b| a - b, |a, b| a.checked_sub(b)),
        BinOp::Mul => match (&l, &r) {
            (Value::String(s), Value::Int64(n)) | (Value::SafeString(s), Value::Int64(n)) => {
                Value::string(s.repeat((*n).max(0) as usize))
            }
            (Value::Int64(n), Value::String(s)) | (Value::Int64(n), Value::SafeString(s)) => {
                Value::string(s.repeat((*n).max(0) as usize))
            }
            _ => numeric_binary(l, r, diags, expr, |a, b| a * b, |a, b| a.checked_mul(b)),
        },
        BinOp::Div => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) if b != 0.0 => Value::Float64(a / b),
            (Some(_), Some(_)) => {
                diags.push(Diagnostic::new(DiagnosticType::InvalidOperand, "division by zero".to_string(), expr.span));
                Value::Float64(f64::NAN)
            }
            _ => invalid_operand(diags, expr, &l, &r),
        },
        BinOp::FloorDiv => match (&l, &r) {
            (Value::Int64(a), Value::Int64(b)) => {
                if *b == 0 {
                    diags.push(Diagnostic::new(DiagnosticType::InvalidOperand, "division by zero".to_string(), expr.span));
                    Value::Int64(0)
                } else {
                    Value::Int64(a.div_euclid(*b))
                }
            }
            _ => match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) if b != 0.0 => Value::Float64((a / b).floor()),
                (Some(_), Some(_)) => {
                    diags.push(Diagnostic::new(DiagnosticType::InvalidOperand, "division by zero".to_string(), expr.span));
                    Value::Float64(f64::NAN)
                }
                _ => invalid_operand(diags, expr, &l, &r),
            },
        },
        BinOp::Mod => match (&l, &r) {
            (Value::Int64(a), Value::Int64(b)) if *b != 0 => Value::Int64(a.rem_euclid(*b)),
            _ => match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) if b != 0.0 => Value::Float64(a % b),
                _ => invalid_operand(diags, expr, &l, &r),
            },
        },
        BinOp::Pow => match (&l, &r) {
            (Value::Int64(a), Value::Int64(b)) if *b >= 0 => match (*b).try_into() {
                Ok(exp) => match a.checked_pow(exp) {
                    Some(v) => Value::Int64(v),
                    None => Value::Float64((*a as f64).powf(*b as f64)),
                },
                Err(_) => Value::Float64((*a as f64).powf(*b as f64)),
            },
            _ => match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) => Value::Float64(a.powf(b)),
                _ => invalid_operand(diags, expr, &l, &r),
            },
        },
        BinOp::Concat => Value::string(format!("{}{}", l.finalize(), r.finalize())),
        BinOp::Eq => Value::Bool(values_equal(&l, &r)),
        BinOp::Ne => Value::Bool(!values_equal(&l, &r)),
        BinOp::Lt => compare(&l, &r, diags, expr, std::cmp::Ordering::is_lt),
        BinOp::Gt => compare(&l, &r, diags, expr, std::cmp::Ordering::is_gt),
        BinOp::Le => compare(&l, &r, diags, expr, std::cmp::Ordering::is_le),
        BinOp::Ge => compare(&l, &r, diags, expr, std::cmp::Ordering::is_ge),
        BinOp::In => Value::Bool(contains(&l, &r)),
        BinOp::NotIn => Value::Bool(!contains(&l, &r)),
        BinOp::And | BinOp::Or => unreachable!("short-circuit ops handled in eval_expr"),
    }
}

fn numeric_binary(
    l: Value,
    r: Value,
    diags: &mut Diagnostics,
    expr: &Expr,
    float_op: impl Fn(f64, f64) -> f64,
    int_op: impl Fn(i64, i64) -> Option<i64>,
) -> Value {
    match (&l, &r) {
        (Value::Int64(a), Value::Int64(b)) => match int_op(*a, *b) {
            Some(v) => Value::Int64(v),
            None => Value::Float64(float_op(*a as f64, *b as f64)),
        },
        _ => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => Value::Float64(float_op(a, b)),
            _ => invalid_operand(diags, expr, &l, &r),
        },
    }
}

fn invalid_operand(diags: &mut Diagnostics, expr: &Expr, l: &Value, r: &Value) -> Value {
    diags.push(Diagnostic::new(
        DiagnosticType::InvalidOperand,
        format!("unsupported operand types: {} and {}", l.type_name(), r.type_name()),
        expr.span,
    ));
    Value::undefined("operand")
}

fn compare(l: &Value, r: &Value, diags: &mut Diagnostics, expr: &Expr, pred: impl Fn(std::cmp::Ordering) -> bool) -> Value {
    match values_compare(l, r) {
        Some(ord) => Value::Bool(pred(ord)),
        None => {
            diags.push(Diagnostic::new(
                DiagnosticType::InvalidOperand,
                format!("cannot compare {} and {}", l.type_name(), r.type_name()),
                expr.span,
            ));
            Value::Bool(false)
        }
    }
}

fn contains(needle: &Value, haystack: &Value) -> bool {
    match haystack {
        Value::String(s) | Value::SafeString(s) => needle
            .as_str()
            .map(|n| s.contains(n.as_ref()))
            .unwrap_or(false),
        Value::Array(_) | Value::Dict(_) | Value::StringDict(_) => haystack
            .iter_values()
            .map(|items| items.iter().any(|v| values_equal(v, needle)))
            .unwrap_or(false),
        _ => false,
    }
}

fn eval_get_item(base_val: Value, index_expr: &Expr, env: &Environment, ctx: &mut Context, diags: &mut Diagnostics) -> Value {
    if let ExprKind::Slice { start, stop, step } = &index_expr.kind {
        return eval_slice(
            &base_val,
            start.as_deref(),
            stop.as_deref(),
            step.as_deref(),
            env,
            ctx,
            diags,
        );
    }
    let index_val = eval_expr(index_expr, env, ctx, diags);
    base_val.get_item(&index_val)
}

fn eval_slice(
    base: &Value,
    start: Option<&Expr>,
    stop: Option<&Expr>,
    step: Option<&Expr>,
    env: &Environment,
    ctx: &mut Context,
    diags: &mut Diagnostics,
) -> Value {
    let step_n = step
        .map(|e| eval_expr(e, env, ctx, diags).as_i64().unwrap_or(1))
        .unwrap_or(1);
    if step_n == 0 {
        diags.push(Diagnostic::new(
            DiagnosticType::InvalidOperand,
            "slice step must not be zero".to_string(),
            start.or(stop).map(|e| e.span).unwrap_or(span_point()),
        ));
        return Value::array(Vec::new());
    }
    let start_n = start.map(|e| eval_expr(e, env, ctx, diags).as_i64().unwrap_or(0));
    let stop_n = stop.map(|e| eval_expr(e, env, ctx, diags).as_i64().unwrap_or(0));
    match base {
        Value::Array(_) => {
            let items = base.iter_values().unwrap_or_default();
            Value::array(slice_indices(items.len() as i64, start_n, stop_n, step_n).into_iter().map(|i| items[i as usize].clone()).collect())
        }
        Value::String(s) | Value::SafeString(s) => {
            let chars: Vec<char> = s.chars().collect();
            let sliced: String = slice_indices(chars.len() as i64, start_n, stop_n, step_n)
                .into_iter()
                .map(|i| chars[i as usize])
                .collect();
            if matches!(base, Value::SafeString(_)) {
                Value::safe(sliced)
            } else {
                Value::string(sliced)
            }
        }
        _ => Value::undefined("[]"),
    }
}

/// Python-style `slice.indices()` normalization.
fn slice_indices(len: i64, start: Option<i64>, stop: Option<i64>, step: i64) -> Vec<i64> {
    let norm = |v: i64| if v < 0 { v + len } else { v };
    let (lo_default, hi_default) = if step > 0 { (0, len) } else { (-1, len - 1) };
    let mut s = start.map(norm).unwrap_or(lo_default);
    let mut e = stop.map(norm).unwrap_or(hi_default);
    if step > 0 {
        s = s.clamp(0, len);
        e = e.clamp(0, len);
    } else {
        s = s.clamp(-1, len - 1);
        e = e.clamp(-1, len - 1);
    }
    let mut out = Vec::new();
    if step > 0 {
        let mut i = s;
        while i < e {
            out.push(i);
            i += step;
        }
    } else {
        let mut i = s;
        while i > e {
            out.push(i);
            i += step;
        }
    }
    out
}

fn span_point() -> crate::diagnostics::Span {
    crate::diagnostics::Span::point(crate::diagnostics::Position::start())
}

pub fn eval_args(args: &CallArgs, env: &Environment, ctx: &mut Context, diags: &mut Diagnostics) -> Arguments {
    let positional = args.positional.iter().map(|e| eval_expr(e, env, ctx, diags)).collect();
    let mut kwargs = HashMap::new();
    for (name, e) in &args.kwargs {
        kwargs.insert(name.clone(), eval_expr(e, env, ctx, diags));
    }
    Arguments::new(positional, kwargs)
}

fn apply_filter(
    name: &str,
    args: &CallArgs,
    value: Value,
    env: &Environment,
    ctx: &mut Context,
    diags: &mut Diagnostics,
    span: crate::diagnostics::Span,
) -> Value {
    let arguments = eval_args(args, env, ctx, diags);
    match env.filter(name) {
        Some(f) => f(value.clone(), arguments).unwrap_or_else(|e| {
            diags.push(Diagnostic::new(DiagnosticType::InvalidOperand, e, span));
            value
        }),
        None => {
            diags.push(Diagnostic::new(
                DiagnosticType::UnknownFilter,
                format!("unknown filter `{name}`"),
                span,
            ));
            value
        }
    }
}

/// Applies the single named filter stored on a `SetBlock`/`FilterBlock` node
/// (always a one-level `Filter` expression wrapping a placeholder name — see
/// `parser::stmt::parse_set`/`parse_filter_block`).
pub fn apply_named_filter(filter_expr: &Expr, base: Value, env: &Environment, ctx: &mut Context, diags: &mut Diagnostics) -> Value {
    if let ExprKind::Filter { name, args, .. } = &filter_expr.kind {
        apply_filter(name, args, base, env, ctx, diags, filter_expr.span)
    } else {
        base
    }
}

fn eval_call(
    callee: &Expr,
    args: &CallArgs,
    env: &Environment,
    ctx: &mut Context,
    diags: &mut Diagnostics,
    span: crate::diagnostics::Span,
) -> Value {
    if let ExprKind::Name(name) = &callee.kind {
        if name == "super" {
            return eval_super(ctx, env, diags);
        }
        if name == "loop" && !ctx.recursive_for_stack.is_empty() && ctx.lookup("loop").is_some() {
            let arguments = eval_args(args, env, ctx, diags);
            return super::call_recursive_loop(arguments, env, ctx, diags);
        }
        if let Some(v) = ctx.lookup(name) {
            let arguments = eval_args(args, env, ctx, diags);
            return invoke_resolved(v, arguments, env, ctx, diags, span);
        }
        if let Some(f) = env.function(name) {
            let arguments = eval_args(args, env, ctx, diags);
            return f(arguments).unwrap_or_else(|e| {
                diags.push(Diagnostic::new(DiagnosticType::InvalidOperand, e, span));
                Value::undefined(name.clone())
            });
        }
        diags.push(Diagnostic::new(
            DiagnosticType::UnknownFunction,
            format!("unknown function `{name}`"),
            span,
        ));
        return Value::undefined(name.clone());
    }
    if let ExprKind::GetAttr(base, attr) = &callee.kind {
        let base_val = eval_expr(base, env, ctx, diags);
        if attr == "items" || attr == "keys" || attr == "values" {
            if let Value::Dict(_) | Value::StringDict(_) = &base_val {
                return dict_method(&base_val, attr);
            }
        }
        if let Value::Object(obj) = &base_val {
            if let Some(method) = obj.method(attr) {
                let arguments = eval_args(args, env, ctx, diags);
                return method(arguments).unwrap_or_else(|e| {
                    diags.push(Diagnostic::new(DiagnosticType::InvalidOperand, e, span));
                    Value::undefined(attr.clone())
                });
            }
        }
        let attr_val = base_val.get_attr(attr);
        let arguments = eval_args(args, env, ctx, diags);
        return invoke_resolved(attr_val, arguments, env, ctx, diags, span);
    }
    let callee_val = eval_expr(callee, env, ctx, diags);
    let arguments = eval_args(args, env, ctx, diags);
    invoke_resolved(callee_val, arguments, env, ctx, diags, span)
}

fn dict_method(value: &Value, which: &str) -> Value {
    match value {
        Value::Dict(d) => {
            let pairs = d.borrow();
            match which {
                "items" => Value::array(pairs.iter().map(|(k, v)| Value::array(vec![k.clone(), v.clone()])).collect()),
                "keys" => Value::array(pairs.iter().map(|(k, _)| k.clone()).collect()),
                _ => Value::array(pairs.iter().map(|(_, v)| v.clone()).collect()),
            }
        }
        Value::StringDict(d) => {
            let map = d.borrow();
            match which {
                "items" => Value::array(
                    map.iter()
                        .map(|(k, v)| Value::array(vec![Value::string(k.as_str()), v.clone()]))
                        .collect(),
                ),
                "keys" => Value::array(map.keys().map(|k| Value::string(k.as_str())).collect()),
                _ => Value::array(map.values().cloned().collect()),
            }
        }
        _ => Value::array(Vec::new()),
    }
}

fn eval_super(ctx: &mut Context, env: &Environment, diags: &mut Diagnostics) -> Value {
    let target = match ctx.super_stack.last().cloned() {
        Some(t) => t,
        None => return Value::safe(String::new()),
    };
    let body: std::rc::Rc<Vec<crate::ast::Node>> = match target {
        super::context::SuperTarget::RootBody(body) => body,
        super::context::SuperTarget::Exhausted => return Value::safe(String::new()),
        super::context::SuperTarget::ChainIndex { bodies, index, root_fallback } => {
            let saved_out = std::mem::take(&mut ctx.output);
            super::render_chain_level(&bodies, index, &root_fallback, env, ctx, diags);
            let captured = std::mem::replace(&mut ctx.output, saved_out);
            return Value::safe(captured);
        }
    };
    let saved_out = std::mem::take(&mut ctx.output);
    super::exec_body(&body, env, ctx, diags);
    let captured = std::mem::replace(&mut ctx.output, saved_out);
    Value::safe(captured)
}

