//! Recursive JSON serialization of the AST.
//!
//! Hand-written rather than `#[derive(Serialize)]` because the wire shape
//! tags each node with its kind name (`"type": "If"`) the way the lexer's
//! token JSON tags `"type"` — a derive on the `ExprKind`/`NodeKind` enums
//! would nest fields one level deeper than the documented shape.

use serde_json::{json, Value as Json};

use super::{CallArgs, Expr, ExprKind, Literal, Node, NodeKind, Template};
use crate::diagnostics::Span;

fn span_json(span: Span) -> Json {
    json!({
        "start": {"offset": span.start.offset, "line": span.start.line, "column": span.start.column},
        "end": {"offset": span.end.offset, "line": span.end.line, "column": span.end.column},
    })
}

pub fn to_json(template: &Template) -> Json {
    json!({
        "type": "Template",
        "span": span_json(template.span),
        "body": template.body.iter().map(node_json).collect::<Vec<_>>(),
    })
}

fn call_args_json(args: &CallArgs) -> Json {
    json!({
        "positional": args.positional.iter().map(expr_json).collect::<Vec<_>>(),
        "kwargs": args.kwargs.iter().map(|(k, v)| json!({"name": k, "value": expr_json(v)})).collect::<Vec<_>>(),
    })
}

fn literal_json(lit: &Literal) -> Json {
    match lit {
        Literal::None => Json::Null,
        Literal::Bool(b) => json!(b),
        Literal::Int(i) => json!(i),
        Literal::Float(f) => json!(f),
        Literal::Str(s) => json!(s),
    }
}

pub fn expr_json(expr: &Expr) -> Json {
    let span = span_json(expr.span);
    match &expr.kind {
        ExprKind::Literal(lit) => json!({"type": "Literal", "value": literal_json(lit), "span": span}),
        ExprKind::Name(name) => json!({"type": "Name", "value": name, "span": span}),
        ExprKind::ListLiteral(items) => {
            json!({"type": "ListLiteral", "items": items.iter().map(expr_json).collect::<Vec<_>>(), "span": span})
        }
        ExprKind::DictLiteral(pairs) => json!({
            "type": "DictLiteral",
            "pairs": pairs.iter().map(|(k, v)| json!({"key": expr_json(k), "value": expr_json(v)})).collect::<Vec<_>>(),
            "span": span,
        }),
        ExprKind::TupleLiteral(items) => {
            json!({"type": "TupleLiteral", "items": items.iter().map(expr_json).collect::<Vec<_>>(), "span": span})
        }
        ExprKind::Group(inner) => json!({"type": "Group", "expr": expr_json(inner), "span": span}),
        ExprKind::Unary(op, inner) => {
            json!({"type": "Unary", "op": format!("{op:?}"), "expr": expr_json(inner), "span": span})
        }
        ExprKind::Binary(op, left, right) => json!({
            "type": "Binary", "op": format!("{op:?}"), "left": expr_json(left), "right": expr_json(right), "span": span
        }),
        ExprKind::Ternary { cond, then_expr, else_expr } => json!({
            "type": "Ternary", "cond": expr_json(cond), "then": expr_json(then_expr), "else": expr_json(else_expr), "span": span
        }),
        ExprKind::GetAttr(obj, name) => {
            json!({"type": "GetAttr", "obj": expr_json(obj), "name": name, "span": span})
        }
        ExprKind::GetItem(obj, index) => {
            json!({"type": "GetItem", "obj": expr_json(obj), "index": expr_json(index), "span": span})
        }
        ExprKind::Slice { start, stop, step } => json!({
            "type": "Slice",
            "start": start.as_ref().map(|e| expr_json(e)),
            "stop": stop.as_ref().map(|e| expr_json(e)),
            "step": step.as_ref().map(|e| expr_json(e)),
            "span": span,
        }),
        ExprKind::Call { callee, args } => {
            json!({"type": "Call", "callee": expr_json(callee), "args": call_args_json(args), "span": span})
        }
        ExprKind::Filter { name, expr: inner, args } => json!({
            "type": "Filter", "name": name, "expr": expr_json(inner), "args": call_args_json(args), "span": span
        }),
        ExprKind::Test { expr: inner, name, args, negated } => json!({
            "type": "Test", "name": name, "expr": expr_json(inner), "args": call_args_json(args), "negated": negated, "span": span
        }),
        ExprKind::Concat(parts) => {
            json!({"type": "Concat", "parts": parts.iter().map(expr_json).collect::<Vec<_>>(), "span": span})
        }
    }
}

fn macro_param_json(param: &super::MacroParam) -> Json {
    json!({
        "name": param.name,
        "default": param.default.as_ref().map(expr_json),
        "span": span_json(param.span),
    })
}

pub fn node_json(node: &Node) -> Json {
    let span = span_json(node.span);
    match &node.kind {
        NodeKind::Text(text) => json!({"type": "Text", "text": text, "span": span}),
        NodeKind::Output(expr) => json!({"type": "Output", "expr": expr_json(expr), "span": span}),
        NodeKind::Comment(text) => json!({"type": "Comment", "text": text, "span": span}),
        NodeKind::Raw(text) => json!({"type": "Raw", "text": text, "span": span}),
        NodeKind::If { branches, else_body } => json!({
            "type": "If",
            "branches": branches.iter().map(|(cond, body)| json!({
                "cond": expr_json(cond),
                "body": body.iter().map(node_json).collect::<Vec<_>>(),
            })).collect::<Vec<_>>(),
            "else": else_body.iter().map(node_json).collect::<Vec<_>>(),
            "span": span,
        }),
        NodeKind::For { target, iter, body, else_body, filter, recursive } => json!({
            "type": "For",
            "target": target,
            "iter": expr_json(iter),
            "body": body.iter().map(node_json).collect::<Vec<_>>(),
            "else": else_body.iter().map(node_json).collect::<Vec<_>>(),
            "filter": filter.as_ref().map(|e| expr_json(e)),
            "recursive": recursive,
            "span": span,
        }),
        NodeKind::Set { target, value } => json!({
            "type": "Set", "target": target, "value": expr_json(value), "span": span
        }),
        NodeKind::SetBlock { target, body, filter } => json!({
            "type": "SetBlock",
            "target": target,
            "body": body.iter().map(node_json).collect::<Vec<_>>(),
            "filter": filter.as_ref().map(|e| expr_json(e)),
            "span": span,
        }),
        NodeKind::Macro { name, params, body } => json!({
            "type": "Macro",
            "name": name,
            "params": params.iter().map(macro_param_json).collect::<Vec<_>>(),
            "body": body.iter().map(node_json).collect::<Vec<_>>(),
            "span": span,
        }),
        NodeKind::CallBlock { call, call_params, body } => json!({
            "type": "CallBlock",
            "call": expr_json(call),
            "call_params": call_params.iter().map(macro_param_json).collect::<Vec<_>>(),
            "body": body.iter().map(node_json).collect::<Vec<_>>(),
            "span": span,
        }),
        NodeKind::FilterBlock { filter, body } => json!({
            "type": "FilterBlock",
            "filter": expr_json(filter),
            "body": body.iter().map(node_json).collect::<Vec<_>>(),
            "span": span,
        }),
        NodeKind::With { assignments, body } => json!({
            "type": "With",
            "assignments": assignments.iter().map(|(n, e)| json!({"name": n, "value": expr_json(e)})).collect::<Vec<_>>(),
            "body": body.iter().map(node_json).collect::<Vec<_>>(),
            "span": span,
        }),
        NodeKind::Include { expr, ignore_missing, with_context } => json!({
            "type": "Include", "expr": expr_json(expr), "ignore_missing": ignore_missing, "with_context": with_context, "span": span
        }),
        NodeKind::Import { expr, name, with_context } => json!({
            "type": "Import", "expr": expr_json(expr), "name": name, "with_context": with_context, "span": span
        }),
        NodeKind::FromImport { expr, names, with_context } => json!({
            "type": "FromImport",
            "expr": expr_json(expr),
            "names": names.iter().map(|(n, alias)| json!({"name": n, "alias": alias})).collect::<Vec<_>>(),
            "with_context": with_context,
            "span": span,
        }),
        NodeKind::Extends { expr } => json!({"type": "Extends", "expr": expr_json(expr), "span": span}),
        NodeKind::Block { name, body, scoped, required } => json!({
            "type": "Block",
            "name": name,
            "body": body.iter().map(node_json).collect::<Vec<_>>(),
            "scoped": scoped,
            "required": required,
            "span": span,
        }),
        NodeKind::Do { expr } => json!({"type": "Do", "expr": expr_json(expr), "span": span}),
        NodeKind::AutoEscape { enabled, body } => json!({
            "type": "AutoEscape", "enabled": enabled, "body": body.iter().map(node_json).collect::<Vec<_>>(), "span": span
        }),
    }
}
