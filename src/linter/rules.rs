//! Default and schema-aware lint rules: a single AST walk accumulates a flat
//! list of problems rather than one visitor per rule; each rule here is a
//! plain function run over the walk's collected facts instead of a trait
//! object, since the rule set is closed and small.

use std::collections::HashMap;

use crate::ast::{Expr, ExprKind, Node, NodeKind};
use crate::diagnostics::{Position, Severity, Span};
use crate::environment::Environment;
use crate::typing::{Typer, TypeRef};

use super::schema::Schema;
use super::Issue;

/// Facts gathered by one walk of the template body, consumed by every rule
/// below. Walking once and fanning out to rules avoids re-traversing the
/// tree per rule.
struct Walk<'a> {
    source: &'a str,
    extends: Vec<Span>,
    leading_non_text_is_extends: bool,
    blocks: Vec<(String, Span)>,
    macros: Vec<(String, Span)>,
    calls: Vec<&'a Expr>,
}

fn walk(body: &[Node], source: &str) -> Walk<'_> {
    let mut w = Walk {
        source,
        extends: Vec::new(),
        leading_non_text_is_extends: true,
        blocks: Vec::new(),
        macros: Vec::new(),
        calls: Vec::new(),
    };
    let mut seen_non_text = false;
    for node in body {
        if !matches!(node.kind, NodeKind::Text(_) | NodeKind::Comment(_)) {
            if !seen_non_text {
                w.leading_non_text_is_extends = matches!(node.kind, NodeKind::Extends { .. });
                seen_non_text = true;
            }
        }
        walk_node(node, &mut w);
    }
    w
}

fn walk_node<'a>(node: &'a Node, w: &mut Walk<'a>) {
    match &node.kind {
        NodeKind::Extends { .. } => w.extends.push(node.span),
        NodeKind::Block { name, body, .. } => {
            w.blocks.push((name.clone(), node.span));
            walk_body(body, w);
        }
        NodeKind::Macro { name, body, .. } => {
            w.macros.push((name.clone(), node.span));
            walk_body(body, w);
        }
        NodeKind::If { branches, else_body } => {
            for (cond, body) in branches {
                walk_expr(cond, w);
                walk_body(body, w);
            }
            walk_body(else_body, w);
        }
        NodeKind::For { iter, body, else_body, filter, .. } => {
            walk_expr(iter, w);
            if let Some(f) = filter {
                walk_expr(f, w);
            }
            walk_body(body, w);
            walk_body(else_body, w);
        }
        NodeKind::Set { value, .. } => walk_expr(value, w),
        NodeKind::SetBlock { body, filter, .. } => {
            if let Some(f) = filter {
                walk_expr(f, w);
            }
            walk_body(body, w);
        }
        NodeKind::CallBlock { call, body, .. } => {
            walk_expr(call, w);
            walk_body(body, w);
        }
        NodeKind::FilterBlock { filter, body } => {
            walk_expr(filter, w);
            walk_body(body, w);
        }
        NodeKind::With { assignments, body } => {
            for (_, e) in assignments {
                walk_expr(e, w);
            }
            walk_body(body, w);
        }
        NodeKind::Include { expr, .. } | NodeKind::Import { expr, .. } | NodeKind::Do { expr } => {
            walk_expr(expr, w);
        }
        NodeKind::FromImport { expr, .. } => walk_expr(expr, w),
        NodeKind::Output(expr) => walk_expr(expr, w),
        NodeKind::AutoEscape { body, .. } => walk_body(body, w),
        NodeKind::Text(_) | NodeKind::Comment(_) | NodeKind::Raw(_) => {}
    }
}

fn walk_body<'a>(body: &'a [Node], w: &mut Walk<'a>) {
    for node in body {
        walk_node(node, w);
    }
}

fn walk_expr<'a>(expr: &'a Expr, w: &mut Walk<'a>) {
    match &expr.kind {
        ExprKind::Filter { expr: inner, args, .. } | ExprKind::Test { expr: inner, args, .. } => {
            w.calls.push(expr);
            walk_expr(inner, w);
            for a in &args.positional {
                walk_expr(a, w);
            }
            for (_, a) in &args.kwargs {
                walk_expr(a, w);
            }
        }
        ExprKind::Call { callee, args } => {
            w.calls.push(expr);
            walk_expr(callee, w);
            for a in &args.positional {
                walk_expr(a, w);
            }
            for (_, a) in &args.kwargs {
                walk_expr(a, w);
            }
        }
        ExprKind::Binary(_, l, r) => {
            walk_expr(l, w);
            walk_expr(r, w);
        }
        ExprKind::Unary(_, inner) | ExprKind::Group(inner) => walk_expr(inner, w),
        ExprKind::Ternary { cond, then_expr, else_expr } => {
            walk_expr(cond, w);
            walk_expr(then_expr, w);
            walk_expr(else_expr, w);
        }
        ExprKind::GetAttr(inner, _) => walk_expr(inner, w),
        ExprKind::GetItem(inner, key) => {
            walk_expr(inner, w);
            walk_expr(key, w);
        }
        ExprKind::Slice { start, stop, step } => {
            for e in [start, stop, step].into_iter().flatten() {
                walk_expr(e, w);
            }
        }
        ExprKind::ListLiteral(items) | ExprKind::TupleLiteral(items) | ExprKind::Concat(items) => {
            for i in items {
                walk_expr(i, w);
            }
        }
        ExprKind::DictLiteral(pairs) => {
            for (k, v) in pairs {
                walk_expr(k, w);
                walk_expr(v, w);
            }
        }
        ExprKind::Literal(_) | ExprKind::Name(_) => {}
    }
}

fn issue(id: &str, severity: Severity, message: impl Into<String>, span: Span) -> Issue {
    Issue::lint(id.to_string(), severity, message.into(), span)
}

pub fn multiple_extends(w: &Walk) -> Vec<Issue> {
    if w.extends.len() > 1 {
        w.extends[1..]
            .iter()
            .map(|span| {
                issue(
                    "Linter/MultipleExtends",
                    Severity::Error,
                    "a template may only have one `extends` tag",
                    *span,
                )
            })
            .collect()
    } else {
        Vec::new()
    }
}

pub fn extends_not_first(w: &Walk) -> Vec<Issue> {
    if let Some(span) = w.extends.first() {
        if !w.leading_non_text_is_extends {
            return vec![issue(
                "Linter/ExtendsNotFirst",
                Severity::Warning,
                "`extends` should be the first tag in the template",
                *span,
            )];
        }
    }
    Vec::new()
}

pub fn duplicate_block(w: &Walk) -> Vec<Issue> {
    duplicates(&w.blocks, "Linter/DuplicateBlock", "block")
}

pub fn duplicate_macro(w: &Walk) -> Vec<Issue> {
    duplicates(&w.macros, "Linter/DuplicateMacro", "macro")
}

fn duplicates(items: &[(String, Span)], id: &str, kind: &str) -> Vec<Issue> {
    let mut seen: HashMap<&str, Span> = HashMap::new();
    let mut issues = Vec::new();
    for (name, span) in items {
        if let Some(_first) = seen.get(name.as_str()) {
            issues.push(issue(
                id,
                Severity::Warning,
                format!("{kind} `{name}` is defined more than once"),
                *span,
            ));
        } else {
            seen.insert(name.as_str(), *span);
        }
    }
    issues
}

fn line_span(line_no: u32, len: u32) -> Span {
    let start = Position { offset: 0, line: line_no, column: 1 };
    let end = Position { offset: 0, line: line_no, column: len.max(1) + 1 };
    Span::new(start, end)
}

pub fn trailing_whitespace(source: &str) -> Vec<Issue> {
    source
        .lines()
        .enumerate()
        .filter(|(_, line)| line.ends_with(' ') || line.ends_with('\t'))
        .map(|(i, line)| {
            issue(
                "Linter/TrailingWhitespace",
                Severity::Warning,
                "trailing whitespace at end of line",
                line_span((i + 1) as u32, line.len() as u32),
            )
        })
        .collect()
}

pub fn mixed_indentation(source: &str) -> Vec<Issue> {
    source
        .lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let indent: String = line.chars().take_while(|c| *c == ' ' || *c == '\t').collect();
            if indent.contains(' ') && indent.contains('\t') {
                Some(issue(
                    "Linter/MixedIndentation",
                    Severity::Warning,
                    "line mixes tabs and spaces in its indentation",
                    line_span((i + 1) as u32, line.len() as u32),
                ))
            } else {
                None
            }
        })
        .collect()
}

pub fn excessive_blank_lines(source: &str) -> Vec<Issue> {
    const MAX_CONSECUTIVE: usize = 2;
    let mut issues = Vec::new();
    let mut run = 0usize;
    for (i, line) in source.lines().enumerate() {
        if line.trim().is_empty() {
            run += 1;
            if run == MAX_CONSECUTIVE + 1 {
                issues.push(issue(
                    "Linter/ExcessiveBlankLines",
                    Severity::Info,
                    format!("more than {MAX_CONSECUTIVE} consecutive blank lines"),
                    line_span((i + 1) as u32, 0),
                ));
            }
        } else {
            run = 0;
        }
    }
    issues
}

/// `Formatting`: flags when the source differs from its own formatted
/// rendering, without forcing a reformat.
pub fn formatting(source: &str) -> Vec<Issue> {
    let formatted = crate::formatter::format_source(source);
    if formatted != source {
        vec![issue(
            "Linter/Formatting",
            Severity::Info,
            "source differs from its normalized formatting",
            Span::point(Position::start()),
        )]
    } else {
        Vec::new()
    }
}

fn callable_name(expr: &Expr) -> Option<(&'static str, &str, &crate::ast::CallArgs, Span)> {
    match &expr.kind {
        ExprKind::Filter { name, args, .. } => Some(("filter", name, args, expr.span)),
        ExprKind::Test { name, args, .. } => Some(("test", name, args, expr.span)),
        ExprKind::Call { callee, args } => match &callee.kind {
            ExprKind::Name(name) => Some(("function", name, args, expr.span)),
            _ => None,
        },
        _ => None,
    }
}

fn schema_entry<'a>(schema: &'a Schema, kind: &str, name: &str) -> Option<&'a crate::linter::schema::SchemaEntry> {
    match kind {
        "filter" => schema.filter(name),
        "test" => schema.test(name),
        _ => schema.function(name),
    }
}

fn known_builtin(env: &Environment, kind: &str, name: &str) -> bool {
    match kind {
        "filter" => env.has_filter(name),
        "test" => env.has_test(name),
        _ => env.has_function(name),
    }
}

/// The schema-aware rules: `UnknownFilter`/`UnknownTest`/`UnknownFunction`,
/// `WrongArgumentCount`, `UnknownKwarg`, `MissingRequiredArgument`,
/// `WrongArgumentType`, `DeprecatedUsage`. Only run when a `Schema` is
/// supplied.
pub fn schema_rules(w: &Walk, env: &Environment, schema: &Schema, typer: &Typer) -> Vec<Issue> {
    let mut issues = Vec::new();
    for call in &w.calls {
        let Some((kind, name, args, span)) = callable_name(call) else { continue };
        if known_builtin(env, kind, name) {
            continue;
        }
        let Some(entry) = schema_entry(schema, kind, name) else {
            let id = match kind {
                "filter" => "Linter/UnknownFilter",
                "test" => "Linter/UnknownTest",
                _ => "Linter/UnknownFunction",
            };
            issues.push(issue(id, Severity::Error, format!("unknown {kind} `{name}`"), span));
            continue;
        };

        if entry.is_deprecated() {
            issues.push(issue(
                "Linter/DeprecatedUsage",
                Severity::Warning,
                format!("{kind} `{name}` is deprecated"),
                span,
            ));
        }

        let known_params: Vec<&str> = entry.params.iter().map(|p| p.name.as_str()).collect();
        for (kw, _) in &args.kwargs {
            if !known_params.contains(&kw.as_str()) {
                issues.push(issue(
                    "Linter/UnknownKwarg",
                    Severity::Error,
                    format!("{kind} `{name}` has no parameter named `{kw}`"),
                    span,
                ));
            }
        }

        let provided = args.positional.len() + args.kwargs.len();
        if !entry.params.is_empty() && provided > entry.params.len() {
            issues.push(issue(
                "Linter/WrongArgumentCount",
                Severity::Error,
                format!(
                    "{kind} `{name}` accepts at most {} argument(s), got {provided}",
                    entry.params.len()
                ),
                span,
            ));
        }

        for (i, param) in entry.required_params().enumerate() {
            let supplied_positionally = args.positional.len() > i;
            let supplied_by_kwarg = args.kwargs.iter().any(|(k, _)| k == &param.name);
            if !supplied_positionally && !supplied_by_kwarg {
                issues.push(issue(
                    "Linter/MissingRequiredArgument",
                    Severity::Error,
                    format!("{kind} `{name}` is missing required argument `{}`", param.name),
                    span,
                ));
            }
        }

        for (i, value) in args.positional.iter().enumerate() {
            let Some(param) = entry.params.get(i) else { continue };
            check_argument_type(&mut issues, typer, kind, name, &param.name, &param.ty, value);
        }
        for (kw, value) in &args.kwargs {
            let Some(param) = entry.params.iter().find(|p| &p.name == kw) else { continue };
            check_argument_type(&mut issues, typer, kind, name, &param.name, &param.ty, value);
        }
    }
    issues
}

/// `WrongArgumentType`: compares the schema's declared parameter type
/// against the best-effort type `typer` traces for the supplied expression,
/// per spec.md §4.5's `TypeRef::compatible_with` relation.
fn check_argument_type(
    issues: &mut Vec<Issue>,
    typer: &Typer,
    kind: &str,
    name: &str,
    param_name: &str,
    declared: &str,
    value: &Expr,
) {
    let expected = TypeRef::named(declared);
    let actual = typer.infer_expr(value);
    if !expected.compatible_with(&actual) {
        issues.push(issue(
            "Linter/WrongArgumentType",
            Severity::Warning,
            format!(
                "{kind} `{name}` expects `{}` to be `{declared}`, found `{}`",
                param_name, actual.name
            ),
            value.span,
        ));
    }
}

pub fn run_default_rules(body: &[Node], source: &str) -> Vec<Issue> {
    let w = walk(body, source);
    let mut issues = Vec::new();
    issues.extend(multiple_extends(&w));
    issues.extend(extends_not_first(&w));
    issues.extend(duplicate_block(&w));
    issues.extend(duplicate_macro(&w));
    issues.extend(trailing_whitespace(w.source));
    issues.extend(mixed_indentation(w.source));
    issues.extend(excessive_blank_lines(w.source));
    issues.extend(formatting(w.source));
    issues
}

pub fn run_schema_rules(body: &[Node], source: &str, env: &Environment, schema: &Schema) -> Vec<Issue> {
    let w = walk(body, source);
    let typer = typer_for(body);
    schema_rules(&w, env, schema, &typer)
}

/// Traces `body` once up front so `schema_rules`' `WrongArgumentType` check
/// has a `Name` -> declared-type table to consult, rather than importing
/// `Typer` ad hoc from `super::mod`.
pub fn typer_for(body: &[Node]) -> Typer {
    let mut typer = Typer::new();
    typer.trace_body(body);
    typer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer, parser};

    fn parse(src: &str) -> Vec<Node> {
        let (tokens, _) = lexer::lex(src);
        let (template, _) = parser::parse(tokens);
        template.body
    }

    #[test]
    fn flags_multiple_extends() {
        let src = "{% extends 'a.html' %}{% extends 'b.html' %}";
        let body = parse(src);
        let issues = run_default_rules(&body, src);
        assert!(issues.iter().any(|i| i.id == "Linter/MultipleExtends"));
    }

    #[test]
    fn flags_extends_not_first() {
        let src = "hi{% extends 'a.html' %}";
        let body = parse(src);
        let issues = run_default_rules(&body, src);
        assert!(issues.iter().any(|i| i.id == "Linter/ExtendsNotFirst"));
    }

    #[test]
    fn flags_duplicate_block() {
        let src = "{% block a %}1{% endblock %}{% block a %}2{% endblock %}";
        let body = parse(src);
        let issues = run_default_rules(&body, src);
        assert!(issues.iter().any(|i| i.id == "Linter/DuplicateBlock"));
    }

    #[test]
    fn flags_trailing_whitespace() {
        let src = "hello   \nworld";
        let body = parse(src);
        let issues = run_default_rules(&body, src);
        assert!(issues.iter().any(|i| i.id == "Linter/TrailingWhitespace"));
    }

    #[test]
    fn schema_flags_unknown_filter() {
        let src = "{{ x | made_up_filter }}";
        let body = parse(src);
        let env = Environment::new();
        let schema = Schema::default();
        let issues = run_schema_rules(&body, src, &env, &schema);
        assert!(issues.iter().any(|i| i.id == "Linter/UnknownFilter"));
    }

    #[test]
    fn schema_flags_missing_required_argument() {
        let src = "{{ x | needs_arg }}";
        let body = parse(src);
        let env = Environment::new();
        let doc = r#"{"filters":[{"name":"needs_arg","params":[{"name":"n","type":"Int64","required":true}]}]}"#;
        let schema: Schema = serde_json::from_str(doc).unwrap();
        let issues = run_schema_rules(&body, src, &env, &schema);
        assert!(issues.iter().any(|i| i.id == "Linter/MissingRequiredArgument"));
    }

    #[test]
    fn schema_flags_wrong_argument_type() {
        let src = r#"{{ x | needs_number("five") }}"#;
        let body = parse(src);
        let env = Environment::new();
        let doc = r#"{"filters":[{"name":"needs_number","params":[{"name":"n","type":"Number","required":true}]}]}"#;
        let schema: Schema = serde_json::from_str(doc).unwrap();
        let issues = run_schema_rules(&body, src, &env, &schema);
        assert!(issues.iter().any(|i| i.id == "Linter/WrongArgumentType"));
    }
}
