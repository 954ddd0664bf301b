//! End-to-end interpolation and basic-output scenarios.

use std::collections::HashMap;

use jinja::{render::render, Environment, Value};

fn render_with(source: &str, globals: HashMap<String, Value>) -> (String, jinja::Diagnostics) {
    let env = Environment::new();
    render(source, "<test>", &env, globals)
}

#[test]
fn basic_interpolation() {
    let mut globals = HashMap::new();
    globals.insert("name".to_string(), Value::string("World"));
    let (out, diags) = render_with("Hello, {{ name }}!", globals);
    assert_eq!(out, "Hello, World!");
    assert!(!diags.has_errors());
}

#[test]
fn undefined_variable_renders_empty_with_one_diagnostic() {
    let (out, diags) = render_with("{{ x }}", HashMap::new());
    assert_eq!(out, "");
    let matches: Vec<_> = diags.iter().filter(|d| d.id == "Renderer/UnknownVariable").collect();
    assert_eq!(matches.len(), 1);
}

#[test]
fn range_and_loop_var() {
    let (out, _) = render_with("{% for i in range(3) %}{{ i }}{% endfor %}", HashMap::new());
    assert_eq!(out, "012");
}

#[test]
fn filters_chain_left_to_right() {
    let mut globals = HashMap::new();
    globals.insert("name".to_string(), Value::string("  world  "));
    let (out, _) = render_with("{{ name | trim | upper }}", globals);
    assert_eq!(out, "WORLD");
}

#[test]
fn literal_round_trip() {
    for (expr, expected) in [
        ("{{ 1 }}", "1"),
        ("{{ 1.5 }}", "1.5"),
        ("{{ true }}", "true"),
        ("{{ 'hi' }}", "hi"),
        ("{{ none }}", ""),
    ] {
        let (out, _) = render_with(expr, HashMap::new());
        assert_eq!(out, expected, "rendering {expr}");
    }
}
