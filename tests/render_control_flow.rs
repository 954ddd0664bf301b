//! Control-flow-heavy renderer scenarios: `if`/`else`, `for` (incl. `loop`
//! and `recursive`), `with`, `set`/`set_block`, and macros/`call` blocks.

use std::collections::HashMap;

use jinja::{render::render, Environment, Value};

fn render_with(source: &str, globals: HashMap<String, Value>) -> (String, jinja::Diagnostics) {
    let env = Environment::new();
    render(source, "<test>", &env, globals)
}

fn render_bare(source: &str) -> String {
    render_with(source, HashMap::new()).0
}

#[test]
fn if_else_picks_first_truthy_branch() {
    let src = "{% if false %}a{% elif true %}b{% else %}c{% endif %}";
    assert_eq!(render_bare(src), "b");
}

#[test]
fn if_without_matching_branch_falls_to_else() {
    let src = "{% if false %}a{% else %}c{% endif %}";
    assert_eq!(render_bare(src), "c");
}

#[test]
fn for_else_runs_when_iterable_is_empty() {
    let src = "{% for x in [] %}{{ x }}{% else %}empty{% endfor %}";
    assert_eq!(render_bare(src), "empty");
}

#[test]
fn loop_index_and_last_are_one_based_and_tracked() {
    let src = "{% for x in ['a', 'b', 'c'] %}{{ loop.index }}:{{ x }}{% if not loop.last %},{% endif %}{% endfor %}";
    assert_eq!(render_bare(src), "1:a,2:b,3:c");
}

#[test]
fn recursive_for_walks_nested_children() {
    let mut globals = HashMap::new();
    globals.insert(
        "tree".to_string(),
        Value::array(vec![Value::string_dict(
            [
                ("name".to_string(), Value::string("root")),
                (
                    "children".to_string(),
                    Value::array(vec![Value::string_dict(
                        [
                            ("name".to_string(), Value::string("child")),
                            ("children".to_string(), Value::array(vec![])),
                        ]
                        .into_iter()
                        .collect(),
                    )]),
                ),
            ]
            .into_iter()
            .collect(),
        )]),
    );
    let src = "{% for n in tree recursive %}{{ n.name }}{% if n.children %}({{ loop(n.children) }}){% endif %}{% endfor %}";
    let (out, _) = render_with(src, globals);
    assert_eq!(out, "root(child)");
}

#[test]
fn with_scopes_bindings_to_its_body() {
    let src = "{% with x = 1 %}{{ x }}{% endwith %}{{ x }}";
    assert_eq!(render_bare(src), "1");
}

#[test]
fn set_assigns_into_enclosing_scope() {
    let src = "{% set x = 1 + 2 %}{{ x }}";
    assert_eq!(render_bare(src), "3");
}

#[test]
fn set_block_captures_body_and_applies_filter() {
    let src = "{% set x %}  hello  {% endset %}{{ x | trim | upper }}";
    assert_eq!(render_bare(src), "HELLO");
}

#[test]
fn macro_call_binds_params_with_defaults() {
    let src = "{% macro greet(name, greeting='Hi') %}{{ greeting }}, {{ name }}!{% endmacro %}{{ greet('Ann') }}";
    assert_eq!(render_bare(src), "Hi, Ann!");
}

#[test]
fn call_block_exposes_caller_to_the_macro() {
    let src = "{% macro wrap() %}<{{ caller() }}>{% endmacro %}{% call wrap() %}inner{% endcall %}";
    assert_eq!(render_bare(src), "<inner>");
}
