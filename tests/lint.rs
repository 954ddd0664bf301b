//! Integration coverage for the rule-based linter: default rules, the
//! "lint is a diagnostics superset" invariant, and schema-aware rules.

use jinja::linter::{lint, Schema};
use jinja::{Environment, Severity};

#[test]
fn duplicate_macro_is_flagged() {
    let env = Environment::new();
    let src = "{% macro m() %}a{% endmacro %}{% macro m() %}b{% endmacro %}";
    let issues = lint(src, &env, None);
    assert!(issues.iter().any(|i| i.id == "Linter/DuplicateMacro"));
}

#[test]
fn mixed_indentation_is_flagged() {
    let env = Environment::new();
    let src = "line one\n \tindented\n";
    let issues = lint(src, &env, None);
    assert!(issues.iter().any(|i| i.id == "Linter/MixedIndentation"));
}

#[test]
fn excessive_blank_lines_is_flagged() {
    let env = Environment::new();
    let src = "a\n\n\n\nb";
    let issues = lint(src, &env, None);
    assert!(issues.iter().any(|i| i.id == "Linter/ExcessiveBlankLines"));
}

#[test]
fn lint_is_a_superset_of_raw_diagnostics() {
    let env = Environment::new();
    let src = "{% for x in y %}{{ x }}"; // missing endfor
    let issues = lint(src, &env, None);
    assert!(issues.iter().any(|i| i.id == "Parser/MissingEndTag"));
}

#[test]
fn schema_aware_rules_only_run_when_a_schema_is_given() {
    let env = Environment::new();
    let src = "{{ x | totally_made_up }}";
    let without_schema = lint(src, &env, None);
    assert!(!without_schema.iter().any(|i| i.id == "Linter/UnknownFilter"));

    let schema = Schema::default();
    let with_schema = lint(src, &env, Some(&schema));
    assert!(with_schema.iter().any(|i| i.id == "Linter/UnknownFilter" && i.severity == Severity::Error));
}

#[test]
fn deprecated_schema_entries_emit_a_warning() {
    let env = Environment::new();
    let doc = r#"{"filters":[{"name":"oldify","params":[],"deprecated":true}]}"#;
    let schema: Schema = serde_json::from_str(doc).unwrap();
    let issues = lint("{{ x | oldify }}", &env, Some(&schema));
    assert!(issues.iter().any(|i| i.id == "Linter/DeprecatedUsage" && i.severity == Severity::Warning));
}

#[test]
fn issues_are_sorted_by_span_start() {
    let env = Environment::new();
    let src = "{% extends 'a' %}{% extends 'b' %}{% extends 'c' %}";
    let issues = lint(src, &env, None);
    let offsets: Vec<_> = issues.iter().map(|i| i.span.start.offset).collect();
    let mut sorted = offsets.clone();
    sorted.sort_unstable();
    assert_eq!(offsets, sorted);
}
