//! The rule-based linter: parse, then run a fixed battery of checks over the
//! AST plus an optional schema-driven rule set, returning a flat list of
//! problems.

pub mod rules;
pub mod schema;

use serde::Serialize;

use crate::diagnostics::{Diagnostics, Severity, Span};
use crate::environment::Environment;

pub use schema::Schema;

/// A lint finding: either an upstream diagnostic carried through unchanged,
/// or something a rule in `rules.rs` found directly.
#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    pub id: String,
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    pub source: IssueSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSource {
    /// Carried through from a lexer/parser/renderer `Diagnostic`.
    Diagnostic,
    /// Produced directly by a lint rule.
    Lint,
}

impl Issue {
    pub fn lint(id: String, severity: Severity, message: String, span: Span) -> Self {
        Issue { id, severity, message, span, source: IssueSource::Lint }
    }

    fn from_diagnostic(d: crate::diagnostics::Diagnostic) -> Self {
        Issue {
            id: d.id,
            severity: d.severity,
            message: d.message,
            span: d.span,
            source: IssueSource::Diagnostic,
        }
    }
}

/// Lexes and parses `source`, then runs the default rule set (and the
/// schema-aware rules when `schema` is given) over the resulting AST. Every
/// diagnostic the lexer or parser would have produced on its own appears
/// here too, mapped to its stable dotted id.
pub fn lint(source: &str, env: &Environment, schema: Option<&Schema>) -> Vec<Issue> {
    let (tokens, lex_diags) = crate::lexer::lex(source);
    let (template, parse_diags) = crate::parser::parse(tokens);

    let mut issues: Vec<Issue> = Vec::new();
    issues.extend(diagnostics_to_issues(lex_diags));
    issues.extend(diagnostics_to_issues(parse_diags));
    issues.extend(rules::run_default_rules(&template.body, source));
    if let Some(schema) = schema {
        issues.extend(rules::run_schema_rules(&template.body, source, env, schema));
    }
    issues.sort_by_key(|i| i.span.start.offset);
    issues
}

fn diagnostics_to_issues(diags: Diagnostics) -> Vec<Issue> {
    diags.into_iter().map(Issue::from_diagnostic).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lint_includes_parser_diagnostics() {
        let env = Environment::new();
        let issues = lint("{% if x %}unclosed", &env, None);
        assert!(issues.iter().any(|i| i.id.starts_with("Parser/")));
    }

    #[test]
    fn lint_reports_undefined_variable_free_of_render() {
        let env = Environment::new();
        let issues = lint("{{ y }}", &env, None);
        assert!(!issues.iter().any(|i| i.id == "Renderer/UnknownVariable"));
    }

    #[test]
    fn clean_template_has_no_default_rule_issues() {
        let env = Environment::new();
        let issues = lint("hello {{ name }}\n", &env, None);
        assert!(issues.iter().all(|i| i.source != super::IssueSource::Lint));
    }
}
