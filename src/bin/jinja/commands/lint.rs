//! The `lint` subcommand: run the rule-based linter, optionally against a
//! filter/test/function schema.

use serde_json::json;

use jinja::linter::{self, Schema};
use jinja::Environment;

use crate::cli::{LintArgs, OutputFormat};

use super::{effective_format, issues_text, print_json, resolve_input, write_snapshots, Snapshots, UsageError};

pub fn run(args: &LintArgs) -> Result<i32, UsageError> {
    let input = resolve_input(&args.common)?;
    let env = Environment::new();

    let schema = match &args.schema {
        Some(path) => Some(Schema::load(path).map_err(|e| UsageError(e.to_string()))?),
        None => Schema::load_default(),
    };

    let mut issues = linter::lint(&input.source, &env, schema.as_ref());
    if let Some(n) = args.common.max_errors {
        issues.truncate(n);
    }

    let issues_json = serde_json::to_value(&issues).unwrap_or(serde_json::Value::Null);

    match effective_format(&args.common, OutputFormat::Json) {
        OutputFormat::Text => {
            print!("{}", issues_text(&issues, &input.label, args.common.no_color));
        }
        OutputFormat::Json | OutputFormat::Html => {
            let doc = json!({ "issues": issues_json });
            print_json(&doc, args.common.pretty);
        }
    }

    if let Some(dir) = &args.common.snapshots_dir {
        let snaps = Snapshots {
            lint: Some(&issues_json),
            ..Default::default()
        };
        write_snapshots(dir, &input.label, &snaps)
            .map_err(|e| UsageError(format!("could not write snapshots: {e}")))?;
    }

    let has_error = issues.iter().any(|i| i.severity == jinja::Severity::Error);
    let has_warning = issues.iter().any(|i| i.severity == jinja::Severity::Warning);
    Ok(if has_error || (args.common.strict && has_warning) { 1 } else { 0 })
}
