//! The `format` subcommand: normalize tag-delimiter whitespace. Infallible
//! at the API boundary: malformed input still yields best-effort output.

use serde_json::json;

use jinja::formatter::{Formatter, WhitespaceFormatter};

use crate::cli::{CommonArgs, OutputFormat};

use super::{capped, diagnostics_json, diagnostics_text, effective_format, exit_code_for, print_json, resolve_input, write_snapshots, Snapshots, UsageError};

pub fn run(args: &CommonArgs) -> Result<i32, UsageError> {
    let input = resolve_input(args)?;
    let outcome = WhitespaceFormatter.format(&input.source);
    let diags = capped(&outcome.diagnostics, args.max_errors);
    let diags_json = diagnostics_json(diags);

    match effective_format(args, OutputFormat::Text) {
        OutputFormat::Text | OutputFormat::Html => {
            print!("{}", outcome.output);
            if !outcome.output.ends_with('\n') {
                println!();
            }
            print!("{}", diagnostics_text(diags, &input.label, args.no_color));
        }
        OutputFormat::Json => {
            let doc = json!({ "output": outcome.output, "diagnostics": diags_json });
            print_json(&doc, args.pretty);
        }
    }

    if let Some(dir) = &args.snapshots_dir {
        let snaps = Snapshots {
            diagnostics: Some(&diags_json),
            output: Some(("j2", &outcome.output)),
            ..Default::default()
        };
        write_snapshots(dir, &input.label, &snaps)
            .map_err(|e| UsageError(format!("could not write snapshots: {e}")))?;
    }

    Ok(exit_code_for(diags, args.strict))
}
