//! The `lex` subcommand: tokenize and print the token stream.

use jinja::lexer;
use serde_json::json;

use crate::cli::{CommonArgs, OutputFormat};

use super::{capped, diagnostics_json, diagnostics_text, effective_format, exit_code_for, print_json, resolve_input, write_snapshots, Snapshots, UsageError};

pub fn run(args: &CommonArgs) -> Result<i32, UsageError> {
    let input = resolve_input(args)?;
    let (tokens, diagnostics) = lexer::lex(&input.source);
    let diags = capped(&diagnostics, args.max_errors);

    let tokens_json = serde_json::to_value(&tokens).unwrap_or(serde_json::Value::Null);
    let diags_json = diagnostics_json(diags);

    match effective_format(args, OutputFormat::Json) {
        OutputFormat::Text => {
            for token in &tokens {
                println!("{:?} {:?} {}", token.kind, token.lexeme, token.span);
            }
            print!("{}", diagnostics_text(diags, &input.label, args.no_color));
        }
        OutputFormat::Json | OutputFormat::Html => {
            let doc = json!({ "tokens": tokens_json, "diagnostics": diags_json });
            print_json(&doc, args.pretty);
        }
    }

    if let Some(dir) = &args.snapshots_dir {
        let snaps = Snapshots {
            tokens: Some(&tokens_json),
            diagnostics: Some(&diags_json),
            ..Default::default()
        };
        write_snapshots(dir, &input.label, &snaps)
            .map_err(|e| UsageError(format!("could not write snapshots: {e}")))?;
    }

    Ok(exit_code_for(diags, args.strict))
}
