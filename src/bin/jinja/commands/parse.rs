//! The `parse` subcommand: lex, parse, and print the AST.

use jinja::{ast, lexer, parser};
use serde_json::json;

use crate::cli::{CommonArgs, OutputFormat};

use super::{capped, diagnostics_json, diagnostics_text, effective_format, exit_code_for, print_json, resolve_input, write_snapshots, Snapshots, UsageError};

pub fn run(args: &CommonArgs) -> Result<i32, UsageError> {
    let input = resolve_input(args)?;
    let (tokens, lex_diags) = lexer::lex(&input.source);
    let tokens_json = serde_json::to_value(&tokens).unwrap_or(serde_json::Value::Null);
    let (template, parse_diags) = parser::parse(tokens);

    let mut diagnostics = lex_diags;
    diagnostics.extend(parse_diags);
    let diags = capped(&diagnostics, args.max_errors);

    let ast_json = ast::to_json(&template);
    let diags_json = diagnostics_json(diags);

    match effective_format(args, OutputFormat::Json) {
        OutputFormat::Text => {
            println!("{}", serde_json::to_string_pretty(&ast_json).unwrap_or_default());
            print!("{}", diagnostics_text(diags, &input.label, args.no_color));
        }
        OutputFormat::Json | OutputFormat::Html => {
            let doc = json!({ "ast": ast_json, "diagnostics": diags_json });
            print_json(&doc, args.pretty);
        }
    }

    if let Some(dir) = &args.snapshots_dir {
        let snaps = Snapshots {
            tokens: Some(&tokens_json),
            ast: Some(&ast_json),
            diagnostics: Some(&diags_json),
            ..Default::default()
        };
        write_snapshots(dir, &input.label, &snaps)
            .map_err(|e| UsageError(format!("could not write snapshots: {e}")))?;
    }

    Ok(exit_code_for(diags, args.strict))
}
