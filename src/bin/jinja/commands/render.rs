//! The `render` subcommand: run the full pipeline and print rendered output.
//! There is no `--context` flag, so rendering always runs against an empty
//! global scope plus whatever a loaded template's own `{% set %}`s
//! establish; recorded as a scoped limitation in DESIGN.md.

use std::collections::HashMap;
use std::path::PathBuf;

use jinja::environment::{FsLoader, MemoryLoader};
use jinja::Environment;
use serde_json::json;

use crate::cli::{CommonArgs, OutputFormat};

use super::{capped, diagnostics_json, diagnostics_text, effective_format, exit_code_for, print_json, resolve_input, write_snapshots, Snapshots, UsageError};

pub fn run(args: &CommonArgs) -> Result<i32, UsageError> {
    let input = resolve_input(args)?;

    let env = match &args.path {
        Some(path) => {
            let root: PathBuf = path.parent().map(|p| p.to_path_buf()).unwrap_or_default();
            Environment::new().with_loader(FsLoader::new(root))
        }
        None => Environment::new().with_loader(MemoryLoader::new()),
    };

    let (output, diagnostics) = jinja::render::render(&input.source, &input.label, &env, HashMap::new());
    let diags = capped(&diagnostics, args.max_errors);
    let diags_json = diagnostics_json(diags);

    match effective_format(args, OutputFormat::Text) {
        OutputFormat::Text | OutputFormat::Html => {
            print!("{output}");
            if !output.ends_with('\n') {
                println!();
            }
            print!("{}", diagnostics_text(diags, &input.label, args.no_color));
        }
        OutputFormat::Json => {
            let doc = json!({ "output": output, "diagnostics": diags_json });
            print_json(&doc, args.pretty);
        }
    }

    if let Some(dir) = &args.snapshots_dir {
        let snaps = Snapshots {
            diagnostics: Some(&diags_json),
            output: Some(("html", &output)),
            ..Default::default()
        };
        write_snapshots(dir, &input.label, &snaps)
            .map_err(|e| UsageError(format!("could not write snapshots: {e}")))?;
    }

    Ok(exit_code_for(diags, args.strict))
}
