//! Shared plumbing for every subcommand: input resolution, diagnostic
//! rendering, snapshot writing, and exit-code selection.

pub mod format;
pub mod lex;
pub mod lint;
pub mod parse;
pub mod render;

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use jinja::{Diagnostics, Severity};
use log::debug;
use serde_json::Value as Json;

use crate::cli::{CommonArgs, OutputFormat};

/// A usage-level failure (bad flag combination, unreadable file): distinct
/// from a `Diagnostic`, which is always a successfully-read template's own
/// problem (exit code `2` vs `1`).
#[derive(Debug)]
pub struct UsageError(pub String);

impl std::fmt::Display for UsageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for UsageError {}

/// The resolved input: its source text and the template name/label used for
/// loader resolution, snapshot basenames, and diagnostic headers.
pub struct Input {
    pub source: String,
    pub label: String,
}

pub fn resolve_input(args: &CommonArgs) -> Result<Input, UsageError> {
    match (&args.path, args.stdin) {
        (Some(_), true) => Err(UsageError("--stdin is mutually exclusive with a path argument".into())),
        (None, false) => Err(UsageError("either a path argument or --stdin is required".into())),
        (Some(path), false) => {
            let source = fs::read_to_string(path)
                .map_err(|e| UsageError(format!("could not read {}: {e}", path.display())))?;
            let label = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "template".to_string());
            debug!("resolved input from {}", path.display());
            Ok(Input { source, label })
        }
        (None, true) => {
            let mut source = String::new();
            std::io::stdin()
                .read_to_string(&mut source)
                .map_err(|e| UsageError(format!("could not read stdin: {e}")))?;
            Ok(Input { source, label: "stdin".to_string() })
        }
    }
}

/// The effective output format: the explicit `--format`, or the verb's own
/// default.
pub fn effective_format(args: &CommonArgs, default_for_verb: OutputFormat) -> OutputFormat {
    args.format.unwrap_or(default_for_verb)
}

/// Truncates `diagnostics` to `--max-errors N` when given.
pub fn capped<'a>(diagnostics: &'a Diagnostics, max_errors: Option<usize>) -> &'a [jinja::Diagnostic] {
    match max_errors {
        Some(n) => &diagnostics.0[..diagnostics.0.len().min(n)],
        None => &diagnostics.0,
    }
}

/// `0` success, `1` diagnostics present (errors, or warnings under
/// `--strict`). Usage errors are handled separately by returning
/// `Err(UsageError)` before this is ever consulted, and exit with code `2`
/// in `main`.
pub fn exit_code_for(diagnostics: &[jinja::Diagnostic], strict: bool) -> i32 {
    let has_error = diagnostics.iter().any(|d| d.severity == Severity::Error);
    let has_warning = diagnostics.iter().any(|d| d.severity == Severity::Warning);
    if has_error || (strict && has_warning) {
        1
    } else {
        0
    }
}

pub fn diagnostics_text(diagnostics: &[jinja::Diagnostic], label: &str, no_color: bool) -> String {
    let mut out = String::new();
    for d in diagnostics {
        let line = format!("{label}:{}: {} {}", d.span.start, d.id, d.message);
        if no_color {
            out.push_str(&line);
        } else {
            out.push_str(&colorize(d.severity, &line));
        }
        out.push('\n');
    }
    out
}

pub fn issues_text(issues: &[jinja::linter::Issue], label: &str, no_color: bool) -> String {
    let mut out = String::new();
    for issue in issues {
        let line = format!("{label}:{}: {} {}", issue.span.start, issue.id, issue.message);
        if no_color {
            out.push_str(&line);
        } else {
            out.push_str(&colorize(issue.severity, &line));
        }
        out.push('\n');
    }
    out
}

fn colorize(severity: Severity, text: &str) -> String {
    let code = match severity {
        Severity::Error => "31",
        Severity::Warning => "33",
        Severity::Info => "36",
    };
    format!("\x1b[{code}m{text}\x1b[0m")
}

pub fn diagnostics_json(diagnostics: &[jinja::Diagnostic]) -> Json {
    Json::Array(diagnostics.iter().map(|d| serde_json::to_value(d).unwrap_or(Json::Null)).collect())
}

pub fn print_json(value: &Json, pretty: bool) {
    let text = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .unwrap_or_else(|_| "{}".to_string());
    println!("{text}");
}

/// Snapshot artefacts a subcommand may produce; each present field is
/// written to `DIR/<label>.<suffix>`.
#[derive(Default)]
pub struct Snapshots<'a> {
    pub tokens: Option<&'a Json>,
    pub ast: Option<&'a Json>,
    pub diagnostics: Option<&'a Json>,
    pub lint: Option<&'a Json>,
    /// `(extension, content)` for the stage-specific output artefact, e.g.
    /// `("html", rendered)` or `("j2", formatted)`.
    pub output: Option<(&'static str, &'a str)>,
}

pub fn write_snapshots(dir: &Path, label: &str, snapshots: &Snapshots) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    if let Some(tokens) = snapshots.tokens {
        write_json(dir, label, "tokens", tokens)?;
    }
    if let Some(ast) = snapshots.ast {
        write_json(dir, label, "ast", ast)?;
    }
    if let Some(diags) = snapshots.diagnostics {
        write_json(dir, label, "diagnostics", diags)?;
    }
    if let Some(lint) = snapshots.lint {
        write_json(dir, label, "lint", lint)?;
    }
    if let Some((ext, content)) = snapshots.output {
        fs::write(snapshot_path(dir, label, ext), content)?;
    }
    Ok(())
}

fn write_json(dir: &Path, label: &str, suffix: &str, value: &Json) -> std::io::Result<()> {
    let path = snapshot_path(dir, label, &format!("{suffix}.json"));
    fs::write(path, serde_json::to_string_pretty(value).unwrap_or_default())
}

fn snapshot_path(dir: &Path, label: &str, suffix: &str) -> PathBuf {
    dir.join(format!("{label}.{suffix}"))
}
