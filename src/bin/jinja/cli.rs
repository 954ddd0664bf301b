//! # Cli
//!
//! CLI argument parsing for the `jinja` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Struct containing the CLI configuration for `jinja`.
#[derive(Parser, Debug)]
#[command(author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Specify the log level of the tool's own internal tracing.
    #[arg(value_enum, short, long, global = true, default_value_t = LogLevel::default())]
    pub verbosity: LogLevel,
}

impl Cli {
    pub fn init() -> Self {
        Cli::parse()
    }
}

/// Enum for specifying the log level of `jinja`'s own tracing, independent
/// from the diagnostics channel.
#[derive(ValueEnum, Clone, Default, Debug)]
pub enum LogLevel {
    /// The default log level: only critical tool errors are logged.
    #[default]
    #[value(alias("0"))]
    Error,
    /// Also logs warnings about conditions not already covered by a diagnostic.
    #[value(alias("1"))]
    Warn,
    /// Logs general pipeline progress (mode switches, module loads).
    #[value(alias("2"))]
    Info,
    /// Logs most internal pipeline steps.
    #[value(alias("3"))]
    Debug,
    /// Logs everything, including per-token/per-node tracing.
    #[value(alias("4"))]
    Trace,
}

impl From<&LogLevel> for log::Level {
    fn from(value: &LogLevel) -> Self {
        match value {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Text,
    Html,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Tokenize a template and print its token stream.
    Lex(CommonArgs),
    /// Parse a template and print its AST.
    Parse(CommonArgs),
    /// Render a template against an (empty, for now) context.
    Render(CommonArgs),
    /// Reformat a template with normalized tag-delimiter whitespace.
    Format(CommonArgs),
    /// Lint a template, optionally against a filter/test/function schema.
    Lint(LintArgs),
}

/// Shared options for every verb.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Template source path. Mutually exclusive with `--stdin`.
    #[arg(index = 1)]
    pub path: Option<PathBuf>,

    /// Read source from stdin; mutually exclusive with the positional path.
    #[arg(long)]
    pub stdin: bool,

    /// Output format. Defaults to `json` for lex/parse/lint, `text` for
    /// render/format.
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Pretty-print JSON output.
    #[arg(long)]
    pub pretty: bool,

    /// Disable ANSI colors in text output.
    #[arg(long)]
    pub no_color: bool,

    /// Treat warnings as errors for the purpose of the exit code.
    #[arg(long)]
    pub strict: bool,

    /// Cap reported diagnostics at N.
    #[arg(long)]
    pub max_errors: Option<usize>,

    /// Write per-stage artefacts to this directory.
    #[arg(long)]
    pub snapshots_dir: Option<PathBuf>,
}

/// `lint` takes everything `CommonArgs` does, plus an optional explicit
/// schema path.
#[derive(Args, Debug, Clone)]
pub struct LintArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Explicit path to a lint schema JSON file, overriding the default
    /// `.crinkle/schema.json` lookup.
    #[arg(long)]
    pub schema: Option<PathBuf>,
}
