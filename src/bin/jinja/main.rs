//! # jinja
//!
//! This binary is the CLI front-end for the `jinja` template engine: it
//! wires the `lex`/`parse`/`render`/`format`/`lint` verbs onto the library
//! crate's pipeline stages. `main` returns `Result<(), Box<dyn Error>>`
//! reserved for true usage/I/O failures, with the process exit code
//! otherwise driven by the pipeline's own diagnostics.

mod cli;
mod commands;

use std::error::Error;

use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::init();
    simple_logger::init_with_level(args.verbosity.into()).unwrap();

    let result = match &args.command {
        Commands::Lex(common) => commands::lex::run(common),
        Commands::Parse(common) => commands::parse::run(common),
        Commands::Render(common) => commands::render::run(common),
        Commands::Format(common) => commands::format::run(common),
        Commands::Lint(lint_args) => commands::lint::run(lint_args),
    };

    match result {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(usage_error) => {
            log::error!("{usage_error}");
            std::process::exit(2);
        }
    }
}
