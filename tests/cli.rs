//! End-to-end tests driving the built `jinja` binary through
//! `test_utils::check_cli_output`, for a pipeline that runs in-process
//! rather than producing a separate compiled artefact.

use std::path::Path;

use test_utils::{check_cli_output, Expected};

const HELLO_PATH: &str = "./demos/hello.jinja";

#[test]
fn render_plain_text_from_file() {
    assert!(Path::new(HELLO_PATH).exists());
    check_cli_output(
        &["render", HELLO_PATH],
        Expected {
            stdout: "Hello, World!\n",
            stderr: Some(""),
            code: 0,
        },
    )
    .unwrap();
}

#[test]
fn lex_reports_usage_error_without_input() {
    check_cli_output(
        &["lex"],
        Expected {
            stdout: "",
            stderr: None,
            code: 2,
        },
    )
    .unwrap();
}
