use std::{
    error::Error,
    io,
    process::{Command, Output},
    str,
};

const JINJA_PATH: &str = "./target/debug/jinja";

/// The expected shape of a `jinja` CLI invocation: stdout contents, an
/// optional exact stderr match (`None` skips the check — `log`/
/// `simple_logger` output carries a formatter-chosen prefix this crate
/// doesn't control), plus an expected exit code following the usual 0/1/2
/// success/usage-error/internal-error convention.
pub struct Expected<'a> {
    pub stdout: &'a str,
    pub stderr: Option<&'a str>,
    pub code: i32,
}

impl<'a> Expected<'a> {
    fn assert_matches(self, output: &Output) -> Result<(), Box<dyn Error>> {
        assert_eq!(str::from_utf8(&output.stdout)?, self.stdout);
        if let Some(stderr) = self.stderr {
            assert_eq!(str::from_utf8(&output.stderr)?, stderr);
        }
        assert_eq!(output.status.code(), Some(self.code));
        Ok(())
    }
}

fn run_jinja(args: &[&str]) -> Result<Output, io::Error> {
    Command::new(JINJA_PATH).args(args).output()
}

/// Runs the built `jinja` binary with `args` and asserts its stdout,
/// stderr, and exit code match `expected`. The binary's own pipeline runs
/// in-process, so there is no separate compiled-artefact step to run
/// afterwards.
pub fn check_cli_output(args: &[&str], expected: Expected) -> Result<(), Box<dyn Error>> {
    let output = run_jinja(args)?;
    expected.assert_matches(&output)
}
