//! Post-install smoke test: run the binary's help and look for a phrase.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use crate::error::InstallError;
use crate::process;

/// Runs `binary args...` and returns its standard output.
///
/// A non-zero exit status fails the smoke test, as does a start failure or a
/// deadline overrun.
pub fn run_help(binary: &Path, args: &[String], timeout: Duration) -> Result<String, InstallError> {
    let mut cmd = Command::new(binary);
    cmd.args(args);
    let shown = format!("{} {}", binary.display(), args.join(" "));

    let out = process::run_with_deadline(&mut cmd, timeout).map_err(|e| {
        InstallError::Assertion {
            expected: format!("`{}` to run", shown.trim_end()),
            output: format!("{}\n{}", e, e.captured()),
        }
    })?;
    if !out.status.success() {
        return Err(InstallError::Assertion {
            expected: format!("`{}` to exit successfully ({})", shown.trim_end(), out.status),
            output: out.combined(),
        });
    }
    Ok(out.stdout)
}

/// Fails with `Assertion` unless `text` contains `expected` verbatim.
/// Returns the first line holding the match, or all of `text` when the
/// expected phrase spans lines.
pub fn assert_contains<'a>(text: &'a str, expected: &str) -> Result<&'a str, InstallError> {
    if !text.contains(expected) {
        return Err(InstallError::Assertion {
            expected: expected.to_string(),
            output: text.to_string(),
        });
    }
    Ok(text
        .lines()
        .find(|line| line.contains(expected))
        .unwrap_or(text))
}
