//! Error taxonomy for the install pipeline.
//!
//! Every variant belongs to exactly one pipeline stage so the CLI can report
//! which step failed alongside the underlying message.

use std::fmt;
use std::io;
use thiserror::Error;

/// Lines of captured tool output kept when rendering an error.
const OUTPUT_TAIL_LINES: usize = 40;

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Formula,
    Fetch,
    Verify,
    Extract,
    Build,
    Install,
    SmokeTest,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Formula => "formula",
            Stage::Fetch => "fetch",
            Stage::Verify => "verify",
            Stage::Extract => "extract",
            Stage::Build => "build",
            Stage::Install => "install",
            Stage::SmokeTest => "smoke-test",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of one install attempt. None of these are retried.
#[derive(Debug, Error)]
pub enum InstallError {
    /// Descriptor failed validation or could not be parsed.
    #[error("invalid formula: {0}")]
    Formula(String),

    /// Transport failure, non-2xx HTTP status, or oversized download.
    #[error("{0}")]
    Network(String),

    /// Fetched bytes do not hash to the declared SHA-256.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Empty, truncated, corrupt or unsupported archive.
    #[error("{0}")]
    Archive(String),

    /// Toolchain missing, failed, timed out, or produced no artifact.
    #[error("{message}{}", output_suffix(.output))]
    Build {
        message: String,
        status: Option<i32>,
        output: String,
    },

    /// Filesystem failure; `stage` is where it happened.
    #[error("{context}: {source}")]
    Io {
        stage: Stage,
        context: String,
        #[source]
        source: io::Error,
    },

    /// Smoke test output did not contain the expected text.
    #[error("expected output to contain {expected:?}{}", output_suffix(.output))]
    Assertion { expected: String, output: String },
}

impl InstallError {
    pub fn io(stage: Stage, context: impl Into<String>, source: io::Error) -> Self {
        InstallError::Io {
            stage,
            context: context.into(),
            source,
        }
    }

    /// Stage that produced this error.
    pub fn stage(&self) -> Stage {
        match self {
            InstallError::Formula(_) => Stage::Formula,
            InstallError::Network(_) => Stage::Fetch,
            InstallError::ChecksumMismatch { .. } => Stage::Verify,
            InstallError::Archive(_) => Stage::Extract,
            InstallError::Build { .. } => Stage::Build,
            InstallError::Io { stage, .. } => *stage,
            InstallError::Assertion { .. } => Stage::SmokeTest,
        }
    }
}

/// Renders the last few lines of captured output, or nothing if empty.
fn output_suffix(output: &str) -> String {
    let trimmed = output.trim_end();
    if trimmed.is_empty() {
        return String::new();
    }
    let lines: Vec<&str> = trimmed.lines().collect();
    let start = lines.len().saturating_sub(OUTPUT_TAIL_LINES);
    format!("\n--- captured output ---\n{}", lines[start..].join("\n"))
}
