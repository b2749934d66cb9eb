//! Command result shared by the one-shot and stateful execution paths.

use serde::{Deserialize, Serialize};

/// Exit code reserved for "the command did not actually execute".
pub const NOT_EXECUTED: i32 = -1;

/// Outcome of a shell command.
///
/// Both the process runner and the stateful shell bridge produce this shape,
/// so callers never need to know which path served a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Captured standard output.
    #[serde(default)]
    pub stdout: String,
    /// Captured standard error.
    #[serde(default)]
    pub stderr: String,
    /// Process exit code, or [`NOT_EXECUTED`].
    #[serde(rename = "exitCode", alias = "code")]
    pub exit_code: i32,
}

impl CommandResult {
    /// Create a result from captured output.
    #[must_use]
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// A command that never ran (containment failure, missing directory, launch error).
    #[must_use]
    pub fn not_executed(message: impl Into<String>) -> Self {
        Self::new(String::new(), message, NOT_EXECUTED)
    }

    /// A command killed because it exceeded its wall-clock budget.
    #[must_use]
    pub fn timed_out() -> Self {
        Self::not_executed("Timeout expired")
    }

    /// Whether the command ran and exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}
