//! Diagnostic formatting for task failures
//!
//! This module renders a failure together with the task it came from and its
//! chain of causes, for terminal output.

use super::CoroError;
use colored::Colorize;

/// Diagnostic information for displaying failures with context
pub struct Diagnostic {
    error: CoroError,
    task: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic from an error
    pub fn new(error: CoroError) -> Self {
        Self { error, task: None }
    }

    /// Create a diagnostic naming the task the failure surfaced in
    pub fn with_task(error: CoroError, task: impl Into<String>) -> Self {
        Self {
            error,
            task: Some(task.into()),
        }
    }

    /// Format the diagnostic with color and context
    pub fn format(&self) -> String {
        let mut output = String::new();

        // Error header
        let kind = self.error.kind().red().bold();
        output.push_str(&format!("{}: ", kind));
        output.push_str(self.error.message());
        if self.error.code() != 0 {
            output.push_str(&format!(" [code {}]", self.error.code()));
        }
        output.push('\n');

        if let Some(ref task) = self.task {
            output.push_str(&format!("  {} task {}\n", "-->".blue().bold(), task));
        }

        output.push_str(&self.format_causes());
        output
    }

    /// Format the cause chain, outermost first
    fn format_causes(&self) -> String {
        let mut output = String::new();
        let mut current = self.error.cause();

        while let Some(cause) = current {
            output.push_str(&format!(
                "  {} {}: {}\n",
                "= caused by".blue().bold(),
                cause.kind(),
                cause.message()
            ));
            current = cause.cause();
        }

        output
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.format())
    }
}
