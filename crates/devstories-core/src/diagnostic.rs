//! Validation findings.

use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A position-tagged validation finding.
///
/// `line` is 1-indexed. `column` and `end_column` are 0-indexed character
/// offsets within that line, `end_column` exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: usize,
    pub column: usize,
    pub end_column: usize,
    pub message: String,
    pub severity: Severity,
    /// Frontmatter key the finding is attached to
    pub field: Option<String>,
}

impl Diagnostic {
    pub fn error(
        line: usize,
        column: usize,
        end_column: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            line,
            column,
            end_column,
            message: message.into(),
            severity: Severity::Error,
            field: None,
        }
    }

    pub fn warning(
        line: usize,
        column: usize,
        end_column: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(line, column, end_column, message)
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}: {}: {}",
            self.line,
            self.column + 1,
            self.severity,
            self.message
        )
    }
}
