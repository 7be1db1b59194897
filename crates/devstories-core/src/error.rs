//! Error types for parsing documents and settings.

use thiserror::Error;

/// A document that cannot be turned into an entity.
///
/// The store skips such files; the validator reports the same problems as
/// positioned diagnostics instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    /// The file does not start with a `---` delimited header block.
    #[error("no frontmatter block found")]
    NoFrontmatter,

    /// The header block exists but is not a readable key/value mapping.
    #[error("invalid frontmatter: {message}")]
    InvalidHeader {
        message: String,
        /// 1-indexed line in the file, when the YAML parser reports one
        line: Option<usize>,
    },

    /// A required field is absent, null or blank.
    #[error("missing required field `{field}`")]
    MissingField { field: &'static str },

    /// A field is present but cannot be represented in the entity.
    #[error("invalid value for `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl StructuralError {
    /// The frontmatter key this error is about, if any.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            StructuralError::MissingField { field }
            | StructuralError::InvalidField { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// The settings file, or one section of it, could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SettingsParseError {
    pub message: String,
    /// 1-indexed line, when known
    pub line: Option<usize>,
    /// 1-indexed column, when known
    pub column: Option<usize>,
}

impl SettingsParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            column: None,
        }
    }
}

impl From<serde_json::Error> for SettingsParseError {
    fn from(err: serde_json::Error) -> Self {
        let (line, column) = if err.line() == 0 {
            (None, None)
        } else {
            (Some(err.line()), Some(err.column()))
        };
        Self {
            message: err.to_string(),
            line,
            column,
        }
    }
}
