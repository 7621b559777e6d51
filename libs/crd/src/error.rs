//! Error types for record validation.

use thiserror::Error;

/// Errors raised while validating records or names.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CrdError {
    /// The name is empty.
    #[error("name cannot be empty")]
    EmptyName,

    /// The name is longer than a DNS label allows.
    #[error("name '{name}' is longer than {max} characters")]
    NameTooLong { name: String, max: usize },

    /// The name contains characters outside `[a-z0-9-]` or starts/ends with `-`.
    #[error("name '{0}' must be a lowercase RFC 1123 label")]
    InvalidName(String),

    /// A required field is missing.
    #[error("{field} is required")]
    MissingField { field: &'static str },

    /// A field holds a value that cannot be parsed.
    #[error("invalid {field}: {message}")]
    InvalidField { field: &'static str, message: String },
}

impl CrdError {
    /// Returns true if this error is about a name rather than a field.
    pub fn is_name_error(&self) -> bool {
        matches!(
            self,
            CrdError::EmptyName | CrdError::NameTooLong { .. } | CrdError::InvalidName(_)
        )
    }
}
