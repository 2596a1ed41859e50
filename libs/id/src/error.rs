//! Error types for identifier parsing.

use thiserror::Error;

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The identifier string is empty.
    #[error("identifier cannot be empty")]
    Empty,

    /// The identifier contains only whitespace.
    #[error("identifier cannot be blank")]
    Blank,
}

impl IdError {
    /// Returns true if this error indicates the input carried no characters.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty | IdError::Blank)
    }
}
