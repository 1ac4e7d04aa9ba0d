use thiserror::Error;

/// Errors surfaced by editor operations.
///
/// `Validation` and `InvalidOperation` are returned before anything is
/// mutated, so the editor state is unchanged when either comes back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditorError {
    /// Bad input: unknown layer id, index out of range, seed outside the
    /// surface, malformed blob, out-of-range property value.
    #[error("Validation error: {0}")]
    Validation(String),
    /// The request is well-formed but not allowed in the current state.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    /// A buffer could not be allocated or copied.
    #[error("Resource error: {0}")]
    Resource(String),
}

impl EditorError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }
}

impl From<std::collections::TryReserveError> for EditorError {
    fn from(e: std::collections::TryReserveError) -> Self {
        EditorError::Resource(format!("buffer allocation failed: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, EditorError>;
