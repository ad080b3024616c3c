use thiserror::Error;

use crate::model::SerializedError;

/// Core error type for durable function execution.
///
/// Mirrors the taxonomy in the wire protocol: step errors are reported back
/// to the Executor as part of an `OutgoingOp`, function errors reject the
/// whole run, and transport/determinism errors never reach user code.
#[derive(Error, Debug)]
pub enum InngestError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// A `step.run` (or `step.sendEvent`) handler returned an error. The
    /// Executor will retry unless `retriable` is false.
    #[error("Step error: {0}")]
    Step(SerializedError),

    /// The same as [`InngestError::Step`], but pinned non-retriable: the
    /// user's handler threw a `NonRetriableError`.
    #[error("Non-retriable step error: {0}")]
    NonRetriableStep(SerializedError),

    /// The user function itself threw outside of any step.
    #[error("Function error: {0}")]
    Function(SerializedError),

    /// A requested step was never discovered within the timeout, or the
    /// handler discovered a new step before replaying all memoized ones.
    #[error("Determinism error: {0}")]
    Determinism(String),

    /// A transform or wrap middleware hook threw.
    #[error("Middleware error: {0}")]
    Middleware(String),

    #[error("Signature verification failed: {0}")]
    SignatureMismatch(String),

    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    #[error("Unknown function id: {0}")]
    UnknownFunction(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl InngestError {
    /// Whether the Executor should retry this run. Only a
    /// [`InngestError::NonRetriableStep`] or an explicit `NonRetriableError`
    /// surfaced as a [`InngestError::Function`] pins this to `false`.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::NonRetriableStep(_) => false,
            Self::Function(e) => e.name != "NonRetriableError",
            _ => true,
        }
    }

    /// Build a non-retriable step error from a display-able cause.
    pub fn non_retriable(message: impl Into<String>) -> Self {
        Self::NonRetriableStep(SerializedError::new("NonRetriableError", message))
    }
}

impl From<serde_json::Error> for InngestError {
    fn from(e: serde_json::Error) -> Self {
        InngestError::Serialization(e.to_string())
    }
}

/// Result type alias using [`InngestError`].
pub type Result<T> = std::result::Result<T, InngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_retriable_step_is_not_retriable() {
        let err = InngestError::non_retriable("no");
        assert!(!err.is_retriable());
    }

    #[test]
    fn generic_step_error_is_retriable() {
        let err = InngestError::Step(SerializedError::new("Error", "boom"));
        assert!(err.is_retriable());
    }

    #[test]
    fn function_error_retriable_unless_named_non_retriable() {
        let retriable = InngestError::Function(SerializedError::new("Error", "boom"));
        assert!(retriable.is_retriable());

        let non_retriable =
            InngestError::Function(SerializedError::new("NonRetriableError", "boom"));
        assert!(!non_retriable.is_retriable());
    }
}
