//! The error type user handlers and step closures deal with directly.
//! Mirrors the `NonRetriable` distinction from spec §4.2/§7 without forcing
//! user code to construct a `SerializedError` by hand.

use inngest_core::SerializedError;

/// An error a step closure or function handler may return. `NonRetriable`
/// maps onto the wire's `NonRetriableError` name, which the Executor (and
/// [`inngest_core::InngestError::is_retriable`]) treats as final.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("{0}")]
    Retriable(String),

    #[error("{0}")]
    NonRetriable(String),
}

impl StepError {
    pub fn non_retriable(message: impl Into<String>) -> Self {
        Self::NonRetriable(message.into())
    }
}

impl From<anyhow::Error> for StepError {
    fn from(e: anyhow::Error) -> Self {
        Self::Retriable(e.to_string())
    }
}

impl From<serde_json::Error> for StepError {
    fn from(e: serde_json::Error) -> Self {
        Self::Retriable(e.to_string())
    }
}

pub(crate) fn to_serialized(err: StepError) -> SerializedError {
    match err {
        StepError::NonRetriable(message) => SerializedError::new("NonRetriableError", message),
        StepError::Retriable(message) => SerializedError::new("Error", message),
    }
}

pub(crate) fn from_serialized(err: SerializedError) -> StepError {
    if err.name == "NonRetriableError" {
        StepError::NonRetriable(err.message)
    } else {
        StepError::Retriable(err.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_non_retriable_through_serialized_error() {
        let err = StepError::non_retriable("no");
        let serialized = to_serialized(err);
        assert_eq!(serialized.name, "NonRetriableError");
        assert!(matches!(from_serialized(serialized), StepError::NonRetriable(_)));
    }

    #[test]
    fn generic_error_serializes_as_plain_error_name() {
        let serialized = to_serialized(StepError::Retriable("boom".into()));
        assert_eq!(serialized.name, "Error");
    }
}
