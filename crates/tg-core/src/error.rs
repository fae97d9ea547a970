//! Core error types.

/// Validation errors for core value types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// An identifier was empty or malformed.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A posture report was not a JSON object.
    #[error("Invalid posture report: {0}")]
    InvalidPosture(String),

    /// A policy failed validation.
    #[error("Invalid policy '{name}': {message}")]
    InvalidPolicy {
        /// Name of the offending policy.
        name: String,
        /// What is wrong with it.
        message: String,
    },
}

/// Result type for core validation.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors surfaced by storage collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// The backing store could not serve the request.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_policy_display() {
        let e = CoreError::InvalidPolicy {
            name: "weekday-only".into(),
            message: "hour 25 out of range".into(),
        };
        assert_eq!(
            e.to_string(),
            "Invalid policy 'weekday-only': hour 25 out of range"
        );
    }

    #[test]
    fn invalid_posture_display() {
        let e = CoreError::InvalidPosture("expected object".into());
        assert_eq!(e.to_string(), "Invalid posture report: expected object");
    }

    #[test]
    fn store_error_display() {
        assert_eq!(
            StoreError::NotFound("device 42".into()).to_string(),
            "Record not found: device 42"
        );
        assert_eq!(
            StoreError::Unavailable("timeout".into()).to_string(),
            "Store unavailable: timeout"
        );
    }
}
