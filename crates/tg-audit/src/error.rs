//! Audit error types.

/// Audit errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    /// A denial was recorded without a reason.
    #[error("Denied access must carry a reason")]
    MissingReason,

    /// The sink could not record the event.
    #[error("Audit sink failed: {0}")]
    SinkFailed(String),
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_reason_display() {
        assert_eq!(
            AuditError::MissingReason.to_string(),
            "Denied access must carry a reason"
        );
    }

    #[test]
    fn sink_failed_display() {
        let e = AuditError::SinkFailed("disk full".into());
        assert_eq!(e.to_string(), "Audit sink failed: disk full");
    }
}
