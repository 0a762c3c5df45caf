//! Webhook error types for Stripe webhook handling.
//!
//! The status code decides whether Stripe redelivers: anything non-2xx is
//! retried, so only failures that left local state untouched map to 5xx.

use axum::http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::DomainError;

/// Errors that occur during webhook processing.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// No signature header on the request.
    #[error("Missing signature")]
    MissingSignature,

    /// Signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signed timestamp is older than the tolerance window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Signed timestamp is in the future beyond clock skew tolerance.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// Failed to parse the payload or signature header.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Required checkout metadata is missing.
    #[error("Missing metadata: {0}")]
    MissingMetadata(&'static str),

    /// Event was intentionally ignored (not an error condition).
    #[error("Event ignored: {0}")]
    Ignored(String),

    /// Database operation failed; local state was not updated.
    #[error("Database error: {0}")]
    Database(String),

    /// Processing did not finish within the delivery deadline.
    #[error("Processing exceeded {0}s deadline")]
    Timeout(u64),
}

impl WebhookError {
    /// Returns true if Stripe should retry delivering this webhook.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WebhookError::Database(_) | WebhookError::Timeout(_))
    }

    /// Signature or replay-window failures.
    pub fn is_authenticity_failure(&self) -> bool {
        matches!(
            self,
            WebhookError::MissingSignature
                | WebhookError::InvalidSignature
                | WebhookError::TimestampOutOfRange
                | WebhookError::InvalidTimestamp
        )
    }

    /// Maps the error to an HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::MissingSignature
            | WebhookError::InvalidSignature
            | WebhookError::TimestampOutOfRange => StatusCode::UNAUTHORIZED,

            WebhookError::InvalidTimestamp
            | WebhookError::ParseError(_)
            | WebhookError::MissingMetadata(_) => StatusCode::BAD_REQUEST,

            WebhookError::Ignored(_) => StatusCode::OK,

            WebhookError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WebhookError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<DomainError> for WebhookError {
    fn from(err: DomainError) -> Self {
        WebhookError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ══════════════════════════════════════════════════════════════
    // Display
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn missing_metadata_displays_field_name() {
        let err = WebhookError::MissingMetadata("space_id");
        assert_eq!(format!("{}", err), "Missing metadata: space_id");
    }

    #[test]
    fn timeout_displays_deadline() {
        assert_eq!(
            WebhookError::Timeout(10).to_string(),
            "Processing exceeded 10s deadline"
        );
    }

    // ══════════════════════════════════════════════════════════════
    // Status codes and retry semantics
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn authenticity_failures_are_unauthorized_and_final() {
        for err in [
            WebhookError::MissingSignature,
            WebhookError::InvalidSignature,
            WebhookError::TimestampOutOfRange,
        ] {
            assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
            assert!(err.is_authenticity_failure());
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn bad_payloads_are_bad_requests() {
        assert_eq!(
            WebhookError::ParseError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WebhookError::MissingMetadata("user_id").status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn ignored_is_acknowledged() {
        assert_eq!(
            WebhookError::Ignored("unknown".into()).status_code(),
            StatusCode::OK
        );
    }

    #[test]
    fn storage_failures_and_timeouts_trigger_redelivery() {
        let db = WebhookError::Database("deadlock".into());
        assert!(db.is_retryable());
        assert!(db.status_code().is_server_error());

        let timeout = WebhookError::Timeout(10);
        assert!(timeout.is_retryable());
        assert_eq!(timeout.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn domain_errors_become_database_errors() {
        let err: WebhookError = DomainError::database("pool timed out").into();
        assert!(matches!(err, WebhookError::Database(_)));
    }
}
