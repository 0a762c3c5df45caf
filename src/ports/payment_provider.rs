//! Payment provider port for hosted checkout and subscription control.
//!
//! Stripe is the production implementation. The reconciler never calls the
//! provider; provider state flows back in through webhooks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::billing::metadata;
use crate::domain::foundation::{DomainError, ErrorCode, SpaceId, UserId};
use crate::domain::subscription::{CheckoutMode, Plan};

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a hosted checkout session.
    ///
    /// Returns a URL for the host to complete payment.
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    /// Stop a provider subscription from renewing at the end of its period.
    async fn cancel_at_period_end(
        &self,
        external_subscription_id: &str,
    ) -> Result<(), PaymentError>;
}

/// Request to create a checkout session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCheckoutRequest {
    pub user_id: UserId,
    pub space_id: SpaceId,
    pub plan: Plan,
    pub mode: CheckoutMode,

    /// Provider price reference for the plan.
    pub price_id: String,

    pub success_url: String,
    pub cancel_url: String,

    /// Existing provider customer, if the host paid before.
    pub customer_id: Option<String>,

    pub coupon_code: Option<String>,

    /// Idempotency key for safe retries.
    pub idempotency_key: Option<String>,
}

impl CreateCheckoutRequest {
    /// Metadata the reconciler reads back from `checkout.session.completed`.
    pub fn metadata(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            (metadata::USER_ID, self.user_id.to_string()),
            (metadata::SPACE_ID, self.space_id.to_string()),
            (metadata::PLAN_TYPE, self.plan.to_string()),
        ];
        if let Some(code) = &self.coupon_code {
            pairs.push((metadata::COUPON_CODE, code.clone()));
        }
        pairs
    }
}

/// Checkout session for payment completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Provider's session ID.
    pub id: String,

    /// URL for the host to complete checkout.
    pub url: String,

    /// When the session expires (Unix timestamp).
    pub expires_at: Option<i64>,
}

/// Errors from payment provider operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentError {
    pub code: PaymentErrorCode,
    pub message: String,

    /// Provider's error code (if available).
    pub provider_code: Option<String>,

    pub retryable: bool,
}

impl PaymentError {
    pub fn new(code: PaymentErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::NetworkError, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::AuthenticationError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::InvalidRequest, message)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(PaymentErrorCode::NotFound, format!("{} not found", resource))
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::ProviderError, message)
    }
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PaymentError {}

impl From<PaymentError> for DomainError {
    fn from(err: PaymentError) -> Self {
        DomainError::new(ErrorCode::PaymentFailed, err.message)
            .with_detail("payment_code", err.code.to_string())
    }
}

/// Payment error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorCode {
    NetworkError,
    AuthenticationError,
    /// The provider rejected the request parameters.
    InvalidRequest,
    NotFound,
    RateLimitExceeded,
    ProviderError,
    Unknown,
}

impl PaymentErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentErrorCode::NetworkError
                | PaymentErrorCode::RateLimitExceeded
                | PaymentErrorCode::ProviderError
        )
    }
}

impl std::fmt::Display for PaymentErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentErrorCode::NetworkError => "network_error",
            PaymentErrorCode::AuthenticationError => "authentication_error",
            PaymentErrorCode::InvalidRequest => "invalid_request",
            PaymentErrorCode::NotFound => "not_found",
            PaymentErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            PaymentErrorCode::ProviderError => "provider_error",
            PaymentErrorCode::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}
