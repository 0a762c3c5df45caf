//! HTTP DTOs (Data Transfer Objects) for billing endpoints.
//!
//! These types define the JSON request/response structure for the billing API.
//! They serve as the boundary between HTTP and the application layer.

use serde::{Deserialize, Serialize};

use crate::application::handlers::subscription::{CancellationEffect, StartCheckoutResult};
use crate::domain::analytics::{BillingMetrics, StatusCounts};
use crate::domain::billing::WebhookResult;
use crate::domain::foundation::Timestamp;
use crate::domain::subscription::{
    BillingInterval, CheckoutMode, Subscription, SubscriptionStatus,
};

fn rfc3339(ts: Timestamp) -> String {
    ts.as_datetime().to_rfc3339()
}

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to start a checkout for a listing.
#[derive(Debug, Clone, Deserialize)]
pub struct StartCheckoutRequest {
    pub space_id: String,
    /// Omitted for the one-time activation fee.
    #[serde(default)]
    pub interval: Option<BillingInterval>,
    #[serde(default)]
    pub coupon_code: Option<String>,
}

/// Request to start a free trial on a listing.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTrialRequest {
    pub space_id: String,
}

/// Request to move a subscription to another plan.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangePlanRequest {
    pub plan: String,
    pub price_cents: i64,
}

/// Query string for the metrics endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsParams {
    #[serde(default)]
    pub window_days: Option<i64>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Subscription as returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResponse {
    pub id: String,
    pub user_id: String,
    pub space_id: Option<String>,
    pub plan: String,
    pub price_cents: i64,
    pub status: SubscriptionStatus,
    pub cancel_at_period_end: bool,
    pub coupon_code: Option<String>,
    pub trial_until: Option<String>,
    pub next_billing_date: Option<String>,
    pub created_at: String,
    pub cancelled_at: Option<String>,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(s: Subscription) -> Self {
        Self {
            id: s.id.to_string(),
            user_id: s.user_id.to_string(),
            space_id: s.space_id.map(|id| id.to_string()),
            plan: s.plan.as_str().to_string(),
            price_cents: s.price_cents,
            status: s.status,
            cancel_at_period_end: s.cancel_at_period_end,
            coupon_code: s.coupon_code,
            trial_until: s.trial_until.map(rfc3339),
            next_billing_date: s.next_billing_date.map(rfc3339),
            created_at: rfc3339(s.created_at),
            cancelled_at: s.cancelled_at.map(rfc3339),
        }
    }
}

/// List of the caller's subscriptions.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionListResponse {
    pub subscriptions: Vec<SubscriptionResponse>,
}

/// Response for checkout initiation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckoutResponse {
    /// Send the host to `checkout_url`.
    Redirect {
        checkout_url: String,
        session_id: String,
        plan: String,
        price_cents: i64,
        mode: CheckoutMode,
    },
    /// The listing is already paid for.
    AlreadyActive { subscription_id: String },
}

impl From<StartCheckoutResult> for CheckoutResponse {
    fn from(result: StartCheckoutResult) -> Self {
        match result {
            StartCheckoutResult::Redirect {
                session,
                plan,
                price_cents,
                mode,
            } => CheckoutResponse::Redirect {
                checkout_url: session.url,
                session_id: session.id,
                plan: plan.as_str().to_string(),
                price_cents,
                mode,
            },
            StartCheckoutResult::AlreadyActive { subscription_id } => {
                CheckoutResponse::AlreadyActive {
                    subscription_id: subscription_id.to_string(),
                }
            }
        }
    }
}

/// Response for cancellation.
#[derive(Debug, Clone, Serialize)]
pub struct CancelSubscriptionResponse {
    pub subscription: SubscriptionResponse,
    /// `at_period_end` or `immediate`.
    pub effect: &'static str,
    /// When access ends, for period-end cancellations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_at: Option<String>,
}

impl CancelSubscriptionResponse {
    pub fn new(subscription: Subscription, effect: CancellationEffect) -> Self {
        let (effect, effective_at) = match effect {
            CancellationEffect::AtPeriodEnd { until } => ("at_period_end", until.map(rfc3339)),
            CancellationEffect::Immediate => ("immediate", None),
        };
        Self {
            subscription: subscription.into(),
            effect,
            effective_at,
        }
    }
}

/// Billing metrics (admin).
#[derive(Debug, Clone, Serialize)]
pub struct BillingMetricsResponse {
    pub window_days: i64,
    pub window_start: String,
    pub computed_at: String,
    pub mrr_cents: i64,
    pub new_mrr_cents: i64,
    pub churned_mrr_cents: i64,
    pub active_count: u64,
    pub new_count: u64,
    pub churned_count: u64,
    pub customer_churn_rate: f64,
    pub revenue_churn_rate: f64,
    pub by_status: StatusCounts,
}

impl From<BillingMetrics> for BillingMetricsResponse {
    fn from(m: BillingMetrics) -> Self {
        Self {
            window_days: m.window_days,
            window_start: rfc3339(m.window_start),
            computed_at: rfc3339(m.computed_at),
            mrr_cents: m.mrr_cents,
            new_mrr_cents: m.new_mrr_cents,
            churned_mrr_cents: m.churned_mrr_cents,
            active_count: m.active_count,
            new_count: m.new_count,
            churned_count: m.churned_count,
            customer_churn_rate: m.customer_churn_rate,
            revenue_churn_rate: m.revenue_churn_rate,
            by_status: m.by_status,
        }
    }
}

/// Acknowledgement returned to the provider.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAckResponse {
    pub received: bool,
    /// `processed`, `ignored` or `duplicate`.
    pub outcome: &'static str,
}

impl From<&WebhookResult> for WebhookAckResponse {
    fn from(result: &WebhookResult) -> Self {
        let outcome = match result {
            WebhookResult::Processed { .. } => "processed",
            WebhookResult::Ignored { .. } => "ignored",
            WebhookResult::AlreadyProcessed => "duplicate",
        };
        Self {
            received: true,
            outcome,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Response DTO
// ════════════════════════════════════════════════════════════════════════════════

/// Standard error response for API errors.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error_code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: Some(details),
        }
    }
}
