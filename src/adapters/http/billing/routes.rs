//! Axum router configuration for billing endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    cancel_subscription, change_plan, create_trial, get_billing_metrics, get_subscription,
    handle_stripe_webhook, list_subscriptions, start_checkout, BillingAppState,
};

/// Create the billing API router.
///
/// # Routes
///
/// ## Host Endpoints (require `X-User-Id`)
/// - `POST /checkout` - Start a provider checkout for a listing
/// - `POST /trial` - Start a free trial
/// - `GET /subscriptions` - List the caller's subscriptions
/// - `GET /subscriptions/:id` - Get one subscription
/// - `POST /subscriptions/:id/plan` - Change plan and price
/// - `POST /subscriptions/:id/cancel` - Cancel
///
/// ## Admin Endpoints
/// - `GET /metrics?window_days=30` - MRR and churn
pub fn billing_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/checkout", post(start_checkout))
        .route("/trial", post(create_trial))
        .route("/subscriptions", get(list_subscriptions))
        .route("/subscriptions/:id", get(get_subscription))
        .route("/subscriptions/:id/plan", post(change_plan))
        .route("/subscriptions/:id/cancel", post(cancel_subscription))
        .route("/metrics", get(get_billing_metrics))
}

/// Create the Stripe webhook router.
///
/// Separate from the billing routes because webhooks carry no user identity;
/// they are authenticated by signature.
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/stripe", post(handle_stripe_webhook))
}

/// Create the complete billing module router, for mounting at `/api`.
///
/// ```ignore
/// let app = Router::new()
///     .nest("/api", billing_router())
///     .with_state(billing_state);
/// ```
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .nest("/billing", billing_routes())
        .nest("/webhooks", webhook_routes())
}
