//! HTTP adapter for billing endpoints.
//!
//! - `POST /api/billing/checkout` - Start a provider checkout
//! - `POST /api/billing/trial` - Start a free trial
//! - `GET /api/billing/subscriptions` - The caller's subscriptions
//! - `GET /api/billing/subscriptions/:id` - One subscription
//! - `POST /api/billing/subscriptions/:id/plan` - Change plan
//! - `POST /api/billing/subscriptions/:id/cancel` - Cancel
//! - `GET /api/billing/metrics` - MRR and churn (admin)
//! - `POST /api/webhooks/stripe` - Handle Stripe webhooks

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use handlers::{
    AuthenticatedUser, BillingApiError, BillingAppState, BillingPorts, BillingSettings,
    SIGNATURE_HEADER,
};
pub use routes::{billing_router, billing_routes, webhook_routes};
