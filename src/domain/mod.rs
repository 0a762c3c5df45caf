//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors, state machine)
//! - `subscription` - Subscription record, plans and lifecycle
//! - `billing` - Stripe webhook events, signature verification, idempotent dispatch
//! - `listing` - The listing visibility billing controls
//! - `analytics` - MRR and churn computed from subscription rows

pub mod analytics;
pub mod billing;
pub mod foundation;
pub mod listing;
pub mod subscription;
