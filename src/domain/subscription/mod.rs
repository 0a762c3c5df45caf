//! Subscription domain module.
//!
//! # Module Structure
//!
//! - `aggregate` - Subscription aggregate entity
//! - `status` - SubscriptionStatus state machine
//! - `plan` - Plan identifiers, billing intervals and checkout modes
//! - `errors` - SubscriptionError for command and query handlers

mod aggregate;
mod errors;
mod plan;
mod status;

pub use aggregate::{Subscription, BILLING_CYCLE_DAYS};
pub use errors::SubscriptionError;
pub use plan::{BillingInterval, CheckoutMode, Plan, MIN_PLAN_LEN};
pub use status::SubscriptionStatus;
