//! Subscription handlers.
//!
//! ## Commands
//! - Starting a provider checkout (founder seat allocation included)
//! - Starting a free trial
//! - Changing plan or price
//! - Cancelling
//! - Reconciling provider webhooks
//!
//! ## Queries
//! - A host's subscriptions, or one by id
//! - Billing metrics (admin)

mod cancel_subscription;
mod change_plan;
mod create_trial;
mod get_billing_metrics;
mod get_subscriptions;
mod handle_billing_webhook;
mod reconcile_events;
mod start_checkout;

// Commands
pub use cancel_subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
    CancellationEffect,
};
pub use change_plan::{ChangePlanCommand, ChangePlanHandler, ChangePlanResult};
pub use create_trial::{CreateTrialCommand, CreateTrialHandler, CreateTrialResult};
pub use handle_billing_webhook::{
    reconciliation_registry, HandleBillingWebhookCommand, HandleBillingWebhookHandler,
    ReconciliationPorts,
};
pub use reconcile_events::{
    CheckoutCompletedHandler, InvoicePaidHandler, InvoicePaymentFailedHandler,
    SubscriptionDeletedHandler, SubscriptionUpdatedHandler,
};
pub use start_checkout::{
    CheckoutUrls, StartCheckoutCommand, StartCheckoutHandler, StartCheckoutResult,
};

// Queries
pub use get_billing_metrics::{GetBillingMetricsHandler, GetBillingMetricsQuery, MAX_WINDOW_DAYS};
pub use get_subscriptions::{
    GetSubscriptionHandler, GetSubscriptionQuery, GetSubscriptionsHandler, GetSubscriptionsQuery,
};
