//! Billing webhook domain: Stripe event shapes, signature verification and
//! idempotent dispatch.

mod stripe_event;
mod webhook_errors;
mod webhook_processor;
mod webhook_verifier;

pub use stripe_event::{
    metadata,
    CheckoutSessionObject, InvoiceLine, InvoiceLines, InvoiceObject, InvoicePeriod, StripeEvent,
    StripeEventData, StripeEventType, SubscriptionObject,
};
pub use webhook_errors::WebhookError;
pub use webhook_processor::{
    IdempotentWebhookProcessor, WebhookDispatcher, WebhookEventHandler, WebhookHandlerRegistry,
    WebhookResult,
};
pub use webhook_verifier::{
    generate_test_header, SignatureHeader, StripeWebhookVerifier, DEFAULT_TOLERANCE_SECS,
};

#[cfg(test)]
pub use stripe_event::StripeEventBuilder;
