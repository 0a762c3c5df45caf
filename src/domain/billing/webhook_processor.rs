//! Webhook processor - idempotent dispatch of Stripe events.
//!
//! The processor follows these steps:
//! 1. Skip events already present in the ledger
//! 2. Dispatch to the handler registered for the event type
//! 3. Record successful and ignored events in the ledger
//!
//! Failed events are not recorded, so Stripe's redelivery runs them again.
//! When two deliveries race, the ledger's primary key picks one winner and
//! the other reports `AlreadyProcessed`; handlers themselves stay idempotent
//! for that window.

use std::sync::Arc;

use async_trait::async_trait;

use super::stripe_event::{StripeEvent, StripeEventType};
use super::webhook_errors::WebhookError;
use crate::domain::listing::VisibilityChange;
use crate::ports::{SaveResult, WebhookEventRecord, WebhookEventRepository};

/// Handler for one or more Stripe event types.
///
/// On success a handler returns the listing visibility changes implied by
/// what it committed. Returning `Err(WebhookError::Ignored(_))` acknowledges
/// the event without acting on it.
#[async_trait]
pub trait WebhookEventHandler: Send + Sync {
    /// Returns the event type(s) this handler processes.
    fn handles(&self) -> Vec<StripeEventType>;

    async fn handle(&self, event: &StripeEvent) -> Result<Vec<VisibilityChange>, WebhookError>;
}

/// Routes events to handlers.
#[async_trait]
pub trait WebhookDispatcher: Send + Sync {
    /// Find a handler for the given event type.
    fn get_handler(&self, event_type: &StripeEventType) -> Option<&dyn WebhookEventHandler>;

    /// Dispatch an event to its handler.
    ///
    /// Returns `Err(WebhookError::Ignored)` if no handler is registered.
    async fn dispatch(&self, event: &StripeEvent) -> Result<Vec<VisibilityChange>, WebhookError> {
        let event_type = event.parsed_type();
        match self.get_handler(&event_type) {
            Some(handler) => handler.handle(event).await,
            None => Err(WebhookError::Ignored(format!(
                "No handler for event type: {}",
                event.event_type
            ))),
        }
    }
}

/// Dispatcher backed by a list of handlers.
#[derive(Default)]
pub struct WebhookHandlerRegistry {
    handlers: Vec<Box<dyn WebhookEventHandler>>,
}

impl WebhookHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, handler: impl WebhookEventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }
}

impl WebhookDispatcher for WebhookHandlerRegistry {
    fn get_handler(&self, event_type: &StripeEventType) -> Option<&dyn WebhookEventHandler> {
        self.handlers
            .iter()
            .find(|h| h.handles().contains(event_type))
            .map(|h| h.as_ref())
    }
}

/// Result of webhook processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookResult {
    /// Event was handled; carries the listing changes still to apply.
    Processed { effects: Vec<VisibilityChange> },
    /// Event was acknowledged without changes.
    Ignored { reason: String },
    /// Event was already in the ledger.
    AlreadyProcessed,
}

/// Processes webhook events with idempotency guarantees.
pub struct IdempotentWebhookProcessor<D: WebhookDispatcher> {
    ledger: Arc<dyn WebhookEventRepository>,
    dispatcher: D,
}

impl<D: WebhookDispatcher> IdempotentWebhookProcessor<D> {
    pub fn new(ledger: Arc<dyn WebhookEventRepository>, dispatcher: D) -> Self {
        Self { ledger, dispatcher }
    }

    /// Process a webhook event at most once per event id.
    ///
    /// Events without an id bypass the ledger and rely on handler
    /// idempotency alone.
    pub async fn process(&self, event: &StripeEvent) -> Result<WebhookResult, WebhookError> {
        let tracked = !event.id.is_empty();

        if tracked && self.ledger.find_by_event_id(&event.id).await?.is_some() {
            return Ok(WebhookResult::AlreadyProcessed);
        }

        let (record, result) = match self.dispatcher.dispatch(event).await {
            Ok(effects) => (
                WebhookEventRecord::success(&event.id, &event.event_type, payload_of(event)?),
                WebhookResult::Processed { effects },
            ),
            Err(WebhookError::Ignored(reason)) => (
                WebhookEventRecord::ignored(
                    &event.id,
                    &event.event_type,
                    reason.clone(),
                    payload_of(event)?,
                ),
                WebhookResult::Ignored { reason },
            ),
            Err(e) => return Err(e),
        };

        if !tracked {
            return Ok(result);
        }

        match self.ledger.save(record).await? {
            SaveResult::Inserted => Ok(result),
            SaveResult::AlreadyExists => Ok(WebhookResult::AlreadyProcessed),
        }
    }
}

fn payload_of(event: &StripeEvent) -> Result<serde_json::Value, WebhookError> {
    serde_json::to_value(event)
        .map_err(|e| WebhookError::ParseError(format!("Failed to serialize event: {}", e)))
}
