//! WebhookEventRepository port - ledger of handled Stripe events.
//!
//! Stripe may deliver the same event more than once (timeouts, 5xx from
//! our endpoint, lost acknowledgements). The ledger lets the processor
//! answer exact redeliveries without re-running handlers. Only events that
//! were handled or deliberately ignored are recorded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::foundation::DomainError;

/// Record of a handled webhook event.
#[derive(Debug, Clone)]
pub struct WebhookEventRecord {
    /// Stripe event ID (`evt_...`).
    pub event_id: String,

    /// Type tag (e.g. `checkout.session.completed`).
    pub event_type: String,

    pub processed_at: DateTime<Utc>,

    /// `success` or `ignored`.
    pub result: String,

    /// Why the event was ignored.
    pub reason: Option<String>,

    /// Original event for auditing.
    pub payload: serde_json::Value,
}

impl WebhookEventRecord {
    pub fn success(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            processed_at: Utc::now(),
            result: "success".to_string(),
            reason: None,
            payload,
        }
    }

    pub fn ignored(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        reason: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            processed_at: Utc::now(),
            result: "ignored".to_string(),
            reason: Some(reason.into()),
            payload,
        }
    }
}

/// Outcome of an insert guarded by a unique key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// Row was inserted.
    Inserted,
    /// A row with the same key already exists.
    AlreadyExists,
}

/// Port for the processed-event ledger.
///
/// Implementations key on `event_id` (PRIMARY KEY, `ON CONFLICT DO NOTHING`)
/// so concurrent deliveries resolve to a single winner.
#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    /// Returns `None` if the event hasn't been handled yet.
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError>;

    async fn save(&self, record: WebhookEventRecord) -> Result<SaveResult, DomainError>;

    /// Delete records processed before `timestamp`; returns the count deleted.
    async fn delete_before(&self, timestamp: DateTime<Utc>) -> Result<u64, DomainError>;
}
