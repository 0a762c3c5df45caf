//! Stripe webhook event types.
//!
//! Only the fields reconciliation reads are captured; everything else in
//! Stripe's payload is ignored.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::webhook_errors::WebhookError;

/// Stripe webhook event envelope.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEvent {
    /// Event identifier (`evt_...`). Empty when the sender omitted it.
    #[serde(default)]
    pub id: String,

    /// Type tag such as `checkout.session.completed`.
    #[serde(rename = "type")]
    pub event_type: String,

    /// Creation time (Unix seconds).
    #[serde(default)]
    pub created: i64,

    pub data: StripeEventData,

    #[serde(default)]
    pub livemode: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

/// Container for event-specific data.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEventData {
    /// The object that triggered the event (shape depends on the type).
    pub object: serde_json::Value,

    /// Previous values for updated attributes (update events only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_attributes: Option<serde_json::Value>,
}

impl StripeEvent {
    /// Parse the event type into a known variant.
    pub fn parsed_type(&self) -> StripeEventType {
        StripeEventType::parse(&self.event_type)
    }

    /// Deserialize `data.object` as `T`.
    pub fn object<T: serde::de::DeserializeOwned>(&self) -> Result<T, WebhookError> {
        serde_json::from_value(self.data.object.clone()).map_err(|e| {
            WebhookError::ParseError(format!("{} payload: {}", self.event_type, e))
        })
    }
}

/// Event types that drive reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StripeEventType {
    CheckoutSessionCompleted,
    /// `invoice.paid` or the older `invoice.payment_succeeded`.
    InvoicePaid,
    InvoicePaymentFailed,
    CustomerSubscriptionUpdated,
    CustomerSubscriptionDeleted,
    Unknown,
}

impl StripeEventType {
    pub fn parse(s: &str) -> Self {
        match s {
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            "invoice.paid" | "invoice.payment_succeeded" => Self::InvoicePaid,
            "invoice.payment_failed" => Self::InvoicePaymentFailed,
            "customer.subscription.updated" => Self::CustomerSubscriptionUpdated,
            "customer.subscription.deleted" => Self::CustomerSubscriptionDeleted,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckoutSessionCompleted => "checkout.session.completed",
            Self::InvoicePaid => "invoice.paid",
            Self::InvoicePaymentFailed => "invoice.payment_failed",
            Self::CustomerSubscriptionUpdated => "customer.subscription.updated",
            Self::CustomerSubscriptionDeleted => "customer.subscription.deleted",
            Self::Unknown => "unknown",
        }
    }
}

/// Checkout metadata keys written at session creation and read back on completion.
pub mod metadata {
    pub const USER_ID: &str = "user_id";
    pub const SPACE_ID: &str = "space_id";
    pub const PLAN_TYPE: &str = "plan_type";
    pub const COUPON_CODE: &str = "coupon_code";
}

// ════════════════════════════════════════════════════════════════════════════════
// Event objects
// ════════════════════════════════════════════════════════════════════════════════

/// `checkout.session` object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckoutSessionObject {
    /// Session identifier (`cs_...`).
    pub id: String,

    pub customer: Option<String>,

    /// Provider subscription created by a recurring checkout.
    pub subscription: Option<String>,

    /// `payment` or `subscription`.
    pub mode: Option<String>,

    /// Amount charged, in minor units, after discounts.
    pub amount_total: Option<i64>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSessionObject {
    /// Metadata value, treating blanks as absent.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// `invoice` object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InvoiceObject {
    pub id: String,
    pub customer: Option<String>,

    /// Absent for one-off invoices.
    pub subscription: Option<String>,

    /// Invoice-level period end (Unix seconds).
    pub period_end: Option<i64>,

    #[serde(default)]
    pub lines: InvoiceLines,
}

impl InvoiceObject {
    /// End of the service period this invoice pays for.
    ///
    /// Line item periods describe the subscription period; the invoice-level
    /// `period_end` is the fallback.
    pub fn service_period_end(&self) -> Option<i64> {
        self.lines
            .data
            .iter()
            .filter_map(|line| line.period.as_ref().map(|p| p.end))
            .max()
            .or(self.period_end)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InvoiceLines {
    #[serde(default)]
    pub data: Vec<InvoiceLine>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InvoiceLine {
    pub period: Option<InvoicePeriod>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct InvoicePeriod {
    pub start: i64,
    pub end: i64,
}

/// `subscription` object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubscriptionObject {
    /// Subscription identifier (`sub_...`).
    pub id: String,
    pub customer: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
}

/// Builder for creating test StripeEvent instances.
#[cfg(test)]
pub struct StripeEventBuilder {
    id: String,
    event_type: String,
    object: serde_json::Value,
}

#[cfg(test)]
impl StripeEventBuilder {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            id: format!("evt_{}", uuid::Uuid::new_v4().simple()),
            event_type: event_type.into(),
            object: serde_json::json!({}),
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn object(mut self, object: serde_json::Value) -> Self {
        self.object = object;
        self
    }

    pub fn build(self) -> StripeEvent {
        StripeEvent {
            id: self.id,
            event_type: self.event_type,
            created: chrono::Utc::now().timestamp(),
            data: StripeEventData {
                object: self.object,
                previous_attributes: None,
            },
            livemode: false,
            api_version: Some("2023-10-16".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimal_envelope_parses() {
        let event: StripeEvent = serde_json::from_str(
            r#"{"type":"invoice.paid","data":{"object":{"id":"in_1"}}}"#,
        )
        .unwrap();

        assert!(event.id.is_empty());
        assert_eq!(event.parsed_type(), StripeEventType::InvoicePaid);
    }

    #[test]
    fn both_invoice_success_names_map_to_paid() {
        assert_eq!(StripeEventType::parse("invoice.paid"), StripeEventType::InvoicePaid);
        assert_eq!(
            StripeEventType::parse("invoice.payment_succeeded"),
            StripeEventType::InvoicePaid
        );
    }

    #[test]
    fn unknown_types_are_unknown() {
        assert_eq!(
            StripeEventType::parse("customer.created"),
            StripeEventType::Unknown
        );
    }

    #[test]
    fn checkout_session_object_reads_metadata() {
        let event = StripeEventBuilder::new("checkout.session.completed")
            .object(json!({
                "id": "cs_test_1",
                "customer": "cus_1",
                "subscription": "sub_1",
                "mode": "subscription",
                "amount_total": 1900,
                "metadata": {"user_id": "host-1", "space_id": " ", "plan_type": "founder"}
            }))
            .build();

        let session: CheckoutSessionObject = event.object().unwrap();

        assert_eq!(session.metadata_value("user_id"), Some("host-1"));
        assert_eq!(session.metadata_value("space_id"), None);
        assert_eq!(session.amount_total, Some(1900));
    }

    #[test]
    fn invoice_prefers_line_period_end() {
        let invoice: InvoiceObject = serde_json::from_value(json!({
            "id": "in_1",
            "subscription": "sub_1",
            "period_end": 100,
            "lines": {"data": [
                {"period": {"start": 100, "end": 2_000}},
                {"period": null}
            ]}
        }))
        .unwrap();

        assert_eq!(invoice.service_period_end(), Some(2_000));
    }

    #[test]
    fn invoice_falls_back_to_invoice_period_end() {
        let invoice: InvoiceObject =
            serde_json::from_value(json!({"id": "in_1", "period_end": 500})).unwrap();
        assert_eq!(invoice.service_period_end(), Some(500));
    }

    #[test]
    fn wrong_object_shape_is_a_parse_error() {
        let event = StripeEventBuilder::new("invoice.paid")
            .object(json!({"no_id": true}))
            .build();

        let result: Result<InvoiceObject, _> = event.object();

        assert!(matches!(result, Err(WebhookError::ParseError(_))));
    }
}
