//! HandleBillingWebhookHandler - verifies, reconciles and then syncs listings.
//!
//! 1. Verify the signature over the raw body
//! 2. Run the idempotent processor under the delivery deadline
//! 3. Apply listing visibility changes after the billing write committed

use std::sync::Arc;
use std::time::Duration;

use super::reconcile_events::{
    CheckoutCompletedHandler, InvoicePaidHandler, InvoicePaymentFailedHandler,
    SubscriptionDeletedHandler, SubscriptionUpdatedHandler,
};
use crate::application::listing_sync::ListingVisibilityCoordinator;
use crate::application::plan_allocator::PlanCatalog;
use crate::domain::billing::{
    IdempotentWebhookProcessor, StripeWebhookVerifier, WebhookError, WebhookHandlerRegistry,
    WebhookResult,
};
use crate::ports::{SeatReservations, SubscriptionRepository, UserAccounts, WebhookEventRepository};

/// Command carrying one raw webhook delivery.
#[derive(Debug, Clone)]
pub struct HandleBillingWebhookCommand {
    /// Raw request body, exactly as signed.
    pub payload: Vec<u8>,
    /// `Stripe-Signature` header, if present.
    pub signature: Option<String>,
}

/// Ports the reconciliation handlers need.
#[derive(Clone)]
pub struct ReconciliationPorts {
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub users: Arc<dyn UserAccounts>,
    pub seats: Arc<dyn SeatReservations>,
    pub ledger: Arc<dyn WebhookEventRepository>,
}

/// Registry with one handler per reconciled event type.
pub fn reconciliation_registry(ports: &ReconciliationPorts, catalog: PlanCatalog) -> WebhookHandlerRegistry {
    WebhookHandlerRegistry::new()
        .register(CheckoutCompletedHandler::new(
            ports.subscriptions.clone(),
            ports.users.clone(),
            ports.seats.clone(),
            catalog,
        ))
        .register(InvoicePaidHandler::new(ports.subscriptions.clone()))
        .register(InvoicePaymentFailedHandler::new(ports.subscriptions.clone()))
        .register(SubscriptionDeletedHandler::new(ports.subscriptions.clone()))
        .register(SubscriptionUpdatedHandler::new(ports.subscriptions.clone()))
}

pub struct HandleBillingWebhookHandler {
    verifier: StripeWebhookVerifier,
    processor: IdempotentWebhookProcessor<WebhookHandlerRegistry>,
    listings: Arc<ListingVisibilityCoordinator>,
    deadline: Duration,
}

impl HandleBillingWebhookHandler {
    pub fn new(
        verifier: StripeWebhookVerifier,
        ports: ReconciliationPorts,
        catalog: PlanCatalog,
        listings: Arc<ListingVisibilityCoordinator>,
        deadline: Duration,
    ) -> Self {
        let registry = reconciliation_registry(&ports, catalog);
        Self {
            verifier,
            processor: IdempotentWebhookProcessor::new(ports.ledger, registry),
            listings,
            deadline,
        }
    }

    /// Handle one delivery.
    ///
    /// # Errors
    ///
    /// Authenticity failures before anything is read; `Database` and
    /// `Timeout` when local state was not durably updated.
    pub async fn handle(
        &self,
        cmd: HandleBillingWebhookCommand,
    ) -> Result<WebhookResult, WebhookError> {
        let signature = cmd.signature.as_deref().ok_or_else(|| {
            tracing::warn!(target: "security", "Webhook rejected: missing signature header");
            WebhookError::MissingSignature
        })?;

        let event = self
            .verifier
            .verify_and_parse(&cmd.payload, signature)
            .map_err(|e| {
                if e.is_authenticity_failure() {
                    tracing::warn!(target: "security", error = %e, "Webhook rejected");
                }
                e
            })?;

        let result = tokio::time::timeout(self.deadline, self.processor.process(&event))
            .await
            .map_err(|_| {
                tracing::error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    deadline_secs = self.deadline.as_secs(),
                    "Webhook processing exceeded deadline"
                );
                WebhookError::Timeout(self.deadline.as_secs())
            })?
            .map_err(|e| {
                if e.is_retryable() {
                    tracing::error!(
                        event_id = %event.id,
                        event_type = %event.event_type,
                        error = %e,
                        "Webhook processing failed"
                    );
                }
                e
            })?;

        match &result {
            WebhookResult::Processed { effects } => {
                tracing::info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    effects = effects.len(),
                    "Webhook processed"
                );
                self.listings.apply_all(effects).await;
            }
            WebhookResult::Ignored { reason } => tracing::debug!(
                event_id = %event.id,
                event_type = %event.event_type,
                reason = %reason,
                "Webhook ignored"
            ),
            WebhookResult::AlreadyProcessed => tracing::debug!(
                event_id = %event.id,
                "Webhook already processed"
            ),
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryListingDirectory, InMemorySeatReservations, InMemorySubscriptionRepository,
        InMemoryUserAccounts, InMemoryWebhookEventRepository,
    };
    use crate::application::plan_allocator::test_support::catalog;
    use crate::domain::billing::generate_test_header;
    use crate::domain::foundation::{SpaceId, UserId};
    use crate::domain::listing::{Listing, ListingVisibility};
    use crate::domain::subscription::SubscriptionStatus;
    use secrecy::SecretString;
    use serde_json::json;

    const SECRET: &str = "whsec_test_secret";

    struct Fixture {
        handler: HandleBillingWebhookHandler,
        repo: Arc<InMemorySubscriptionRepository>,
        listings: Arc<InMemoryListingDirectory>,
        ledger: Arc<InMemoryWebhookEventRepository>,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemorySubscriptionRepository::new());
        let listings = Arc::new(InMemoryListingDirectory::new());
        let ledger = Arc::new(InMemoryWebhookEventRepository::new());
        let ports = ReconciliationPorts {
            subscriptions: repo.clone(),
            users: Arc::new(InMemoryUserAccounts::new()),
            seats: Arc::new(InMemorySeatReservations::new(repo.clone())),
            ledger: ledger.clone(),
        };
        let handler = HandleBillingWebhookHandler::new(
            StripeWebhookVerifier::new(SecretString::new(SECRET.to_string())),
            ports,
            catalog(10),
            Arc::new(ListingVisibilityCoordinator::new(listings.clone())),
            Duration::from_secs(5),
        );
        Fixture {
            handler,
            repo,
            listings,
            ledger,
        }
    }

    fn signed(payload: &serde_json::Value) -> HandleBillingWebhookCommand {
        let body = serde_json::to_vec(payload).unwrap();
        let header = generate_test_header(SECRET, chrono::Utc::now().timestamp(), &body);
        HandleBillingWebhookCommand {
            payload: body,
            signature: Some(header),
        }
    }

    fn checkout_payload(event_id: &str, space_id: SpaceId) -> serde_json::Value {
        json!({
            "id": event_id,
            "type": "checkout.session.completed",
            "data": {"object": {
                "id": "cs_1",
                "customer": "cus_1",
                "subscription": "sub_1",
                "mode": "subscription",
                "amount_total": 2900,
                "metadata": {
                    "user_id": "host-1",
                    "space_id": space_id.to_string(),
                    "plan_type": "normal"
                }
            }}
        })
    }

    async fn pending_listing(listings: &InMemoryListingDirectory) -> SpaceId {
        let id = SpaceId::new();
        listings
            .insert(Listing {
                id,
                owner_id: UserId::new("host-1").unwrap(),
                visibility: ListingVisibility::Pending,
            })
            .await;
        id
    }

    #[tokio::test]
    async fn checkout_webhook_creates_subscription_then_activates_listing() {
        let fx = fixture();
        let space = pending_listing(&fx.listings).await;

        let result = fx
            .handler
            .handle(signed(&checkout_payload("evt_1", space)))
            .await
            .unwrap();

        assert!(matches!(result, WebhookResult::Processed { .. }));
        assert_eq!(
            fx.repo.snapshot().await[0].status,
            SubscriptionStatus::Active
        );
        assert_eq!(
            fx.listings.visibility_of(&space).await,
            Some(ListingVisibility::Active)
        );
    }

    #[tokio::test]
    async fn redelivery_is_reported_as_already_processed() {
        let fx = fixture();
        let space = pending_listing(&fx.listings).await;

        fx.handler
            .handle(signed(&checkout_payload("evt_1", space)))
            .await
            .unwrap();
        let second = fx
            .handler
            .handle(signed(&checkout_payload("evt_1", space)))
            .await
            .unwrap();

        assert_eq!(second, WebhookResult::AlreadyProcessed);
        assert_eq!(fx.repo.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn listing_failure_does_not_fail_the_webhook() {
        let fx = fixture();
        let space = pending_listing(&fx.listings).await;
        fx.listings.fail_updates(true);

        let result = fx
            .handler
            .handle(signed(&checkout_payload("evt_1", space)))
            .await;

        assert!(result.is_ok());
        assert_eq!(fx.repo.snapshot().await.len(), 1);
        assert_eq!(fx.ledger.len().await, 1);
    }

    #[tokio::test]
    async fn missing_signature_is_rejected() {
        let fx = fixture();
        let mut cmd = signed(&checkout_payload("evt_1", SpaceId::new()));
        cmd.signature = None;

        let err = fx.handler.handle(cmd).await.unwrap_err();

        assert!(matches!(err, WebhookError::MissingSignature));
        assert_eq!(fx.ledger.len().await, 0);
    }

    #[tokio::test]
    async fn tampered_body_is_rejected_before_processing() {
        let fx = fixture();
        let mut cmd = signed(&checkout_payload("evt_1", SpaceId::new()));
        cmd.payload = serde_json::to_vec(&checkout_payload("evt_2", SpaceId::new())).unwrap();

        let err = fx.handler.handle(cmd).await.unwrap_err();

        assert!(matches!(err, WebhookError::InvalidSignature));
        assert!(fx.repo.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_event_type_is_ignored() {
        let fx = fixture();
        let payload = json!({
            "id": "evt_9",
            "type": "customer.created",
            "data": {"object": {"id": "cus_1"}}
        });

        let result = fx.handler.handle(signed(&payload)).await.unwrap();

        assert!(matches!(result, WebhookResult::Ignored { .. }));
    }

    #[tokio::test]
    async fn missing_metadata_is_not_recorded_so_it_can_be_retried() {
        let fx = fixture();
        let payload = json!({
            "id": "evt_3",
            "type": "checkout.session.completed",
            "data": {"object": {"id": "cs_3", "mode": "payment", "metadata": {}}}
        });

        let err = fx.handler.handle(signed(&payload)).await.unwrap_err();

        assert!(matches!(err, WebhookError::MissingMetadata("user_id")));
        assert_eq!(fx.ledger.len().await, 0);
    }
}
