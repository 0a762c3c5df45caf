//! Integration tests for webhook-driven reconciliation.
//!
//! These tests drive the full path through the HTTP router:
//! 1. A signed provider event arrives at `/api/webhooks/stripe`
//! 2. The ledger deduplicates it by event id
//! 3. The matching reconciler mutates the subscription record
//! 4. The listing's visibility follows the subscription status
//!
//! Uses in-memory adapters and the mock payment provider.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use futures::future::join_all;
use secrecy::SecretString;
use serde_json::{json, Value};
use tower::ServiceExt;

use space_billing::adapters::http::billing::{
    billing_router, BillingAppState, BillingPorts, BillingSettings,
};
use space_billing::adapters::memory::{
    InMemoryListingDirectory, InMemorySeatReservations, InMemorySubscriptionRepository,
    InMemoryUserAccounts, InMemoryWebhookEventRepository,
};
use space_billing::adapters::stripe::MockPaymentProvider;
use space_billing::application::handlers::subscription::CheckoutUrls;
use space_billing::application::{PlanCatalog, PlanOffer};
use space_billing::domain::billing::{generate_test_header, StripeWebhookVerifier};
use space_billing::domain::foundation::{SpaceId, UserId};
use space_billing::domain::listing::{Listing, ListingVisibility};
use space_billing::domain::subscription::{Plan, SubscriptionStatus};

const SECRET: &str = "whsec_integration";
const HOST: &str = "host-42";

// =============================================================================
// Test Infrastructure
// =============================================================================

struct Harness {
    router: Router,
    subscriptions: Arc<InMemorySubscriptionRepository>,
    listings: Arc<InMemoryListingDirectory>,
    ledger: Arc<InMemoryWebhookEventRepository>,
}

fn catalog() -> PlanCatalog {
    PlanCatalog {
        founder: PlanOffer {
            plan: Plan::founder(),
            price_cents: 1_900,
            price_id: "price_founder".to_string(),
        },
        normal: PlanOffer {
            plan: Plan::normal(),
            price_cents: 2_900,
            price_id: "price_normal".to_string(),
        },
        activation: PlanOffer {
            plan: Plan::activation(),
            price_cents: 4_900,
            price_id: "price_activation".to_string(),
        },
        founder_max_seats: 10,
        seat_hold_minutes: 60,
    }
}

fn harness() -> Harness {
    harness_with_deadline(Duration::from_secs(5))
}

fn harness_with_deadline(webhook_deadline: Duration) -> Harness {
    let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
    let listings = Arc::new(InMemoryListingDirectory::new());
    let ledger = Arc::new(InMemoryWebhookEventRepository::new());

    let ports = BillingPorts {
        subscriptions: subscriptions.clone(),
        listings: listings.clone(),
        users: Arc::new(InMemoryUserAccounts::new()),
        seats: Arc::new(InMemorySeatReservations::new(subscriptions.clone())),
        ledger: ledger.clone(),
        payment_provider: Arc::new(MockPaymentProvider::new()),
    };
    let settings = BillingSettings {
        catalog: catalog(),
        urls: CheckoutUrls {
            success_url: "https://app.test/billing/success".to_string(),
            cancel_url: "https://app.test/billing/cancel".to_string(),
        },
        trial_days: 14,
        webhook_deadline,
    };
    let state = BillingAppState::new(
        ports,
        StripeWebhookVerifier::new(SecretString::new(SECRET.to_string())),
        settings,
    );

    Harness {
        router: Router::new().nest("/api", billing_router()).with_state(state),
        subscriptions,
        listings,
        ledger,
    }
}

impl Harness {
    async fn pending_listing(&self) -> SpaceId {
        let id = SpaceId::new();
        self.listings
            .insert(Listing {
                id,
                owner_id: UserId::new(HOST).unwrap(),
                visibility: ListingVisibility::Pending,
            })
            .await;
        id
    }

    async fn deliver(&self, event: &Value) -> (StatusCode, Value) {
        self.deliver_signed(event, SECRET).await
    }

    async fn deliver_signed(&self, event: &Value, secret: &str) -> (StatusCode, Value) {
        post_webhook(self.router.clone(), event, secret).await
    }

    async fn start_trial(&self, space_id: SpaceId) -> StatusCode {
        let request = Request::builder()
            .method("POST")
            .uri("/api/billing/trial")
            .header("Content-Type", "application/json")
            .header("X-User-Id", HOST)
            .body(Body::from(json!({"space_id": space_id.to_string()}).to_string()))
            .unwrap();

        self.router.clone().oneshot(request).await.unwrap().status()
    }

    async fn status_of(&self, external_id: &str) -> Option<SubscriptionStatus> {
        self.subscriptions
            .snapshot()
            .await
            .into_iter()
            .find(|s| s.external_subscription_id.as_deref() == Some(external_id))
            .map(|s| s.status)
    }
}

async fn post_webhook(router: Router, event: &Value, secret: &str) -> (StatusCode, Value) {
    let body = event.to_string();
    let header = generate_test_header(secret, chrono::Utc::now().timestamp(), body.as_bytes());
    let request = Request::builder()
        .method("POST")
        .uri("/api/webhooks/stripe")
        .header("Content-Type", "application/json")
        .header("Stripe-Signature", header)
        .body(Body::from(body))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

/// Delivers the same checkout under `copies` distinct event ids at once.
async fn deliver_concurrently(h: &Harness, space: SpaceId, copies: usize) -> Vec<StatusCode> {
    let deliveries = (0..copies).map(|n| {
        let router = h.router.clone();
        let event = checkout_completed(&format!("evt_race_{}", n), space);
        tokio::spawn(async move { post_webhook(router, &event, SECRET).await.0 })
    });

    join_all(deliveries)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect()
}

fn checkout_completed(event_id: &str, space_id: SpaceId) -> Value {
    json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "data": {"object": {
            "id": "cs_int_1",
            "customer": "cus_int_1",
            "subscription": "sub_int_1",
            "mode": "subscription",
            "amount_total": 2900,
            "metadata": {
                "user_id": HOST,
                "space_id": space_id.to_string(),
                "plan_type": "normal"
            }
        }}
    })
}

fn invoice(event_id: &str, event_type: &str, period_end: i64) -> Value {
    json!({
        "id": event_id,
        "type": event_type,
        "data": {"object": {
            "id": format!("in_{}", event_id),
            "customer": "cus_int_1",
            "subscription": "sub_int_1",
            "lines": {"data": [{"period": {"start": period_end - 2_592_000, "end": period_end}}]}
        }}
    })
}

fn subscription_deleted(event_id: &str, external_id: &str) -> Value {
    json!({
        "id": event_id,
        "type": "customer.subscription.deleted",
        "data": {"object": {
            "id": external_id,
            "customer": "cus_int_1",
            "status": "canceled",
            "cancel_at_period_end": false
        }}
    })
}

fn next_month() -> i64 {
    chrono::Utc::now().timestamp() + 30 * 86_400
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn full_lifecycle_follows_provider_events() {
    let h = harness();
    let space = h.pending_listing().await;

    let (status, body) = h.deliver(&checkout_completed("evt_1", space)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "processed");
    assert_eq!(h.status_of("sub_int_1").await, Some(SubscriptionStatus::Active));
    assert_eq!(h.listings.visibility_of(&space).await, Some(ListingVisibility::Active));

    let (status, _) = h
        .deliver(&invoice("evt_2", "invoice.payment_failed", next_month()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.status_of("sub_int_1").await, Some(SubscriptionStatus::Suspended));
    assert_eq!(h.listings.visibility_of(&space).await, Some(ListingVisibility::Suspended));

    let (status, _) = h.deliver(&invoice("evt_3", "invoice.paid", next_month())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.status_of("sub_int_1").await, Some(SubscriptionStatus::Active));
    assert_eq!(h.listings.visibility_of(&space).await, Some(ListingVisibility::Active));

    let (status, _) = h.deliver(&subscription_deleted("evt_4", "sub_int_1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.status_of("sub_int_1").await, Some(SubscriptionStatus::Cancelled));
    assert_eq!(h.listings.visibility_of(&space).await, Some(ListingVisibility::Suspended));

    assert_eq!(h.ledger.len().await, 4);
}

#[tokio::test]
async fn replayed_event_is_acknowledged_once() {
    let h = harness();
    let space = h.pending_listing().await;
    let event = checkout_completed("evt_replay", space);

    let (first, first_body) = h.deliver(&event).await;
    let (second, second_body) = h.deliver(&event).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(first_body["outcome"], "processed");
    assert_eq!(second, StatusCode::OK);
    assert_eq!(second_body["outcome"], "duplicate");
    assert_eq!(h.subscriptions.snapshot().await.len(), 1);
}

#[tokio::test]
async fn same_checkout_under_new_event_id_creates_no_second_record() {
    let h = harness();
    let space = h.pending_listing().await;

    h.deliver(&checkout_completed("evt_a", space)).await;
    let (status, _) = h.deliver(&checkout_completed("evt_b", space)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.subscriptions.snapshot().await.len(), 1);
}

#[tokio::test]
async fn invoice_for_unknown_subscription_is_ignored() {
    let h = harness();

    let (status, body) = h.deliver(&invoice("evt_orphan", "invoice.paid", next_month())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "ignored");
    assert!(h.subscriptions.snapshot().await.is_empty());
}

#[tokio::test]
async fn cancelled_subscription_is_not_reopened_by_late_invoice() {
    let h = harness();
    let space = h.pending_listing().await;

    h.deliver(&checkout_completed("evt_1", space)).await;
    h.deliver(&subscription_deleted("evt_2", "sub_int_1")).await;
    let (status, body) = h.deliver(&invoice("evt_3", "invoice.paid", next_month())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "ignored");
    assert_eq!(h.status_of("sub_int_1").await, Some(SubscriptionStatus::Cancelled));
    assert_eq!(h.listings.visibility_of(&space).await, Some(ListingVisibility::Suspended));
}

#[tokio::test]
async fn unhandled_event_type_is_acknowledged() {
    let h = harness();

    let (status, body) = h
        .deliver(&json!({
            "id": "evt_other",
            "type": "customer.created",
            "data": {"object": {"id": "cus_1"}}
        }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
}

#[tokio::test]
async fn bad_signature_changes_nothing() {
    let h = harness();
    let space = h.pending_listing().await;

    let (status, _) = h
        .deliver_signed(&checkout_completed("evt_forged", space), "whsec_attacker")
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(h.subscriptions.snapshot().await.is_empty());
    assert_eq!(h.listings.visibility_of(&space).await, Some(ListingVisibility::Pending));
    assert_eq!(h.ledger.len().await, 0);
}

#[tokio::test]
async fn checkout_after_trial_converts_the_trial() {
    let h = harness();
    let space = h.pending_listing().await;

    assert_eq!(h.start_trial(space).await, StatusCode::CREATED);
    let trial = h.subscriptions.snapshot().await[0].clone();
    assert_eq!(trial.status, SubscriptionStatus::Trial);

    let (status, body) = h.deliver(&checkout_completed("evt_paid", space)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "processed");
    let stored = h.subscriptions.snapshot().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, trial.id);
    assert_eq!(stored[0].status, SubscriptionStatus::Active);
    assert_eq!(stored[0].checkout_session_id.as_deref(), Some("cs_int_1"));
    assert_eq!(stored[0].external_subscription_id.as_deref(), Some("sub_int_1"));
    assert_eq!(stored[0].price_cents, 2_900);
    assert_eq!(h.listings.visibility_of(&space).await, Some(ListingVisibility::Active));

    // Later invoices find the converted record by its provider id.
    h.deliver(&invoice("evt_fail", "invoice.payment_failed", next_month())).await;
    assert_eq!(h.status_of("sub_int_1").await, Some(SubscriptionStatus::Suspended));
}

#[tokio::test]
async fn failed_write_is_not_acknowledged() {
    let h = harness();
    let space = h.pending_listing().await;
    h.subscriptions.fail_writes(true);

    let (status, _) = h.deliver(&checkout_completed("evt_1", space)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(h.ledger.len().await, 0);
    assert!(h.subscriptions.snapshot().await.is_empty());
    assert_eq!(h.listings.visibility_of(&space).await, Some(ListingVisibility::Pending));

    // The provider's retry goes through once the store recovers.
    h.subscriptions.fail_writes(false);
    let (status, body) = h.deliver(&checkout_completed("evt_1", space)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "processed");
    assert_eq!(h.ledger.len().await, 1);
}

#[tokio::test]
async fn failed_invoice_write_leaves_status_and_ledger_alone() {
    let h = harness();
    let space = h.pending_listing().await;
    h.deliver(&checkout_completed("evt_1", space)).await;
    h.subscriptions.fail_writes(true);

    let (status, _) = h
        .deliver(&invoice("evt_2", "invoice.payment_failed", next_month()))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(h.ledger.len().await, 1);
    assert_eq!(h.status_of("sub_int_1").await, Some(SubscriptionStatus::Active));
    assert_eq!(h.listings.visibility_of(&space).await, Some(ListingVisibility::Active));
}

#[tokio::test]
async fn slow_store_past_deadline_answers_unavailable() {
    let h = harness_with_deadline(Duration::from_millis(50));
    let space = h.pending_listing().await;
    h.subscriptions.stall_for(Duration::from_millis(500));

    let (status, _) = h.deliver(&checkout_completed("evt_slow", space)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(h.ledger.len().await, 0);
    assert!(h.subscriptions.snapshot().await.is_empty());
    assert_eq!(h.listings.visibility_of(&space).await, Some(ListingVisibility::Pending));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_copies_of_one_checkout_create_one_record() {
    let h = harness();
    let space = h.pending_listing().await;

    let statuses = deliver_concurrently(&h, space, 8).await;

    assert!(statuses.iter().all(|s| *s == StatusCode::OK));
    assert_eq!(h.subscriptions.snapshot().await.len(), 1);
    assert_eq!(h.status_of("sub_int_1").await, Some(SubscriptionStatus::Active));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_copies_of_one_checkout_convert_the_trial_once() {
    let h = harness();
    let space = h.pending_listing().await;
    assert_eq!(h.start_trial(space).await, StatusCode::CREATED);
    let trial_id = h.subscriptions.snapshot().await[0].id;

    let statuses = deliver_concurrently(&h, space, 8).await;

    assert!(statuses.iter().all(|s| *s == StatusCode::OK));
    let stored = h.subscriptions.snapshot().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, trial_id);
    assert_eq!(stored[0].status, SubscriptionStatus::Active);
}
