//! Integration tests for MRR and churn reporting.
//!
//! Subscriptions are seeded into the in-memory repository with backdated
//! timestamps, then read through the admin metrics query.

use std::sync::Arc;

use space_billing::adapters::memory::InMemorySubscriptionRepository;
use space_billing::application::handlers::subscription::{
    GetBillingMetricsHandler, GetBillingMetricsQuery,
};
use space_billing::domain::foundation::{SpaceId, Timestamp, UserId};
use space_billing::domain::subscription::{Plan, Subscription, SubscriptionStatus};

// =============================================================================
// Test Infrastructure
// =============================================================================

fn subscription(price_cents: i64, created_days_ago: i64) -> Subscription {
    let mut s = Subscription::new_active(
        UserId::new("host-analytics").unwrap(),
        Some(SpaceId::new()),
        Plan::normal(),
        price_cents,
    )
    .unwrap();
    s.created_at = Timestamp::now().minus_days(created_days_ago);
    s.updated_at = s.created_at;
    s
}

fn cancelled(price_cents: i64, created_days_ago: i64, cancelled_days_ago: i64) -> Subscription {
    let mut s = subscription(price_cents, created_days_ago);
    s.status = SubscriptionStatus::Cancelled;
    s.cancelled_at = Some(Timestamp::now().minus_days(cancelled_days_ago));
    s.updated_at = Timestamp::now().minus_days(cancelled_days_ago);
    s
}

fn with_status(mut s: Subscription, status: SubscriptionStatus) -> Subscription {
    s.status = status;
    s
}

fn handler(subscriptions: Vec<Subscription>) -> GetBillingMetricsHandler {
    GetBillingMetricsHandler::new(Arc::new(
        InMemorySubscriptionRepository::with_subscriptions(subscriptions),
    ))
}

fn admin(window_days: Option<i64>) -> GetBillingMetricsQuery {
    GetBillingMetricsQuery {
        is_admin: true,
        window_days,
    }
}

fn approx(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() < 1e-9
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn thirty_day_window_reports_mrr_and_churn() {
    let metrics = handler(vec![
        subscription(50, 40),
        subscription(100, 10),
        cancelled(50, 40, 10),
    ])
    .handle(admin(None))
    .await
    .unwrap();

    assert_eq!(metrics.window_days, 30);
    assert_eq!(metrics.mrr_cents, 150);
    assert_eq!(metrics.new_mrr_cents, 100);
    assert_eq!(metrics.churned_mrr_cents, 50);
    assert!(approx(metrics.customer_churn_rate, 0.5));
    assert!(approx(metrics.revenue_churn_rate, 0.5));
}

#[tokio::test]
async fn wider_window_counts_older_signups_as_new() {
    let metrics = handler(vec![
        subscription(50, 40),
        subscription(100, 10),
        cancelled(50, 40, 10),
    ])
    .handle(admin(Some(60)))
    .await
    .unwrap();

    assert_eq!(metrics.new_count, 2);
    assert_eq!(metrics.new_mrr_cents, 150);
    // active 2 + churned 1 - new 2
    assert!(approx(metrics.customer_churn_rate, 1.0));
}

#[tokio::test]
async fn only_active_subscriptions_earn_revenue() {
    let metrics = handler(vec![
        with_status(subscription(2_900, 5), SubscriptionStatus::Trial),
        with_status(subscription(2_900, 50), SubscriptionStatus::Suspended),
        subscription(1_900, 50),
    ])
    .handle(admin(None))
    .await
    .unwrap();

    assert_eq!(metrics.mrr_cents, 1_900);
    assert_eq!(metrics.by_status.trial, 1);
    assert_eq!(metrics.by_status.suspended, 1);
    assert_eq!(metrics.by_status.active, 1);
}

#[tokio::test]
async fn empty_marketplace_reports_zeros() {
    let metrics = handler(Vec::new()).handle(admin(None)).await.unwrap();

    assert_eq!(metrics.mrr_cents, 0);
    assert_eq!(metrics.active_count, 0);
    assert_eq!(metrics.customer_churn_rate, 0.0);
    assert_eq!(metrics.revenue_churn_rate, 0.0);
}

#[tokio::test]
async fn metrics_are_admin_only() {
    let result = handler(vec![subscription(50, 1)])
        .handle(GetBillingMetricsQuery {
            is_admin: false,
            window_days: None,
        })
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn window_outside_supported_range_is_rejected() {
    let h = handler(Vec::new());

    assert!(h.handle(admin(Some(0))).await.is_err());
    assert!(h.handle(admin(Some(366))).await.is_err());
    assert!(h.handle(admin(Some(365))).await.is_ok());
}
