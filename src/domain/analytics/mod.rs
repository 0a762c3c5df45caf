//! Billing analytics computed on demand from the subscription table.
//!
//! There are no historical snapshots, so the subscriber count at the start
//! of the window is reconstructed as `active + churned - new`. The churn
//! rates are approximations by construction: plan changes and
//! reactivations inside the window are not visible to the reconstruction.

use serde::Serialize;

use crate::domain::foundation::Timestamp;
use crate::domain::subscription::{Subscription, SubscriptionStatus};

/// Default trailing window for "new" and "churned" figures.
pub const DEFAULT_WINDOW_DAYS: i64 = 30;

/// Count of subscriptions by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub trial: u64,
    pub active: u64,
    pub suspended: u64,
    pub cancelled: u64,
}

impl StatusCounts {
    fn record(&mut self, status: SubscriptionStatus) {
        match status {
            SubscriptionStatus::Trial => self.trial += 1,
            SubscriptionStatus::Active => self.active += 1,
            SubscriptionStatus::Suspended => self.suspended += 1,
            SubscriptionStatus::Cancelled => self.cancelled += 1,
        }
    }
}

/// MRR and churn over a trailing window ending at `computed_at`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillingMetrics {
    pub window_days: i64,
    pub window_start: Timestamp,
    pub computed_at: Timestamp,

    /// Sum of prices over active subscriptions.
    pub mrr_cents: i64,
    /// Sum of prices over active subscriptions created in the window.
    pub new_mrr_cents: i64,
    /// Sum of prices over subscriptions that churned in the window.
    pub churned_mrr_cents: i64,

    pub active_count: u64,
    pub new_count: u64,
    pub churned_count: u64,

    /// Fraction in `[0, 1]` (can exceed 1 when the reconstruction undercounts).
    pub customer_churn_rate: f64,
    pub revenue_churn_rate: f64,

    pub by_status: StatusCounts,
}

impl BillingMetrics {
    /// Computes metrics for `subscriptions` as seen at `now`.
    pub fn compute(subscriptions: &[Subscription], now: Timestamp, window_days: i64) -> Self {
        let window_start = now.minus_days(window_days);
        let in_window = |t: &Timestamp| !t.is_before(&window_start) && !t.is_after(&now);

        let mut metrics = BillingMetrics {
            window_days,
            window_start,
            computed_at: now,
            mrr_cents: 0,
            new_mrr_cents: 0,
            churned_mrr_cents: 0,
            active_count: 0,
            new_count: 0,
            churned_count: 0,
            customer_churn_rate: 0.0,
            revenue_churn_rate: 0.0,
            by_status: StatusCounts::default(),
        };

        for sub in subscriptions {
            metrics.by_status.record(sub.status);

            if sub.status == SubscriptionStatus::Active {
                metrics.active_count += 1;
                metrics.mrr_cents += sub.price_cents;

                if in_window(&sub.created_at) {
                    metrics.new_count += 1;
                    metrics.new_mrr_cents += sub.price_cents;
                }
            }

            if churned_at(sub).is_some_and(|t| in_window(&t)) {
                metrics.churned_count += 1;
                metrics.churned_mrr_cents += sub.price_cents;
            }
        }

        let starting_customers =
            metrics.active_count as i64 + metrics.churned_count as i64 - metrics.new_count as i64;
        metrics.customer_churn_rate = ratio(metrics.churned_count as i64, starting_customers);

        let starting_mrr = metrics.mrr_cents + metrics.churned_mrr_cents - metrics.new_mrr_cents;
        metrics.revenue_churn_rate = ratio(metrics.churned_mrr_cents, starting_mrr);

        metrics
    }
}

/// When a subscription counts as churned, if it does.
///
/// Cancelled records use `cancelled_at`; records flagged to cancel at period
/// end use the time the flag was last written.
fn churned_at(sub: &Subscription) -> Option<Timestamp> {
    match sub.status {
        SubscriptionStatus::Cancelled => Some(sub.cancelled_at.unwrap_or(sub.updated_at)),
        _ if sub.cancel_at_period_end => Some(sub.updated_at),
        _ => None,
    }
}

fn ratio(numerator: i64, denominator: i64) -> f64 {
    if denominator <= 0 {
        return 0.0;
    }
    numerator as f64 / denominator as f64
}
