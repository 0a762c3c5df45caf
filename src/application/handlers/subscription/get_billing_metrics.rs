//! GetBillingMetricsHandler - Admin query for MRR and churn.

use std::sync::Arc;

use crate::domain::analytics::{BillingMetrics, DEFAULT_WINDOW_DAYS};
use crate::domain::foundation::Timestamp;
use crate::domain::subscription::SubscriptionError;
use crate::ports::SubscriptionRepository;

/// Longest window the endpoint accepts.
pub const MAX_WINDOW_DAYS: i64 = 365;

#[derive(Debug, Clone)]
pub struct GetBillingMetricsQuery {
    pub is_admin: bool,
    pub window_days: Option<i64>,
}

pub struct GetBillingMetricsHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
}

impl GetBillingMetricsHandler {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>) -> Self {
        Self { subscriptions }
    }

    pub async fn handle(
        &self,
        query: GetBillingMetricsQuery,
    ) -> Result<BillingMetrics, SubscriptionError> {
        if !query.is_admin {
            return Err(SubscriptionError::forbidden("Billing metrics are admin only"));
        }

        let window_days = query.window_days.unwrap_or(DEFAULT_WINDOW_DAYS);
        if !(1..=MAX_WINDOW_DAYS).contains(&window_days) {
            return Err(SubscriptionError::validation(
                "window_days",
                format!("Window must be between 1 and {} days", MAX_WINDOW_DAYS),
            ));
        }

        let subscriptions = self.subscriptions.list_all().await?;
        Ok(BillingMetrics::compute(
            &subscriptions,
            Timestamp::now(),
            window_days,
        ))
    }
}
