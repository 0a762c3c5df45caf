//! Subscription queries.

use std::sync::Arc;

use crate::application::trial_expiry::TrialExpiry;
use crate::domain::foundation::{OwnedByUser, SubscriptionId, UserId};
use crate::domain::subscription::{Subscription, SubscriptionError};
use crate::ports::SubscriptionRepository;

/// The requester's own subscriptions, newest first. Lapsed trials are
/// settled before they are returned.
#[derive(Debug, Clone)]
pub struct GetSubscriptionsQuery {
    pub user_id: UserId,
}

pub struct GetSubscriptionsHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    trials: Arc<TrialExpiry>,
}

impl GetSubscriptionsHandler {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>, trials: Arc<TrialExpiry>) -> Self {
        Self {
            subscriptions,
            trials,
        }
    }

    pub async fn handle(
        &self,
        query: GetSubscriptionsQuery,
    ) -> Result<Vec<Subscription>, SubscriptionError> {
        let found = self.subscriptions.find_by_user(&query.user_id).await?;
        let mut subscriptions = self.trials.settle_all(found).await?;
        subscriptions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(subscriptions)
    }
}

/// One subscription by id, for its owner or an admin.
#[derive(Debug, Clone)]
pub struct GetSubscriptionQuery {
    pub subscription_id: SubscriptionId,
    pub requested_by: UserId,
    pub is_admin: bool,
}

pub struct GetSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    trials: Arc<TrialExpiry>,
}

impl GetSubscriptionHandler {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>, trials: Arc<TrialExpiry>) -> Self {
        Self {
            subscriptions,
            trials,
        }
    }

    pub async fn handle(
        &self,
        query: GetSubscriptionQuery,
    ) -> Result<Subscription, SubscriptionError> {
        let subscription = self
            .subscriptions
            .find_by_id(&query.subscription_id)
            .await?
            .ok_or_else(|| SubscriptionError::not_found(query.subscription_id))?;

        if !query.is_admin {
            subscription.check_ownership(&query.requested_by)?;
        }
        Ok(self.trials.settle(subscription).await?)
    }
}
