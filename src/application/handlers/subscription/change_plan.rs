//! ChangePlanHandler - Command handler for plan and price changes.

use std::sync::Arc;

use crate::domain::foundation::{DomainError, OwnedByUser, SubscriptionId, UserId};
use crate::domain::subscription::{Subscription, SubscriptionError};
use crate::ports::SubscriptionRepository;

/// Command to move a subscription to another plan.
#[derive(Debug, Clone)]
pub struct ChangePlanCommand {
    pub subscription_id: SubscriptionId,
    pub requested_by: UserId,
    pub is_admin: bool,
    pub plan: String,
    pub price_cents: i64,
}

#[derive(Debug, Clone)]
pub struct ChangePlanResult {
    pub subscription: Subscription,
}

pub struct ChangePlanHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
}

impl ChangePlanHandler {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>) -> Self {
        Self { subscriptions }
    }

    pub async fn handle(
        &self,
        cmd: ChangePlanCommand,
    ) -> Result<ChangePlanResult, SubscriptionError> {
        let requested_by = cmd.requested_by.clone();
        let is_admin = cmd.is_admin;
        let mutation = |s: &mut Subscription| -> Result<bool, DomainError> {
            if !is_admin {
                s.check_ownership(&requested_by)?;
            }
            s.change_plan(cmd.plan.clone(), cmd.price_cents)?;
            Ok(true)
        };

        let modified = self
            .subscriptions
            .modify_by_id(&cmd.subscription_id, &mutation)
            .await?
            .ok_or_else(|| SubscriptionError::not_found(cmd.subscription_id))?;

        tracing::info!(
            subscription_id = %cmd.subscription_id,
            plan = %modified.subscription.plan,
            price_cents = modified.subscription.price_cents,
            "Subscription plan changed"
        );

        Ok(ChangePlanResult {
            subscription: modified.subscription,
        })
    }
}
