//! CancelSubscriptionHandler - Command handler for host-initiated cancellation.
//!
//! Subscriptions billed by the provider are set to cancel at period end; the
//! provider's `customer.subscription.deleted` later makes it final. Records
//! with no provider subscription, trials included, are cancelled locally at
//! once.

use std::sync::Arc;

use crate::application::listing_sync::ListingVisibilityCoordinator;
use crate::domain::foundation::{DomainError, OwnedByUser, SubscriptionId, Timestamp, UserId};
use crate::domain::subscription::{Subscription, SubscriptionError, SubscriptionStatus};
use crate::ports::{PaymentProvider, SubscriptionRepository};

/// Command to cancel a subscription.
#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub subscription_id: SubscriptionId,
    pub requested_by: UserId,
    pub is_admin: bool,
}

/// When the cancellation takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationEffect {
    /// Still active until the current period ends.
    AtPeriodEnd { until: Option<Timestamp> },
    Immediate,
}

#[derive(Debug, Clone)]
pub struct CancelSubscriptionResult {
    pub subscription: Subscription,
    pub effect: CancellationEffect,
}

pub struct CancelSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    payment_provider: Arc<dyn PaymentProvider>,
    listing_sync: Arc<ListingVisibilityCoordinator>,
}

impl CancelSubscriptionHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        payment_provider: Arc<dyn PaymentProvider>,
        listing_sync: Arc<ListingVisibilityCoordinator>,
    ) -> Self {
        Self {
            subscriptions,
            payment_provider,
            listing_sync,
        }
    }

    pub async fn handle(
        &self,
        cmd: CancelSubscriptionCommand,
    ) -> Result<CancelSubscriptionResult, SubscriptionError> {
        // 1. Find and authorize
        let subscription = self
            .subscriptions
            .find_by_id(&cmd.subscription_id)
            .await?
            .ok_or_else(|| SubscriptionError::not_found(cmd.subscription_id))?;
        if !cmd.is_admin {
            subscription.check_ownership(&cmd.requested_by)?;
        }
        if !subscription.is_live() {
            return Err(SubscriptionError::invalid_state(
                subscription.status.as_str(),
                "cancel",
            ));
        }

        // 2a. Provider-billed: stop renewal, keep access until period end
        if let Some(external_id) = &subscription.external_subscription_id {
            self.payment_provider
                .cancel_at_period_end(external_id)
                .await
                .map_err(|e| SubscriptionError::payment_failed(e.message))?;

            let mutation = |s: &mut Subscription| -> Result<bool, DomainError> {
                if s.cancel_at_period_end {
                    return Ok(false);
                }
                s.set_cancellation(true)?;
                Ok(true)
            };
            let modified = self
                .subscriptions
                .modify_by_id(&cmd.subscription_id, &mutation)
                .await?
                .ok_or_else(|| SubscriptionError::not_found(cmd.subscription_id))?;

            tracing::info!(
                subscription_id = %cmd.subscription_id,
                external_subscription_id = %external_id,
                "Subscription set to cancel at period end"
            );

            let until = modified.subscription.next_billing_date;
            return Ok(CancelSubscriptionResult {
                subscription: modified.subscription,
                effect: CancellationEffect::AtPeriodEnd { until },
            });
        }

        // 2b. Local only: cancel now and hide the listing
        let mutation = |s: &mut Subscription| -> Result<bool, DomainError> {
            if s.status == SubscriptionStatus::Trial {
                s.end_trial()?;
            }
            s.cancel()?;
            Ok(true)
        };
        let modified = self
            .subscriptions
            .modify_by_id(&cmd.subscription_id, &mutation)
            .await?
            .ok_or_else(|| SubscriptionError::not_found(cmd.subscription_id))?;

        tracing::info!(subscription_id = %cmd.subscription_id, "Subscription cancelled");

        if let Some(change) = modified.subscription.visibility_change() {
            self.listing_sync.sync(change).await;
        }

        Ok(CancelSubscriptionResult {
            subscription: modified.subscription,
            effect: CancellationEffect::Immediate,
        })
    }
}
