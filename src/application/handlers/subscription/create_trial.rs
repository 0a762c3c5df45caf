//! CreateTrialHandler - Command handler for direct trial signup.

use std::sync::Arc;

use crate::application::listing_sync::ListingVisibilityCoordinator;
use crate::application::plan_allocator::PlanOffer;
use crate::domain::foundation::{OwnedByUser, SpaceId, Timestamp, UserId};
use crate::domain::listing::VisibilityChange;
use crate::domain::subscription::{Subscription, SubscriptionError};
use crate::ports::{ListingDirectory, SaveResult, SubscriptionRepository};

/// Command to start a free trial on a listing.
#[derive(Debug, Clone)]
pub struct CreateTrialCommand {
    pub user_id: UserId,
    pub space_id: SpaceId,
}

#[derive(Debug, Clone)]
pub struct CreateTrialResult {
    pub subscription: Subscription,
}

/// Handler for trial signup.
///
/// This is the only path that creates a subscription without a provider
/// checkout, so it enforces one live subscription per (user, listing).
pub struct CreateTrialHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    listings: Arc<dyn ListingDirectory>,
    listing_sync: Arc<ListingVisibilityCoordinator>,
    offer: PlanOffer,
    trial_days: i64,
}

impl CreateTrialHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        listings: Arc<dyn ListingDirectory>,
        listing_sync: Arc<ListingVisibilityCoordinator>,
        offer: PlanOffer,
        trial_days: i64,
    ) -> Self {
        Self {
            subscriptions,
            listings,
            listing_sync,
            offer,
            trial_days,
        }
    }

    pub async fn handle(
        &self,
        cmd: CreateTrialCommand,
    ) -> Result<CreateTrialResult, SubscriptionError> {
        // 1. Owner only
        let listing = self
            .listings
            .find_listing(&cmd.space_id)
            .await?
            .ok_or_else(|| SubscriptionError::listing_not_found(cmd.space_id))?;
        listing.check_ownership(&cmd.user_id)?;

        // 2. One live subscription per (user, listing)
        let existing = self.subscriptions.find_by_space(&cmd.space_id).await?;
        if existing
            .iter()
            .any(|s| s.user_id == cmd.user_id && s.is_live())
        {
            return Err(SubscriptionError::already_exists(cmd.space_id));
        }

        // 3. Create and persist
        let subscription = Subscription::new_trial(
            cmd.user_id.clone(),
            Some(cmd.space_id),
            self.offer.plan.clone(),
            self.offer.price_cents,
            Timestamp::now().add_days(self.trial_days),
        )?;

        if self.subscriptions.save(&subscription).await? == SaveResult::AlreadyExists {
            return Err(SubscriptionError::already_exists(cmd.space_id));
        }

        tracing::info!(
            subscription_id = %subscription.id,
            user_id = %cmd.user_id,
            space_id = %cmd.space_id,
            trial_days = self.trial_days,
            "Trial started"
        );

        // 4. Trials make the listing visible
        self.listing_sync
            .sync(VisibilityChange::activate(cmd.space_id))
            .await;

        Ok(CreateTrialResult { subscription })
    }
}
