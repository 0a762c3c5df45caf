//! Lapsed trial settlement.
//!
//! No provider event ends a trial, so a trial whose `trial_until` has passed
//! is ended the next time it is read. The record is suspended and its
//! listing hidden until a checkout converts it.

use std::sync::Arc;

use crate::application::listing_sync::ListingVisibilityCoordinator;
use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::subscription::Subscription;
use crate::ports::SubscriptionRepository;

pub struct TrialExpiry {
    subscriptions: Arc<dyn SubscriptionRepository>,
    listing_sync: Arc<ListingVisibilityCoordinator>,
}

impl TrialExpiry {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        listing_sync: Arc<ListingVisibilityCoordinator>,
    ) -> Self {
        Self {
            subscriptions,
            listing_sync,
        }
    }

    /// Ends the trial if it has lapsed and returns the record as stored.
    pub async fn settle(&self, subscription: Subscription) -> Result<Subscription, DomainError> {
        let now = Timestamp::now();
        if !subscription.trial_lapsed(&now) {
            return Ok(subscription);
        }

        let mutation = move |s: &mut Subscription| -> Result<bool, DomainError> {
            if !s.trial_lapsed(&now) {
                return Ok(false);
            }
            s.end_trial()?;
            Ok(true)
        };
        let Some(modified) = self
            .subscriptions
            .modify_by_id(&subscription.id, &mutation)
            .await?
        else {
            return Ok(subscription);
        };

        if modified.changed {
            tracing::info!(
                subscription_id = %modified.subscription.id,
                user_id = %modified.subscription.user_id,
                "Trial lapsed without payment, subscription suspended"
            );
            if let Some(change) = modified.subscription.visibility_change() {
                self.listing_sync.sync(change).await;
            }
        }
        Ok(modified.subscription)
    }

    pub async fn settle_all(
        &self,
        subscriptions: Vec<Subscription>,
    ) -> Result<Vec<Subscription>, DomainError> {
        let mut settled = Vec::with_capacity(subscriptions.len());
        for subscription in subscriptions {
            settled.push(self.settle(subscription).await?);
        }
        Ok(settled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryListingDirectory, InMemorySubscriptionRepository};
    use crate::domain::foundation::{SpaceId, UserId};
    use crate::domain::listing::{Listing, ListingVisibility};
    use crate::domain::subscription::{Plan, SubscriptionStatus};

    struct Fixture {
        repo: Arc<InMemorySubscriptionRepository>,
        listings: Arc<InMemoryListingDirectory>,
        expiry: TrialExpiry,
    }

    async fn fixture(subscriptions: Vec<Subscription>) -> Fixture {
        let repo = Arc::new(InMemorySubscriptionRepository::with_subscriptions(
            subscriptions.clone(),
        ));
        let listings = Arc::new(InMemoryListingDirectory::new());
        for s in &subscriptions {
            if let Some(space) = s.space_id {
                listings
                    .insert(Listing {
                        id: space,
                        owner_id: s.user_id.clone(),
                        visibility: ListingVisibility::Active,
                    })
                    .await;
            }
        }
        let expiry = TrialExpiry::new(
            repo.clone(),
            Arc::new(ListingVisibilityCoordinator::new(listings.clone())),
        );
        Fixture {
            repo,
            listings,
            expiry,
        }
    }

    fn trial() -> Subscription {
        Subscription::new_trial(
            UserId::new("host-1").unwrap(),
            Some(SpaceId::new()),
            Plan::normal(),
            2_900,
            Timestamp::now().add_days(14),
        )
        .unwrap()
    }

    fn lapsed_trial() -> Subscription {
        let mut s = trial();
        s.trial_until = Some(Timestamp::now().minus_days(1));
        s
    }

    #[tokio::test]
    async fn lapsed_trial_is_suspended_and_hidden() {
        let lapsed = lapsed_trial();
        let space = lapsed.space_id.unwrap();
        let fx = fixture(vec![lapsed.clone()]).await;

        let settled = fx.expiry.settle(lapsed).await.unwrap();

        assert_eq!(settled.status, SubscriptionStatus::Suspended);
        assert_eq!(fx.repo.snapshot().await[0].status, SubscriptionStatus::Suspended);
        assert_eq!(
            fx.listings.visibility_of(&space).await,
            Some(ListingVisibility::Suspended)
        );
    }

    #[tokio::test]
    async fn running_trial_is_returned_untouched() {
        let running = trial();
        let space = running.space_id.unwrap();
        let fx = fixture(vec![running.clone()]).await;

        let settled = fx.expiry.settle(running.clone()).await.unwrap();

        assert_eq!(settled, running);
        assert_eq!(
            fx.listings.visibility_of(&space).await,
            Some(ListingVisibility::Active)
        );
    }

    #[tokio::test]
    async fn stale_copy_does_not_undo_a_conversion() {
        let stale = lapsed_trial();
        let mut converted = stale.clone();
        converted.activate().unwrap();
        let fx = fixture(vec![converted]).await;

        let settled = fx.expiry.settle(stale).await.unwrap();

        assert_eq!(settled.status, SubscriptionStatus::Active);
        assert_eq!(fx.repo.snapshot().await[0].status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn settle_all_keeps_order() {
        let first = trial();
        let second = lapsed_trial();
        let fx = fixture(vec![first.clone(), second.clone()]).await;

        let settled = fx.expiry.settle_all(vec![first, second]).await.unwrap();

        assert_eq!(settled[0].status, SubscriptionStatus::Trial);
        assert_eq!(settled[1].status, SubscriptionStatus::Suspended);
    }
}
