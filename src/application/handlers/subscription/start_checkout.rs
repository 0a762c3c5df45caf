//! StartCheckoutHandler - Command handler for starting a listing checkout.

use std::sync::Arc;

use crate::application::listing_sync::ListingVisibilityCoordinator;
use crate::application::plan_allocator::PlanAllocator;
use crate::domain::foundation::{OwnedByUser, SpaceId, SubscriptionId, UserId};
use crate::domain::listing::VisibilityChange;
use crate::domain::subscription::{
    BillingInterval, CheckoutMode, Plan, SubscriptionError, SubscriptionStatus,
};
use crate::ports::{
    CheckoutSession, CreateCheckoutRequest, ListingDirectory, PaymentProvider,
    SubscriptionRepository,
};

/// Where the provider sends the host after checkout.
#[derive(Debug, Clone)]
pub struct CheckoutUrls {
    pub success_url: String,
    pub cancel_url: String,
}

/// Command to start a checkout for a listing.
#[derive(Debug, Clone)]
pub struct StartCheckoutCommand {
    pub user_id: UserId,
    pub space_id: SpaceId,
    /// `None` buys the one-time activation fee.
    pub interval: Option<BillingInterval>,
    pub coupon_code: Option<String>,
}

/// Result of starting a checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartCheckoutResult {
    /// The listing is already paid for; its visibility was re-synced.
    AlreadyActive { subscription_id: SubscriptionId },
    /// Send the host to the provider.
    Redirect {
        session: CheckoutSession,
        plan: Plan,
        price_cents: i64,
        mode: CheckoutMode,
    },
}

/// Handler for starting checkouts.
///
/// Plan choice and founder seat claims go through the `PlanAllocator`. A
/// claimed seat is released when the provider refuses to open the session.
pub struct StartCheckoutHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    listings: Arc<dyn ListingDirectory>,
    payment_provider: Arc<dyn PaymentProvider>,
    allocator: Arc<PlanAllocator>,
    listing_sync: Arc<ListingVisibilityCoordinator>,
    urls: CheckoutUrls,
}

impl StartCheckoutHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        listings: Arc<dyn ListingDirectory>,
        payment_provider: Arc<dyn PaymentProvider>,
        allocator: Arc<PlanAllocator>,
        listing_sync: Arc<ListingVisibilityCoordinator>,
        urls: CheckoutUrls,
    ) -> Self {
        Self {
            subscriptions,
            listings,
            payment_provider,
            allocator,
            listing_sync,
            urls,
        }
    }

    pub async fn handle(
        &self,
        cmd: StartCheckoutCommand,
    ) -> Result<StartCheckoutResult, SubscriptionError> {
        // 1. Only the listing owner may pay for it
        let listing = self
            .listings
            .find_listing(&cmd.space_id)
            .await?
            .ok_or_else(|| SubscriptionError::listing_not_found(cmd.space_id))?;
        listing.check_ownership(&cmd.user_id)?;

        // 2. Already paid: re-sync visibility instead of charging twice
        let existing = self.subscriptions.find_by_space(&cmd.space_id).await?;
        if let Some(active) = existing
            .iter()
            .find(|s| s.status == SubscriptionStatus::Active)
        {
            tracing::info!(
                space_id = %cmd.space_id,
                subscription_id = %active.id,
                "Listing already has an active subscription"
            );
            self.listing_sync
                .sync(VisibilityChange::activate(cmd.space_id))
                .await;
            return Ok(StartCheckoutResult::AlreadyActive {
                subscription_id: active.id,
            });
        }

        // 3. Pick the plan (claims a founder seat when one is free)
        let allocation = self
            .allocator
            .allocate(&cmd.user_id, &cmd.space_id, cmd.interval)
            .await?;
        let offer = allocation.offer().clone();
        let mode = allocation.checkout_mode();

        let customer_id = existing
            .iter()
            .chain(self.subscriptions.find_by_user(&cmd.user_id).await?.iter())
            .find_map(|s| s.external_customer_id.clone());

        // 4. Open the provider session
        let request = CreateCheckoutRequest {
            user_id: cmd.user_id.clone(),
            space_id: cmd.space_id,
            plan: offer.plan.clone(),
            mode,
            price_id: offer.price_id.clone(),
            success_url: self.urls.success_url.clone(),
            cancel_url: self.urls.cancel_url.clone(),
            customer_id,
            coupon_code: cmd
                .coupon_code
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            idempotency_key: None,
        };

        let session = match self.payment_provider.create_checkout_session(request).await {
            Ok(session) => session,
            Err(e) => {
                self.allocator.release(&allocation).await;
                tracing::warn!(
                    user_id = %cmd.user_id,
                    space_id = %cmd.space_id,
                    error = %e,
                    "Checkout session creation failed"
                );
                return Err(SubscriptionError::payment_failed(e.message));
            }
        };

        tracing::info!(
            user_id = %cmd.user_id,
            space_id = %cmd.space_id,
            plan = %offer.plan,
            session_id = %session.id,
            "Checkout started"
        );

        Ok(StartCheckoutResult::Redirect {
            session,
            plan: offer.plan,
            price_cents: offer.price_cents,
            mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryListingDirectory, InMemorySeatReservations, InMemorySubscriptionRepository,
    };
    use crate::adapters::stripe::MockPaymentProvider;
    use crate::application::plan_allocator::test_support::catalog;
    use crate::domain::listing::{Listing, ListingVisibility};
    use crate::domain::subscription::Subscription;
    use crate::ports::PaymentError;

    struct Fixture {
        handler: StartCheckoutHandler,
        repo: Arc<InMemorySubscriptionRepository>,
        listings: Arc<InMemoryListingDirectory>,
        seats: Arc<InMemorySeatReservations>,
        provider: MockPaymentProvider,
    }

    fn host() -> UserId {
        UserId::new("host-1").unwrap()
    }

    fn fixture(subscriptions: Vec<Subscription>, founder_seats: u32) -> Fixture {
        let repo = Arc::new(InMemorySubscriptionRepository::with_subscriptions(subscriptions));
        let listings = Arc::new(InMemoryListingDirectory::new());
        let seats = Arc::new(InMemorySeatReservations::new(repo.clone()));
        let provider = MockPaymentProvider::new();
        let allocator = Arc::new(PlanAllocator::new(seats.clone(), catalog(founder_seats)));
        let handler = StartCheckoutHandler::new(
            repo.clone(),
            listings.clone(),
            Arc::new(provider.clone()),
            allocator,
            Arc::new(ListingVisibilityCoordinator::new(listings.clone())),
            CheckoutUrls {
                success_url: "https://app.test/billing/success".to_string(),
                cancel_url: "https://app.test/billing/cancel".to_string(),
            },
        );
        Fixture {
            handler,
            repo,
            listings,
            seats,
            provider,
        }
    }

    async fn listing(fx: &Fixture, owner: &str, visibility: ListingVisibility) -> SpaceId {
        let id = SpaceId::new();
        fx.listings
            .insert(Listing {
                id,
                owner_id: UserId::new(owner).unwrap(),
                visibility,
            })
            .await;
        id
    }

    fn command(space_id: SpaceId, interval: Option<BillingInterval>) -> StartCheckoutCommand {
        StartCheckoutCommand {
            user_id: host(),
            space_id,
            interval,
            coupon_code: None,
        }
    }

    #[tokio::test]
    async fn owner_gets_redirect_with_metadata() {
        let fx = fixture(vec![], 5);
        let space = listing(&fx, "host-1", ListingVisibility::Pending).await;

        let result = fx
            .handler
            .handle(command(space, Some(BillingInterval::Monthly)))
            .await
            .unwrap();

        match result {
            StartCheckoutResult::Redirect { session, plan, mode, .. } => {
                assert_eq!(session.id, "cs_mock_1");
                assert_eq!(plan, Plan::founder());
                assert_eq!(mode, CheckoutMode::Recurring);
            }
            other => panic!("expected redirect, got {:?}", other),
        }
        let sent = fx.provider.checkout_requests();
        assert_eq!(sent[0].space_id, space);
        assert_eq!(sent[0].price_id, "price_founder");
        assert_eq!(sent[0].success_url, "https://app.test/billing/success");
    }

    #[tokio::test]
    async fn no_interval_starts_one_time_activation() {
        let fx = fixture(vec![], 5);
        let space = listing(&fx, "host-1", ListingVisibility::Pending).await;

        let result = fx.handler.handle(command(space, None)).await.unwrap();

        assert!(matches!(
            result,
            StartCheckoutResult::Redirect { mode: CheckoutMode::OneTime, .. }
        ));
        assert_eq!(fx.provider.checkout_requests()[0].mode, CheckoutMode::OneTime);
    }

    #[tokio::test]
    async fn non_owner_is_forbidden() {
        let fx = fixture(vec![], 5);
        let space = listing(&fx, "someone-else", ListingVisibility::Pending).await;

        let err = fx.handler.handle(command(space, None)).await.unwrap_err();

        assert!(matches!(err, SubscriptionError::Forbidden { .. }));
        assert_eq!(fx.provider.call_count("create_checkout_session"), 0);
    }

    #[tokio::test]
    async fn unknown_listing_is_not_found() {
        let fx = fixture(vec![], 5);

        let err = fx.handler.handle(command(SpaceId::new(), None)).await.unwrap_err();

        assert!(matches!(err, SubscriptionError::ListingNotFound(_)));
    }

    #[tokio::test]
    async fn active_subscription_short_circuits_and_reactivates_listing() {
        let space = SpaceId::new();
        let active = Subscription::new_active(host(), Some(space), Plan::normal(), 2_900).unwrap();
        let active_id = active.id;
        let fx = fixture(vec![active], 5);
        fx.listings
            .insert(Listing {
                id: space,
                owner_id: host(),
                visibility: ListingVisibility::Suspended,
            })
            .await;

        let result = fx
            .handler
            .handle(command(space, Some(BillingInterval::Monthly)))
            .await
            .unwrap();

        assert_eq!(
            result,
            StartCheckoutResult::AlreadyActive {
                subscription_id: active_id
            }
        );
        assert_eq!(
            fx.listings.visibility_of(&space).await,
            Some(ListingVisibility::Active)
        );
        assert_eq!(fx.provider.call_count("create_checkout_session"), 0);
    }

    #[tokio::test]
    async fn provider_failure_releases_founder_seat() {
        let fx = fixture(vec![], 1);
        let space = listing(&fx, "host-1", ListingVisibility::Pending).await;
        fx.provider.set_error(PaymentError::network("connection reset"));

        let err = fx
            .handler
            .handle(command(space, Some(BillingInterval::Monthly)))
            .await
            .unwrap_err();

        assert!(matches!(err, SubscriptionError::PaymentFailed { .. }));
        assert!(fx.seats.live().await.is_empty());
    }

    #[tokio::test]
    async fn returning_customer_is_reused() {
        let other_space = SpaceId::new();
        let mut previous =
            Subscription::new_active(host(), Some(other_space), Plan::normal(), 2_900)
                .unwrap()
                .with_customer("cus_existing");
        previous.cancel().unwrap();
        let fx = fixture(vec![previous], 0);
        let space = listing(&fx, "host-1", ListingVisibility::Pending).await;

        fx.handler
            .handle(command(space, Some(BillingInterval::Monthly)))
            .await
            .unwrap();

        let sent = fx.provider.checkout_requests();
        assert_eq!(sent[0].customer_id.as_deref(), Some("cus_existing"));
        assert_eq!(sent[0].plan, Plan::normal());
        assert_eq!(fx.repo.snapshot().await.len(), 1);
    }
}
