//! Subscription repository port.
//!
//! The subscription row is the unit of consistency. Webhook reconciliation
//! and user actions change existing rows through the `modify_*` methods,
//! which run the mutation inside one read-modify-write transaction so
//! concurrent deliveries for the same subscription serialize on the row.

use async_trait::async_trait;

use super::SaveResult;
use crate::domain::foundation::{DomainError, SpaceId, SubscriptionId, UserId};
use crate::domain::subscription::{Plan, Subscription, SubscriptionStatus};

/// In-place change applied under the row lock.
///
/// Returns `Ok(true)` when the subscription changed and must be written back.
pub type SubscriptionMutation<'a> =
    &'a (dyn Fn(&mut Subscription) -> Result<bool, DomainError> + Send + Sync);

/// Subscription after a `modify_*` call.
#[derive(Debug, Clone)]
pub struct Modified {
    pub subscription: Subscription,
    /// Whether the mutation reported a change (and the row was written).
    pub changed: bool,
}

/// Repository port for Subscription persistence.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Insert a new subscription.
    ///
    /// Returns `AlreadyExists` when another row already carries the same
    /// `checkout_session_id`.
    async fn save(&self, subscription: &Subscription) -> Result<SaveResult, DomainError>;

    /// Overwrite an existing subscription.
    ///
    /// # Errors
    ///
    /// - `SubscriptionNotFound` if the row doesn't exist
    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError>;

    /// Lookup by the provider's subscription reference (reconciliation join key).
    async fn find_by_external_id(
        &self,
        external_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError>;

    async fn find_by_checkout_session(
        &self,
        checkout_session_id: &str,
    ) -> Result<Option<Subscription>, DomainError>;

    /// All subscriptions ever attached to a listing, newest first.
    async fn find_by_space(&self, space_id: &SpaceId) -> Result<Vec<Subscription>, DomainError>;

    /// All subscriptions owned by a user, newest first.
    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<Subscription>, DomainError>;

    async fn list_all(&self) -> Result<Vec<Subscription>, DomainError>;

    async fn count_by_plan_and_status(
        &self,
        plan: &Plan,
        status: SubscriptionStatus,
    ) -> Result<u64, DomainError>;

    /// Apply `mutation` to the subscription with `id` under a row lock.
    ///
    /// Returns `None` when no such subscription exists. A mutation error
    /// aborts without writing.
    async fn modify_by_id(
        &self,
        id: &SubscriptionId,
        mutation: SubscriptionMutation<'_>,
    ) -> Result<Option<Modified>, DomainError>;

    /// Same as [`modify_by_id`](Self::modify_by_id), keyed by provider reference.
    async fn modify_by_external_id(
        &self,
        external_subscription_id: &str,
        mutation: SubscriptionMutation<'_>,
    ) -> Result<Option<Modified>, DomainError>;
}
