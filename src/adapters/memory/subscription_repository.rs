use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, SpaceId, SubscriptionId, UserId};
use crate::domain::subscription::{Plan, Subscription, SubscriptionStatus};
use crate::ports::{Modified, SaveResult, SubscriptionMutation, SubscriptionRepository};

/// Subscription table held in a vector.
///
/// `modify_*` runs the mutation under the write lock, which gives the same
/// serialization per row as `SELECT ... FOR UPDATE`.
#[derive(Default)]
pub struct InMemorySubscriptionRepository {
    rows: RwLock<Vec<Subscription>>,
    fail_writes: AtomicBool,
    stall_millis: AtomicU64,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscriptions(subscriptions: Vec<Subscription>) -> Self {
        Self {
            rows: RwLock::new(subscriptions),
            ..Self::default()
        }
    }

    /// Make every write fail (simulates the database refusing commits).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Delay every call by `delay` before touching the rows.
    pub fn stall_for(&self, delay: Duration) {
        self.stall_millis
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    async fn stall(&self) {
        let millis = self.stall_millis.load(Ordering::SeqCst);
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }

    async fn before_write(&self) -> Result<(), DomainError> {
        self.stall().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DomainError::database("subscription store unavailable"));
        }
        Ok(())
    }

    /// Every stored row, in insertion order.
    pub async fn snapshot(&self) -> Vec<Subscription> {
        self.rows.read().await.clone()
    }

    async fn modify_where(
        &self,
        matches: impl Fn(&Subscription) -> bool + Send,
        mutation: SubscriptionMutation<'_>,
    ) -> Result<Option<Modified>, DomainError> {
        self.before_write().await?;
        let mut rows = self.rows.write().await;
        let Some(row) = rows.iter_mut().find(|s| matches(s)) else {
            return Ok(None);
        };

        let mut working = row.clone();
        let changed = mutation(&mut working)?;
        if changed {
            *row = working.clone();
        }
        Ok(Some(Modified {
            subscription: working,
            changed,
        }))
    }
}

fn newest_first(mut subscriptions: Vec<Subscription>) -> Vec<Subscription> {
    subscriptions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    subscriptions
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn save(&self, subscription: &Subscription) -> Result<SaveResult, DomainError> {
        self.before_write().await?;
        let mut rows = self.rows.write().await;
        let duplicate = rows.iter().any(|s| {
            s.id == subscription.id
                || (subscription.checkout_session_id.is_some()
                    && s.checkout_session_id == subscription.checkout_session_id)
        });
        if duplicate {
            return Ok(SaveResult::AlreadyExists);
        }
        rows.push(subscription.clone());
        Ok(SaveResult::Inserted)
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
        self.before_write().await?;
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|s| s.id == subscription.id)
            .ok_or_else(|| {
                DomainError::new(ErrorCode::SubscriptionNotFound, "Subscription not found")
            })?;
        *row = subscription.clone();
        Ok(())
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        self.stall().await;
        Ok(self.rows.read().await.iter().find(|s| &s.id == id).cloned())
    }

    async fn find_by_external_id(
        &self,
        external_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        self.stall().await;
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .find(|s| s.external_subscription_id.as_deref() == Some(external_subscription_id))
            .cloned())
    }

    async fn find_by_checkout_session(
        &self,
        checkout_session_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        self.stall().await;
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .find(|s| s.checkout_session_id.as_deref() == Some(checkout_session_id))
            .cloned())
    }

    async fn find_by_space(&self, space_id: &SpaceId) -> Result<Vec<Subscription>, DomainError> {
        self.stall().await;
        let rows = self.rows.read().await;
        Ok(newest_first(
            rows.iter()
                .filter(|s| s.space_id.as_ref() == Some(space_id))
                .cloned()
                .collect(),
        ))
    }

    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<Subscription>, DomainError> {
        self.stall().await;
        let rows = self.rows.read().await;
        Ok(newest_first(
            rows.iter().filter(|s| &s.user_id == user_id).cloned().collect(),
        ))
    }

    async fn list_all(&self) -> Result<Vec<Subscription>, DomainError> {
        Ok(self.rows.read().await.clone())
    }

    async fn count_by_plan_and_status(
        &self,
        plan: &Plan,
        status: SubscriptionStatus,
    ) -> Result<u64, DomainError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|s| &s.plan == plan && s.status == status)
            .count() as u64)
    }

    async fn modify_by_id(
        &self,
        id: &SubscriptionId,
        mutation: SubscriptionMutation<'_>,
    ) -> Result<Option<Modified>, DomainError> {
        let id = *id;
        self.modify_where(move |s| s.id == id, mutation).await
    }

    async fn modify_by_external_id(
        &self,
        external_subscription_id: &str,
        mutation: SubscriptionMutation<'_>,
    ) -> Result<Option<Modified>, DomainError> {
        self.modify_where(
            |s| s.external_subscription_id.as_deref() == Some(external_subscription_id),
            mutation,
        )
        .await
    }
}
