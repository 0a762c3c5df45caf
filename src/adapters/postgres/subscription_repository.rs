//! PostgreSQL implementation of SubscriptionRepository.
//!
//! `modify_*` run inside a transaction holding a `FOR UPDATE` lock on the
//! row, so concurrent webhook deliveries for one subscription apply in turn.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use super::db_error;
use crate::domain::foundation::{
    DomainError, ErrorCode, SpaceId, SubscriptionId, Timestamp, UserId,
};
use crate::domain::subscription::{Plan, Subscription, SubscriptionStatus};
use crate::ports::{Modified, SaveResult, SubscriptionMutation, SubscriptionRepository};

macro_rules! select_subscription {
    () => {
        r#"
        SELECT id, user_id, space_id, plan, price_cents, status,
               external_subscription_id, external_customer_id, checkout_session_id,
               trial_until, next_billing_date, cancel_at_period_end, coupon_code,
               created_at, updated_at, cancelled_at
        FROM subscriptions
        "#
    };
}

const LOCK_BY_ID: &str = concat!(select_subscription!(), "WHERE id = $1 FOR UPDATE");
const LOCK_BY_EXTERNAL_ID: &str = concat!(
    select_subscription!(),
    "WHERE external_subscription_id = $1 ORDER BY created_at DESC LIMIT 1 FOR UPDATE"
);

/// PostgreSQL implementation of the SubscriptionRepository port.
pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn modify_locked(
        &self,
        lock_query: &'static str,
        key: RowKey<'_>,
        mutation: SubscriptionMutation<'_>,
    ) -> Result<Option<Modified>, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("begin transaction"))?;

        let query = sqlx::query_as::<_, SubscriptionRow>(lock_query);
        let query = match key {
            RowKey::Uuid(id) => query.bind(id),
            RowKey::Text(value) => query.bind(value.to_string()),
        };
        let row = query
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error("lock subscription"))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut subscription = Subscription::try_from(row)?;

        // Dropping `tx` on error rolls back and releases the lock.
        let changed = mutation(&mut subscription)?;
        if changed {
            write_row(&mut *tx, &subscription)
                .await
                .map_err(db_error("update subscription"))?;
        }

        tx.commit().await.map_err(db_error("commit transaction"))?;

        Ok(Some(Modified {
            subscription,
            changed,
        }))
    }

    async fn fetch_many(
        &self,
        query: &'static str,
        key: RowKey<'_>,
    ) -> Result<Vec<Subscription>, DomainError> {
        let query = sqlx::query_as::<_, SubscriptionRow>(query);
        let query = match key {
            RowKey::Uuid(id) => query.bind(id),
            RowKey::Text(value) => query.bind(value.to_string()),
        };
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("fetch subscriptions"))?;

        rows.into_iter().map(Subscription::try_from).collect()
    }
}

/// The single `$1` bind of a keyed query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowKey<'a> {
    Uuid(Uuid),
    Text(&'a str),
}

impl<'a> From<&'a UserId> for RowKey<'a> {
    fn from(user_id: &'a UserId) -> Self {
        RowKey::Text(user_id.as_str())
    }
}

impl From<&SpaceId> for RowKey<'_> {
    fn from(space_id: &SpaceId) -> Self {
        RowKey::Uuid(*space_id.as_uuid())
    }
}

impl From<&SubscriptionId> for RowKey<'_> {
    fn from(id: &SubscriptionId) -> Self {
        RowKey::Uuid(*id.as_uuid())
    }
}

/// Database row representation of a subscription.
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    user_id: String,
    space_id: Option<Uuid>,
    plan: String,
    price_cents: i64,
    status: String,
    external_subscription_id: Option<String>,
    external_customer_id: Option<String>,
    checkout_session_id: Option<String>,
    trial_until: Option<DateTime<Utc>>,
    next_billing_date: Option<DateTime<Utc>>,
    cancel_at_period_end: bool,
    coupon_code: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let corrupt = |field: &str, e: &dyn std::fmt::Display| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid {} in subscription {}: {}", field, row.id, e),
            )
        };

        let user_id = UserId::new(row.user_id.clone()).map_err(|e| corrupt("user_id", &e))?;
        let plan = Plan::new(row.plan.clone()).map_err(|e| corrupt("plan", &e))?;
        let status: SubscriptionStatus =
            row.status.parse().map_err(|e| corrupt("status", &e))?;

        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            user_id,
            space_id: row.space_id.map(SpaceId::from_uuid),
            plan,
            price_cents: row.price_cents,
            status,
            external_subscription_id: row.external_subscription_id,
            external_customer_id: row.external_customer_id,
            checkout_session_id: row.checkout_session_id,
            trial_until: row.trial_until.map(Timestamp::from_datetime),
            next_billing_date: row.next_billing_date.map(Timestamp::from_datetime),
            cancel_at_period_end: row.cancel_at_period_end,
            coupon_code: row.coupon_code,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
            cancelled_at: row.cancelled_at.map(Timestamp::from_datetime),
        })
    }
}

fn datetime(ts: &Option<Timestamp>) -> Option<DateTime<Utc>> {
    ts.as_ref().map(|t| *t.as_datetime())
}

async fn write_row<'e>(
    executor: impl PgExecutor<'e>,
    subscription: &Subscription,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE subscriptions SET
            plan = $2,
            price_cents = $3,
            status = $4,
            external_subscription_id = $5,
            external_customer_id = $6,
            trial_until = $7,
            next_billing_date = $8,
            cancel_at_period_end = $9,
            coupon_code = $10,
            updated_at = $11,
            cancelled_at = $12
        WHERE id = $1
        "#,
    )
    .bind(subscription.id.as_uuid())
    .bind(subscription.plan.as_str())
    .bind(subscription.price_cents)
    .bind(subscription.status.as_str())
    .bind(&subscription.external_subscription_id)
    .bind(&subscription.external_customer_id)
    .bind(datetime(&subscription.trial_until))
    .bind(datetime(&subscription.next_billing_date))
    .bind(subscription.cancel_at_period_end)
    .bind(&subscription.coupon_code)
    .bind(subscription.updated_at.as_datetime())
    .bind(datetime(&subscription.cancelled_at))
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn save(&self, subscription: &Subscription) -> Result<SaveResult, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, user_id, space_id, plan, price_cents, status,
                external_subscription_id, external_customer_id, checkout_session_id,
                trial_until, next_billing_date, cancel_at_period_end, coupon_code,
                created_at, updated_at, cancelled_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT ON CONSTRAINT subscriptions_checkout_session_id_key DO NOTHING
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.user_id.as_str())
        .bind(subscription.space_id.map(|s| *s.as_uuid()))
        .bind(subscription.plan.as_str())
        .bind(subscription.price_cents)
        .bind(subscription.status.as_str())
        .bind(&subscription.external_subscription_id)
        .bind(&subscription.external_customer_id)
        .bind(&subscription.checkout_session_id)
        .bind(datetime(&subscription.trial_until))
        .bind(datetime(&subscription.next_billing_date))
        .bind(subscription.cancel_at_period_end)
        .bind(&subscription.coupon_code)
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .bind(datetime(&subscription.cancelled_at))
        .execute(&self.pool)
        .await
        .map_err(db_error("insert subscription"))?;

        if result.rows_affected() == 0 {
            return Ok(SaveResult::AlreadyExists);
        }
        Ok(SaveResult::Inserted)
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let rows = write_row(&self.pool, subscription)
            .await
            .map_err(db_error("update subscription"))?;

        if rows == 0 {
            return Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                format!("Subscription not found: {}", subscription.id),
            ));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> =
            sqlx::query_as(concat!(select_subscription!(), "WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("fetch subscription"))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_by_external_id(
        &self,
        external_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(concat!(
            select_subscription!(),
            "WHERE external_subscription_id = $1 ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(external_subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("fetch subscription by external id"))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_by_checkout_session(
        &self,
        checkout_session_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(concat!(
            select_subscription!(),
            "WHERE checkout_session_id = $1"
        ))
        .bind(checkout_session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("fetch subscription by checkout session"))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_by_space(&self, space_id: &SpaceId) -> Result<Vec<Subscription>, DomainError> {
        self.fetch_many(
            concat!(
                select_subscription!(),
                "WHERE space_id = $1 ORDER BY created_at DESC"
            ),
            RowKey::from(space_id),
        )
        .await
    }

    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<Subscription>, DomainError> {
        self.fetch_many(
            concat!(
                select_subscription!(),
                "WHERE user_id = $1 ORDER BY created_at DESC"
            ),
            RowKey::from(user_id),
        )
        .await
    }

    async fn list_all(&self) -> Result<Vec<Subscription>, DomainError> {
        let rows: Vec<SubscriptionRow> =
            sqlx::query_as(concat!(select_subscription!(), "ORDER BY created_at"))
                .fetch_all(&self.pool)
                .await
                .map_err(db_error("list subscriptions"))?;

        rows.into_iter().map(Subscription::try_from).collect()
    }

    async fn count_by_plan_and_status(
        &self,
        plan: &Plan,
        status: SubscriptionStatus,
    ) -> Result<u64, DomainError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions WHERE plan = $1 AND status = $2")
                .bind(plan.as_str())
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(db_error("count subscriptions"))?;

        Ok(count.max(0) as u64)
    }

    async fn modify_by_id(
        &self,
        id: &SubscriptionId,
        mutation: SubscriptionMutation<'_>,
    ) -> Result<Option<Modified>, DomainError> {
        self.modify_locked(LOCK_BY_ID, RowKey::from(id), mutation)
            .await
    }

    async fn modify_by_external_id(
        &self,
        external_subscription_id: &str,
        mutation: SubscriptionMutation<'_>,
    ) -> Result<Option<Modified>, DomainError> {
        self.modify_locked(
            LOCK_BY_EXTERNAL_ID,
            RowKey::Text(external_subscription_id),
            mutation,
        )
        .await
    }
}
