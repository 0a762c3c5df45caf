//! PostgreSQL seat reservations for capacity-limited plans.
//!
//! Each reservation attempt locks the plan's `plan_capacity` row, then counts
//! active subscriptions plus unexpired reservations. Two hosts racing for the
//! last seat serialize on that lock, so at most one of them gets it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::db_error;
use crate::domain::foundation::{
    DomainError, ErrorCode, ReservationId, SpaceId, Timestamp, UserId,
};
use crate::domain::subscription::{Plan, SubscriptionStatus};
use crate::ports::{SeatRequest, SeatReservation, SeatReservations};

pub struct PostgresSeatReservations {
    pool: PgPool,
}

impl PostgresSeatReservations {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    plan: String,
    user_id: String,
    space_id: Uuid,
    expires_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for SeatReservation {
    type Error = DomainError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        let invalid = |e: String| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid seat reservation {}: {}", row.id, e),
            )
        };

        Ok(SeatReservation {
            id: ReservationId::from_uuid(row.id),
            plan: Plan::new(row.plan.clone()).map_err(|e| invalid(e.to_string()))?,
            user_id: UserId::new(row.user_id.clone()).map_err(|e| invalid(e.to_string()))?,
            space_id: SpaceId::from_uuid(row.space_id),
            expires_at: Timestamp::from_datetime(row.expires_at),
        })
    }
}

#[async_trait]
impl SeatReservations for PostgresSeatReservations {
    async fn try_reserve(
        &self,
        request: SeatRequest,
    ) -> Result<Option<SeatReservation>, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("begin transaction"))?;

        sqlx::query("INSERT INTO plan_capacity (plan) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(request.plan.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_error("register plan capacity"))?;

        sqlx::query("SELECT plan FROM plan_capacity WHERE plan = $1 FOR UPDATE")
            .bind(request.plan.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_error("lock plan capacity"))?;

        sqlx::query("DELETE FROM seat_reservations WHERE plan = $1 AND expires_at <= NOW()")
            .bind(request.plan.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_error("purge expired reservations"))?;

        // The same host retrying the same listing keeps its seat.
        let existing: Option<ReservationRow> = sqlx::query_as(
            r#"
            UPDATE seat_reservations SET expires_at = GREATEST(expires_at, $4)
            WHERE plan = $1 AND user_id = $2 AND space_id = $3
            RETURNING id, plan, user_id, space_id, expires_at
            "#,
        )
        .bind(request.plan.as_str())
        .bind(request.user_id.as_str())
        .bind(request.space_id.as_uuid())
        .bind(request.expires_at.as_datetime())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("refresh seat reservation"))?;

        if let Some(row) = existing {
            tx.commit().await.map_err(db_error("commit transaction"))?;
            return SeatReservation::try_from(row).map(Some);
        }

        let held: i64 = sqlx::query_scalar(
            r#"
            SELECT
                (SELECT COUNT(*) FROM subscriptions WHERE plan = $1 AND status = $2)
              + (SELECT COUNT(*) FROM seat_reservations WHERE plan = $1)
            "#,
        )
        .bind(request.plan.as_str())
        .bind(SubscriptionStatus::Active.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("count held seats"))?;

        if held >= i64::from(request.capacity) {
            tx.commit().await.map_err(db_error("commit transaction"))?;
            tracing::info!(
                plan = %request.plan,
                held,
                capacity = request.capacity,
                "No seats left on plan"
            );
            return Ok(None);
        }

        let reservation = SeatReservation {
            id: ReservationId::new(),
            plan: request.plan,
            user_id: request.user_id,
            space_id: request.space_id,
            expires_at: request.expires_at,
        };

        sqlx::query(
            r#"
            INSERT INTO seat_reservations (id, plan, user_id, space_id, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.plan.as_str())
        .bind(reservation.user_id.as_str())
        .bind(reservation.space_id.as_uuid())
        .bind(reservation.expires_at.as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(db_error("insert seat reservation"))?;

        tx.commit().await.map_err(db_error("commit transaction"))?;

        Ok(Some(reservation))
    }

    async fn release(&self, id: &ReservationId) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM seat_reservations WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_error("release seat reservation"))?;
        Ok(())
    }

    async fn consume(
        &self,
        plan: &Plan,
        user_id: &UserId,
        space_id: &SpaceId,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            "DELETE FROM seat_reservations WHERE plan = $1 AND user_id = $2 AND space_id = $3",
        )
        .bind(plan.as_str())
        .bind(user_id.as_str())
        .bind(space_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(db_error("consume seat reservation"))?;

        Ok(result.rows_affected() > 0)
    }
}
