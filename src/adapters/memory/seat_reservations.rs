use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::foundation::{DomainError, ReservationId, SpaceId, Timestamp, UserId};
use crate::domain::subscription::{Plan, SubscriptionStatus};
use crate::ports::{SeatRequest, SeatReservation, SeatReservations, SubscriptionRepository};

/// Seat reservations guarded by a single mutex.
///
/// Active subscriptions are counted from the shared subscription repository
/// while the mutex is held, so two claims never observe the same free seat.
pub struct InMemorySeatReservations {
    subscriptions: Arc<dyn SubscriptionRepository>,
    held: Mutex<Vec<SeatReservation>>,
}

impl InMemorySeatReservations {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>) -> Self {
        Self {
            subscriptions,
            held: Mutex::new(Vec::new()),
        }
    }

    /// Unexpired reservations.
    pub async fn live(&self) -> Vec<SeatReservation> {
        let now = Timestamp::now();
        self.held
            .lock()
            .await
            .iter()
            .filter(|r| r.expires_at.is_after(&now))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SeatReservations for InMemorySeatReservations {
    async fn try_reserve(
        &self,
        request: SeatRequest,
    ) -> Result<Option<SeatReservation>, DomainError> {
        let mut held = self.held.lock().await;
        let now = Timestamp::now();
        held.retain(|r| r.expires_at.is_after(&now));

        if let Some(existing) = held.iter_mut().find(|r| {
            r.plan == request.plan && r.user_id == request.user_id && r.space_id == request.space_id
        }) {
            existing.expires_at = request.expires_at;
            return Ok(Some(existing.clone()));
        }

        let active = self
            .subscriptions
            .count_by_plan_and_status(&request.plan, SubscriptionStatus::Active)
            .await?;
        let reserved = held.iter().filter(|r| r.plan == request.plan).count() as u64;
        if active + reserved >= u64::from(request.capacity) {
            return Ok(None);
        }

        let reservation = SeatReservation {
            id: ReservationId::new(),
            plan: request.plan,
            user_id: request.user_id,
            space_id: request.space_id,
            expires_at: request.expires_at,
        };
        held.push(reservation.clone());
        Ok(Some(reservation))
    }

    async fn release(&self, id: &ReservationId) -> Result<(), DomainError> {
        self.held.lock().await.retain(|r| &r.id != id);
        Ok(())
    }

    async fn consume(
        &self,
        plan: &Plan,
        user_id: &UserId,
        space_id: &SpaceId,
    ) -> Result<bool, DomainError> {
        let mut held = self.held.lock().await;
        let before = held.len();
        held.retain(|r| !(&r.plan == plan && &r.user_id == user_id && &r.space_id == space_id));
        Ok(held.len() != before)
    }
}
