//! Seat reservation port for capacity-limited plans.
//!
//! Counting seats and then deciding is unsafe under concurrent signups. The
//! port instead exposes one atomic claim: within a single critical section
//! (a row lock in Postgres, a mutex in memory) it counts held seats,
//! compares against capacity, and records the reservation.
//!
//! Held seats = active subscriptions on the plan + unexpired reservations.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ReservationId, SpaceId, Timestamp, UserId};
use crate::domain::subscription::Plan;

/// A held seat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatReservation {
    pub id: ReservationId,
    pub plan: Plan,
    pub user_id: UserId,
    pub space_id: SpaceId,
    pub expires_at: Timestamp,
}

/// Request to hold a seat.
#[derive(Debug, Clone)]
pub struct SeatRequest {
    pub plan: Plan,
    pub user_id: UserId,
    pub space_id: SpaceId,
    pub capacity: u32,
    pub expires_at: Timestamp,
}

#[async_trait]
pub trait SeatReservations: Send + Sync {
    /// Atomically claim a seat.
    ///
    /// Returns `None` when the plan is full. An unexpired reservation for the
    /// same (plan, user, space) is returned again with its expiry extended,
    /// so retrying checkout never consumes a second seat.
    async fn try_reserve(&self, request: SeatRequest)
        -> Result<Option<SeatReservation>, DomainError>;

    /// Give a held seat back (checkout could not start).
    async fn release(&self, id: &ReservationId) -> Result<(), DomainError>;

    /// Drop the reservation once the seat became an active subscription.
    ///
    /// Returns `false` if there was nothing to consume.
    async fn consume(
        &self,
        plan: &Plan,
        user_id: &UserId,
        space_id: &SpaceId,
    ) -> Result<bool, DomainError>;
}
