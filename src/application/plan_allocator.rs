//! Plan allocation for new checkouts.
//!
//! Recurring checkouts get the founder plan while founder seats remain and
//! the standard plan afterwards. A founder seat is claimed through
//! `SeatReservations`, which counts and claims in one atomic step, so two
//! hosts racing for the last seat cannot both get it.

use std::sync::Arc;

use crate::domain::foundation::{DomainError, SpaceId, Timestamp, UserId};
use crate::domain::subscription::{BillingInterval, CheckoutMode, Plan};
use crate::ports::{SeatRequest, SeatReservation, SeatReservations};

/// A plan as sold: list price and provider price reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOffer {
    pub plan: Plan,
    pub price_cents: i64,
    pub price_id: String,
}

/// Plans on sale and the founder seat policy.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    pub founder: PlanOffer,
    pub normal: PlanOffer,
    pub activation: PlanOffer,
    pub founder_max_seats: u32,
    /// How long an unfinished founder checkout holds its seat.
    pub seat_hold_minutes: i64,
}

impl PlanCatalog {
    pub fn offer(&self, plan: &Plan) -> Option<&PlanOffer> {
        [&self.founder, &self.normal, &self.activation]
            .into_iter()
            .find(|offer| &offer.plan == plan)
    }
}

/// Outcome of allocating a plan for one checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanAllocation {
    /// Founder seat held until the checkout completes or the hold expires.
    Founder {
        offer: PlanOffer,
        reservation: SeatReservation,
    },
    Standard { offer: PlanOffer },
    /// One-time activation fee.
    Activation { offer: PlanOffer },
}

impl PlanAllocation {
    pub fn offer(&self) -> &PlanOffer {
        match self {
            PlanAllocation::Founder { offer, .. }
            | PlanAllocation::Standard { offer }
            | PlanAllocation::Activation { offer } => offer,
        }
    }

    pub fn reservation(&self) -> Option<&SeatReservation> {
        match self {
            PlanAllocation::Founder { reservation, .. } => Some(reservation),
            _ => None,
        }
    }

    pub fn checkout_mode(&self) -> CheckoutMode {
        match self {
            PlanAllocation::Activation { .. } => CheckoutMode::OneTime,
            _ => CheckoutMode::Recurring,
        }
    }
}

pub struct PlanAllocator {
    seats: Arc<dyn SeatReservations>,
    catalog: PlanCatalog,
}

impl PlanAllocator {
    pub fn new(seats: Arc<dyn SeatReservations>, catalog: PlanCatalog) -> Self {
        Self { seats, catalog }
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    /// Pick the plan for a checkout.
    ///
    /// `None` and `OneTime` buy the activation fee; `Monthly` buys a
    /// recurring plan.
    ///
    /// # Errors
    ///
    /// Storage errors from the seat reservation.
    pub async fn allocate(
        &self,
        user_id: &UserId,
        space_id: &SpaceId,
        interval: Option<BillingInterval>,
    ) -> Result<PlanAllocation, DomainError> {
        let interval = interval.unwrap_or(BillingInterval::OneTime);
        if interval.checkout_mode() == CheckoutMode::OneTime {
            return Ok(PlanAllocation::Activation {
                offer: self.catalog.activation.clone(),
            });
        }

        if self.catalog.founder_max_seats == 0 {
            return Ok(self.standard());
        }

        let request = SeatRequest {
            plan: self.catalog.founder.plan.clone(),
            user_id: user_id.clone(),
            space_id: *space_id,
            capacity: self.catalog.founder_max_seats,
            expires_at: Timestamp::now().add_minutes(self.catalog.seat_hold_minutes),
        };

        match self.seats.try_reserve(request).await? {
            Some(reservation) => {
                tracing::info!(
                    user_id = %user_id,
                    space_id = %space_id,
                    reservation_id = %reservation.id,
                    "Founder seat reserved"
                );
                Ok(PlanAllocation::Founder {
                    offer: self.catalog.founder.clone(),
                    reservation,
                })
            }
            None => {
                tracing::info!(
                    user_id = %user_id,
                    space_id = %space_id,
                    "Founder seats exhausted, allocating standard plan"
                );
                Ok(self.standard())
            }
        }
    }

    /// Give back a founder seat whose checkout never started.
    pub async fn release(&self, allocation: &PlanAllocation) {
        let Some(reservation) = allocation.reservation() else {
            return;
        };
        if let Err(e) = self.seats.release(&reservation.id).await {
            // The hold expires on its own.
            tracing::warn!(
                reservation_id = %reservation.id,
                error = %e,
                "Failed to release founder seat"
            );
        }
    }

    fn standard(&self) -> PlanAllocation {
        PlanAllocation::Standard {
            offer: self.catalog.normal.clone(),
        }
    }
}
