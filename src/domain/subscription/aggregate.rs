//! Subscription aggregate entity.
//!
//! One row per subscription, never deleted. Status moves only through the
//! methods below; provider-driven changes go through `force_status`.
//!
//! # Design Decisions
//!
//! - **Money in cents**: `price_cents` is an `i64` in the currency's minor unit
//! - **Soft uniqueness**: one live subscription per (user, space) is checked by
//!   the creating handler, not by the aggregate
//! - **Checkout dedupe**: `checkout_session_id` is unique in storage

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    DomainError, ErrorCode, OwnedByUser, SpaceId, StateMachine, SubscriptionId, Timestamp,
    UserId,
};
use crate::domain::listing::VisibilityChange;

use super::plan::{Plan, MIN_PLAN_LEN};
use super::SubscriptionStatus;

/// Days between a recurring checkout and its first renewal.
pub const BILLING_CYCLE_DAYS: i64 = 30;

/// Subscription aggregate.
///
/// # Invariants
///
/// - `price_cents > 0` and `plan` has at least three characters, checked on
///   construction and before every mutation
/// - `status` follows `SubscriptionStatus` edges; `Cancelled` is terminal
/// - `updated_at` advances on every change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: UserId,

    /// Listing this subscription keeps visible.
    pub space_id: Option<SpaceId>,

    pub plan: Plan,
    pub price_cents: i64,
    pub status: SubscriptionStatus,

    /// Provider subscription reference (`sub_...`). Join key for invoices.
    pub external_subscription_id: Option<String>,

    /// Provider customer reference (`cus_...`).
    pub external_customer_id: Option<String>,

    /// Provider checkout session that created this record (`cs_...`).
    pub checkout_session_id: Option<String>,

    pub trial_until: Option<Timestamp>,
    pub next_billing_date: Option<Timestamp>,

    /// Still active, but will not renew.
    pub cancel_at_period_end: bool,

    pub coupon_code: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub cancelled_at: Option<Timestamp>,
}

impl Subscription {
    /// Starts a free trial.
    ///
    /// # Errors
    ///
    /// Validation error for a non-positive price or a trial end not in the future.
    pub fn new_trial(
        user_id: UserId,
        space_id: Option<SpaceId>,
        plan: Plan,
        price_cents: i64,
        trial_until: Timestamp,
    ) -> Result<Self, DomainError> {
        let mut subscription =
            Self::build(user_id, space_id, plan, price_cents, SubscriptionStatus::Trial)?;
        if !trial_until.is_after(&subscription.created_at) {
            return Err(DomainError::validation(
                "trial_until",
                "Trial end must be in the future",
            ));
        }
        subscription.trial_until = Some(trial_until);
        Ok(subscription)
    }

    /// Creates a paid subscription, already active.
    ///
    /// # Errors
    ///
    /// Validation error for a non-positive price.
    pub fn new_active(
        user_id: UserId,
        space_id: Option<SpaceId>,
        plan: Plan,
        price_cents: i64,
    ) -> Result<Self, DomainError> {
        Self::build(user_id, space_id, plan, price_cents, SubscriptionStatus::Active)
    }

    fn build(
        user_id: UserId,
        space_id: Option<SpaceId>,
        plan: Plan,
        price_cents: i64,
        status: SubscriptionStatus,
    ) -> Result<Self, DomainError> {
        validate_price(price_cents)?;
        let now = Timestamp::now();
        Ok(Self {
            id: SubscriptionId::new(),
            user_id,
            space_id,
            plan,
            price_cents,
            status,
            external_subscription_id: None,
            external_customer_id: None,
            checkout_session_id: None,
            trial_until: None,
            next_billing_date: None,
            cancel_at_period_end: false,
            coupon_code: None,
            created_at: now,
            updated_at: now,
            cancelled_at: None,
        })
    }

    pub fn with_checkout_session(mut self, session_id: impl Into<String>) -> Self {
        self.checkout_session_id = Some(session_id.into());
        self
    }

    pub fn with_external_subscription(mut self, subscription_id: impl Into<String>) -> Self {
        self.external_subscription_id = Some(subscription_id.into());
        self
    }

    pub fn with_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.external_customer_id = Some(customer_id.into());
        self
    }

    pub fn with_coupon(mut self, coupon_code: impl Into<String>) -> Self {
        self.coupon_code = Some(coupon_code.into());
        self
    }

    /// Activate from `trial` or `suspended`.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` naming the current status otherwise.
    pub fn activate(&mut self) -> Result<(), DomainError> {
        self.transition(SubscriptionStatus::Active, "activate")
    }

    /// Suspend an active subscription. Already suspended is a no-op.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` from `trial` or `cancelled`.
    pub fn suspend(&mut self) -> Result<(), DomainError> {
        if self.status == SubscriptionStatus::Suspended {
            return Ok(());
        }
        self.transition(SubscriptionStatus::Suspended, "suspend")
    }

    /// Cancel for good. No transition leaves `cancelled`.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` from `trial` or `cancelled`.
    pub fn cancel(&mut self) -> Result<(), DomainError> {
        self.transition(SubscriptionStatus::Cancelled, "cancel")?;
        self.cancelled_at = Some(self.updated_at);
        Ok(())
    }

    /// Change plan and price without touching status.
    ///
    /// # Errors
    ///
    /// Validation error for a bad plan or price; `InvalidStateTransition` once cancelled.
    pub fn change_plan(
        &mut self,
        plan: impl Into<String>,
        price_cents: i64,
    ) -> Result<(), DomainError> {
        self.ensure_mutable("change plan")?;
        let plan = Plan::new(plan)?;
        validate_price(price_cents)?;

        self.plan = plan;
        self.price_cents = price_cents;
        self.touch();
        Ok(())
    }

    /// Set the next renewal date.
    ///
    /// # Errors
    ///
    /// Validation error when `date` is not strictly after now.
    pub fn update_billing_date(&mut self, date: Timestamp) -> Result<(), DomainError> {
        self.ensure_mutable("update billing date of")?;
        if !date.is_after(&Timestamp::now()) {
            return Err(DomainError::validation(
                "next_billing_date",
                "Next billing date must be in the future",
            ));
        }

        self.next_billing_date = Some(date);
        self.touch();
        Ok(())
    }

    /// Toggle renewal at period end. Status is unchanged.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` once cancelled.
    pub fn set_cancellation(&mut self, cancel_at_period_end: bool) -> Result<(), DomainError> {
        self.ensure_mutable("schedule cancellation of")?;
        self.cancel_at_period_end = cancel_at_period_end;
        self.touch();
        Ok(())
    }

    /// Turn this trial, running or lapsed, into the paid subscription a
    /// completed checkout bought. `paid` carries the checkout's terms.
    ///
    /// The row keeps its id, owner and `trial_until`; plan, price and the
    /// provider references come from `paid`.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` when this record is not an unpaid trial.
    pub fn convert_trial(&mut self, paid: &Subscription) -> Result<(), DomainError> {
        if !self.is_unpaid_trial() {
            return Err(self.transition_error("convert trial of"));
        }
        validate_price(paid.price_cents)?;

        self.activate()?;
        self.plan = paid.plan.clone();
        self.price_cents = paid.price_cents;
        self.checkout_session_id = paid.checkout_session_id.clone();
        self.external_subscription_id = paid.external_subscription_id.clone();
        self.next_billing_date = paid.next_billing_date;
        if paid.external_customer_id.is_some() {
            self.external_customer_id = paid.external_customer_id.clone();
        }
        if paid.coupon_code.is_some() {
            self.coupon_code = paid.coupon_code.clone();
        }
        Ok(())
    }

    /// End a running trial without payment. The record is suspended and can
    /// still be activated by a later checkout.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` unless the status is `trial`.
    pub fn end_trial(&mut self) -> Result<(), DomainError> {
        if self.status != SubscriptionStatus::Trial {
            return Err(self.transition_error("end trial of"));
        }
        self.force_status(SubscriptionStatus::Suspended)?;
        Ok(())
    }

    /// Whether a running trial has reached `trial_until` at `now`.
    pub fn trial_lapsed(&self, now: &Timestamp) -> bool {
        self.status == SubscriptionStatus::Trial
            && self.trial_until.is_some_and(|until| !until.is_after(now))
    }

    /// A trial row no checkout has paid for yet, whether running or lapsed.
    pub fn is_unpaid_trial(&self) -> bool {
        self.trial_until.is_some()
            && self.checkout_session_id.is_none()
            && self.external_subscription_id.is_none()
            && matches!(
                self.status,
                SubscriptionStatus::Trial | SubscriptionStatus::Suspended
            )
    }

    /// Adopt an absolute status reported by the payment provider.
    ///
    /// Returns `Ok(false)` when the record already has `target`, which makes
    /// redelivered events converge without another write.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` when a cancelled record would reopen.
    pub fn force_status(&mut self, target: SubscriptionStatus) -> Result<bool, DomainError> {
        self.check_invariants()?;
        if self.status == target {
            return Ok(false);
        }
        if !self.status.can_be_forced_to(&target) {
            return Err(self.transition_error(&format!("reconcile to {}", target)));
        }

        self.status = target;
        self.touch();
        if target == SubscriptionStatus::Cancelled {
            self.cancelled_at = Some(self.updated_at);
        }
        Ok(true)
    }

    /// Listing visibility implied by the current status, if a listing is attached.
    pub fn visibility_change(&self) -> Option<VisibilityChange> {
        let space_id = self.space_id?;
        Some(match self.status {
            SubscriptionStatus::Trial | SubscriptionStatus::Active => {
                VisibilityChange::activate(space_id)
            }
            SubscriptionStatus::Suspended | SubscriptionStatus::Cancelled => {
                VisibilityChange::suspend(space_id)
            }
        })
    }

    /// Whether this record still occupies its listing.
    pub fn is_live(&self) -> bool {
        self.status != SubscriptionStatus::Cancelled
    }

    fn transition(&mut self, target: SubscriptionStatus, attempted: &str) -> Result<(), DomainError> {
        self.check_invariants()?;
        self.status = self
            .status
            .transition_to(target)
            .map_err(|_| self.transition_error(attempted))?;
        self.touch();
        Ok(())
    }

    fn ensure_mutable(&self, attempted: &str) -> Result<(), DomainError> {
        self.check_invariants()?;
        if self.status.is_terminal() {
            return Err(self.transition_error(attempted));
        }
        Ok(())
    }

    fn check_invariants(&self) -> Result<(), DomainError> {
        if self.plan.as_str().chars().count() < MIN_PLAN_LEN {
            return Err(DomainError::validation(
                "plan",
                format!("Plan must be at least {} characters", MIN_PLAN_LEN),
            ));
        }
        validate_price(self.price_cents)
    }

    fn transition_error(&self, attempted: &str) -> DomainError {
        DomainError::new(
            ErrorCode::InvalidStateTransition,
            format!(
                "Cannot {} subscription in {} state",
                attempted, self.status
            ),
        )
        .with_detail("current", self.status.as_str())
        .with_detail("attempted", attempted)
    }

    fn touch(&mut self) {
        let now = Timestamp::now();
        // Two mutations inside one clock tick must still move forward.
        self.updated_at = if now.is_after(&self.updated_at) {
            now
        } else {
            Timestamp::from_datetime(*self.updated_at.as_datetime() + chrono::Duration::microseconds(1))
        };
    }
}

impl OwnedByUser for Subscription {
    fn owner_id(&self) -> &UserId {
        &self.user_id
    }
}

fn validate_price(price_cents: i64) -> Result<(), DomainError> {
    if price_cents <= 0 {
        return Err(DomainError::validation(
            "price_cents",
            format!("Price must be positive, got {}", price_cents),
        ));
    }
    Ok(())
}
