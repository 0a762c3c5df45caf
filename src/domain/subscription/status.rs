//! Subscription status state machine.
//!
//! Two sets of edges live here. The user-facing edges (`StateMachine`) are
//! what `activate`/`suspend`/`cancel` obey. The reconciliation edges
//! (`can_be_forced_to`) are what provider events obey: the provider states an
//! absolute status and we adopt it, except that `Cancelled` never reopens.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{StateMachine, ValidationError};

/// Lifecycle status of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Free trial, nothing charged yet.
    Trial,

    /// Paid and in good standing.
    Active,

    /// Payment failed; listing hidden until the next successful invoice.
    Suspended,

    /// Terminal. The row is kept for history and analytics.
    Cancelled,
}

impl SubscriptionStatus {
    pub const ALL: [SubscriptionStatus; 4] = [
        SubscriptionStatus::Trial,
        SubscriptionStatus::Active,
        SubscriptionStatus::Suspended,
        SubscriptionStatus::Cancelled,
    ];

    /// Storage and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Suspended => "suspended",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }

    /// Whether a provider event may set this record to `target`.
    ///
    /// Any live status can be overwritten by an absolute provider state.
    /// A cancelled record only accepts `Cancelled` again.
    pub fn can_be_forced_to(&self, target: &Self) -> bool {
        *self != SubscriptionStatus::Cancelled || *target == SubscriptionStatus::Cancelled
    }
}

impl StateMachine for SubscriptionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, target),
            (Trial, Active)
                | (Suspended, Active)
                | (Active, Suspended)
                | (Active, Cancelled)
                | (Suspended, Cancelled)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            Trial => vec![Active],
            Active => vec![Suspended, Cancelled],
            Suspended => vec![Active, Cancelled],
            Cancelled => vec![],
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trial" => Ok(SubscriptionStatus::Trial),
            "active" => Ok(SubscriptionStatus::Active),
            "suspended" => Ok(SubscriptionStatus::Suspended),
            "cancelled" | "canceled" => Ok(SubscriptionStatus::Cancelled),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown subscription status '{}'", other),
            )),
        }
    }
}
