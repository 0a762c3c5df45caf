//! Plan identifiers and checkout modes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::ValidationError;

/// Minimum length of a plan identifier.
pub const MIN_PLAN_LEN: usize = 3;

/// Short plan identifier such as `founder`, `normal` or `activation`.
///
/// Unknown identifiers are allowed so that plans configured at the provider
/// can be mirrored without a code change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Plan(String);

impl Plan {
    pub const FOUNDER: &'static str = "founder";
    pub const NORMAL: &'static str = "normal";
    pub const ACTIVATION: &'static str = "activation";

    /// Validates and wraps a plan identifier.
    pub fn new(plan: impl Into<String>) -> Result<Self, ValidationError> {
        let plan = plan.into().trim().to_lowercase();
        if plan.is_empty() {
            return Err(ValidationError::empty_field("plan"));
        }
        if plan.chars().count() < MIN_PLAN_LEN {
            return Err(ValidationError::invalid_format(
                "plan",
                format!("must be at least {} characters", MIN_PLAN_LEN),
            ));
        }
        Ok(Self(plan))
    }

    pub fn founder() -> Self {
        Self(Self::FOUNDER.to_string())
    }

    pub fn normal() -> Self {
        Self(Self::NORMAL.to_string())
    }

    pub fn activation() -> Self {
        Self(Self::ACTIVATION.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Capacity-limited promotional plan.
    pub fn is_founder(&self) -> bool {
        self.0 == Self::FOUNDER
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Plan {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Plan::new(value)
    }
}

impl From<Plan> for String {
    fn from(plan: Plan) -> Self {
        plan.0
    }
}

/// Billing interval requested at checkout.
///
/// No interval means the one-time activation fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    OneTime,
    Monthly,
}

impl BillingInterval {
    pub fn checkout_mode(self) -> CheckoutMode {
        match self {
            BillingInterval::OneTime => CheckoutMode::OneTime,
            BillingInterval::Monthly => CheckoutMode::Recurring,
        }
    }
}

/// Shape of the provider checkout session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMode {
    /// Single charge (`payment` at the provider).
    OneTime,
    /// Recurring charge (`subscription` at the provider).
    Recurring,
}

impl CheckoutMode {
    /// Provider-side mode name.
    pub fn as_provider_str(&self) -> &'static str {
        match self {
            CheckoutMode::OneTime => "payment",
            CheckoutMode::Recurring => "subscription",
        }
    }

    pub fn from_provider_str(mode: &str) -> Option<Self> {
        match mode {
            "payment" => Some(CheckoutMode::OneTime),
            "subscription" => Some(CheckoutMode::Recurring),
            _ => None,
        }
    }
}
