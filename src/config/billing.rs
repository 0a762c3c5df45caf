//! Billing configuration: plans on sale, founder seats, checkout redirects
//! and webhook handling limits.

use serde::Deserialize;
use std::time::Duration;

use crate::application::handlers::subscription::CheckoutUrls;
use crate::application::{PlanCatalog, PlanOffer};
use crate::domain::subscription::Plan;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Founder plan capacity; 0 disables the founder offer
    #[serde(default = "default_founder_max_seats")]
    pub founder_max_seats: u32,

    /// How long an unfinished founder checkout holds its seat
    #[serde(default = "default_seat_hold_minutes")]
    pub seat_hold_minutes: i64,

    #[serde(default = "default_founder_price")]
    pub founder_price_cents: i64,
    #[serde(default)]
    pub founder_price_id: String,

    #[serde(default = "default_normal_price")]
    pub normal_price_cents: i64,
    #[serde(default)]
    pub normal_price_id: String,

    #[serde(default = "default_activation_price")]
    pub activation_price_cents: i64,
    #[serde(default)]
    pub activation_price_id: String,

    #[serde(default)]
    pub checkout_success_url: String,
    #[serde(default)]
    pub checkout_cancel_url: String,

    #[serde(default = "default_trial_days")]
    pub trial_days: i64,

    /// Upper bound on reconciling one webhook delivery
    #[serde(default = "default_webhook_deadline")]
    pub webhook_deadline_secs: u64,

    /// Processed-event ledger entries older than this are pruned at startup
    #[serde(default = "default_webhook_retention")]
    pub webhook_retention_days: i64,
}

impl BillingConfig {
    pub fn plan_catalog(&self) -> PlanCatalog {
        PlanCatalog {
            founder: PlanOffer {
                plan: Plan::founder(),
                price_cents: self.founder_price_cents,
                price_id: self.founder_price_id.clone(),
            },
            normal: PlanOffer {
                plan: Plan::normal(),
                price_cents: self.normal_price_cents,
                price_id: self.normal_price_id.clone(),
            },
            activation: PlanOffer {
                plan: Plan::activation(),
                price_cents: self.activation_price_cents,
                price_id: self.activation_price_id.clone(),
            },
            founder_max_seats: self.founder_max_seats,
            seat_hold_minutes: self.seat_hold_minutes,
        }
    }

    pub fn checkout_urls(&self) -> CheckoutUrls {
        CheckoutUrls {
            success_url: self.checkout_success_url.clone(),
            cancel_url: self.checkout_cancel_url.clone(),
        }
    }

    pub fn webhook_deadline(&self) -> Duration {
        Duration::from_secs(self.webhook_deadline_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let prices = [
            ("founder", self.founder_price_cents, &self.founder_price_id, "BILLING__FOUNDER_PRICE_ID"),
            ("normal", self.normal_price_cents, &self.normal_price_id, "BILLING__NORMAL_PRICE_ID"),
            (
                "activation",
                self.activation_price_cents,
                &self.activation_price_id,
                "BILLING__ACTIVATION_PRICE_ID",
            ),
        ];
        for (plan, cents, price_id, key) in prices {
            if cents <= 0 {
                return Err(ValidationError::InvalidPrice(plan));
            }
            if price_id.is_empty() {
                return Err(ValidationError::MissingRequired(key));
            }
        }

        check_redirect(&self.checkout_success_url, "BILLING__CHECKOUT_SUCCESS_URL")?;
        check_redirect(&self.checkout_cancel_url, "BILLING__CHECKOUT_CANCEL_URL")?;

        if self.seat_hold_minutes <= 0 {
            return Err(ValidationError::NotPositive("seat_hold_minutes"));
        }
        if self.trial_days <= 0 {
            return Err(ValidationError::NotPositive("trial_days"));
        }
        if self.webhook_retention_days <= 0 {
            return Err(ValidationError::NotPositive("webhook_retention_days"));
        }
        if !(1..=30).contains(&self.webhook_deadline_secs) {
            return Err(ValidationError::InvalidWebhookDeadline);
        }
        Ok(())
    }
}

fn check_redirect(url: &str, key: &'static str) -> Result<(), ValidationError> {
    if url.is_empty() {
        return Err(ValidationError::MissingRequired(key));
    }
    if !url.starts_with("https://") && !url.starts_with("http://") {
        return Err(ValidationError::InvalidRedirectUrl(key));
    }
    Ok(())
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            founder_max_seats: default_founder_max_seats(),
            seat_hold_minutes: default_seat_hold_minutes(),
            founder_price_cents: default_founder_price(),
            founder_price_id: String::new(),
            normal_price_cents: default_normal_price(),
            normal_price_id: String::new(),
            activation_price_cents: default_activation_price(),
            activation_price_id: String::new(),
            checkout_success_url: String::new(),
            checkout_cancel_url: String::new(),
            trial_days: default_trial_days(),
            webhook_deadline_secs: default_webhook_deadline(),
            webhook_retention_days: default_webhook_retention(),
        }
    }
}

fn default_founder_max_seats() -> u32 {
    100
}

fn default_seat_hold_minutes() -> i64 {
    60
}

fn default_founder_price() -> i64 {
    1_900
}

fn default_normal_price() -> i64 {
    2_900
}

fn default_activation_price() -> i64 {
    4_900
}

fn default_trial_days() -> i64 {
    14
}

fn default_webhook_deadline() -> u64 {
    10
}

fn default_webhook_retention() -> i64 {
    90
}
