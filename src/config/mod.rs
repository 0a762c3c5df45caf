//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables with the
//! `config` and `dotenvy` crates. Variables use the `SPACE_BILLING` prefix
//! and `__` between nested keys.
//!
//! # Example
//!
//! ```no_run
//! use space_billing::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod billing;
mod database;
mod error;
mod payment;
mod server;

pub use billing::BillingConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use payment::PaymentConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    pub database: DatabaseConfig,

    pub payment: PaymentConfig,

    #[serde(default)]
    pub billing: BillingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// 1. Loads `.env` if present (development)
    /// 2. Reads variables with the `SPACE_BILLING` prefix
    /// 3. Splits nested keys on `__`
    ///
    /// - `SPACE_BILLING__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `SPACE_BILLING__BILLING__FOUNDER_MAX_SEATS=50` -> `billing.founder_max_seats = 50`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or values
    /// cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("SPACE_BILLING")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns the first `ValidationError` found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.payment.validate()?;
        self.billing.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Env vars are process-global
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[(&str, &str)] = &[
        ("SPACE_BILLING__DATABASE__URL", "postgresql://test@localhost/billing"),
        ("SPACE_BILLING__PAYMENT__STRIPE_API_KEY", "sk_test_xxx"),
        ("SPACE_BILLING__PAYMENT__STRIPE_WEBHOOK_SECRET", "whsec_xxx"),
        ("SPACE_BILLING__BILLING__FOUNDER_PRICE_ID", "price_founder"),
        ("SPACE_BILLING__BILLING__NORMAL_PRICE_ID", "price_normal"),
        ("SPACE_BILLING__BILLING__ACTIVATION_PRICE_ID", "price_activation"),
        ("SPACE_BILLING__BILLING__CHECKOUT_SUCCESS_URL", "https://app.test/success"),
        ("SPACE_BILLING__BILLING__CHECKOUT_CANCEL_URL", "https://app.test/cancel"),
    ];

    const OPTIONAL: &[&str] = &[
        "SPACE_BILLING__SERVER__PORT",
        "SPACE_BILLING__SERVER__ENVIRONMENT",
        "SPACE_BILLING__BILLING__FOUNDER_MAX_SEATS",
    ];

    fn set_minimal_env() {
        for (key, value) in VARS {
            env::set_var(key, value);
        }
    }

    fn clear_env() {
        for (key, _) in VARS {
            env::remove_var(key);
        }
        for key in OPTIONAL {
            env::remove_var(key);
        }
    }

    fn load_with(extra: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        set_minimal_env();
        for (key, value) in extra {
            env::set_var(key, value);
        }
        let result = AppConfig::load();
        clear_env();
        result
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let config = load_with(&[]).unwrap();

        assert_eq!(config.database.url, "postgresql://test@localhost/billing");
        assert_eq!(config.billing.normal_price_id, "price_normal");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_apply() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let config = load_with(&[]).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.environment, Environment::Development);
        assert_eq!(config.billing.founder_max_seats, 100);
        assert_eq!(config.payment.webhook_tolerance_secs, 300);
    }

    #[test]
    fn test_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let config = load_with(&[
            ("SPACE_BILLING__SERVER__PORT", "3000"),
            ("SPACE_BILLING__SERVER__ENVIRONMENT", "production"),
            ("SPACE_BILLING__BILLING__FOUNDER_MAX_SEATS", "25"),
        ])
        .unwrap();

        assert_eq!(config.server.port, 3000);
        assert!(config.is_production());
        assert_eq!(config.billing.founder_max_seats, 25);
    }

    #[test]
    fn test_missing_database_fails_to_load() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::remove_var("SPACE_BILLING__DATABASE__URL");
        let result = AppConfig::load();
        clear_env();

        assert!(result.is_err());
    }
}
