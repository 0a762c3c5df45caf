//! Stripe payment provider adapter.
//!
//! - `StripePaymentAdapter` - REST client for checkout sessions and
//!   subscription cancellation
//! - `MockPaymentProvider` - in-process stand-in with call tracking
//!
//! The API key is held as a `secrecy::SecretString` and only exposed when
//! building the basic-auth header.

mod mock_payment_provider;
mod stripe_adapter;

pub use mock_payment_provider::{MethodCall, MockPaymentProvider};
pub use stripe_adapter::{StripeConfig, StripePaymentAdapter};
