//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `http` - Axum REST API and the Stripe webhook endpoint
//! - `memory` - In-process implementations for tests and local runs
//! - `postgres` - sqlx-backed persistence
//! - `stripe` - Payment provider client

pub mod http;
pub mod memory;
pub mod postgres;
pub mod stripe;
