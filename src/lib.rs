//! Space Billing - subscription and billing reconciliation for a rental-space
//! marketplace.
//!
//! Hosts pay to publish listings. This crate owns the subscription record,
//! founder seat allocation, checkout initiation, Stripe webhook
//! reconciliation, listing visibility follow-up, and MRR/churn analytics.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
