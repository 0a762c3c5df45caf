//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Storage Ports
//!
//! - `SubscriptionRepository` - Subscription rows with row-locked modification
//! - `SeatReservations` - Atomic seat claims for capacity-limited plans
//! - `WebhookEventRepository` - Stripe webhook idempotency ledger
//!
//! ## Collaborator Ports
//!
//! - `PaymentProvider` - Hosted checkout and provider subscription control
//! - `ListingDirectory` - Listing ownership and visibility
//! - `UserAccounts` - Provider customer reference on the user record

mod listing_directory;
mod payment_provider;
mod seat_reservations;
mod subscription_repository;
mod user_accounts;
mod webhook_event_repository;

pub use listing_directory::ListingDirectory;
pub use payment_provider::{
    CheckoutSession, CreateCheckoutRequest, PaymentError, PaymentErrorCode, PaymentProvider,
};
pub use seat_reservations::{SeatRequest, SeatReservation, SeatReservations};
pub use subscription_repository::{Modified, SubscriptionMutation, SubscriptionRepository};
pub use user_accounts::UserAccounts;
pub use webhook_event_repository::{SaveResult, WebhookEventRecord, WebhookEventRepository};
