//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresSubscriptionRepository` - Subscription rows, row-locked modification
//! - `PostgresSeatReservations` - Plan-locked seat counting
//! - `PostgresWebhookEventRepository` - Webhook idempotency ledger
//! - `PostgresListingDirectory` - Listing owner and visibility
//! - `PostgresUserAccounts` - Provider customer reference on users

mod listing_directory;
mod seat_reservations;
mod subscription_repository;
mod user_accounts;
mod webhook_event_repository;

pub use listing_directory::PostgresListingDirectory;
pub use seat_reservations::PostgresSeatReservations;
pub use subscription_repository::PostgresSubscriptionRepository;
pub use user_accounts::PostgresUserAccounts;
pub use webhook_event_repository::PostgresWebhookEventRepository;

use crate::domain::foundation::DomainError;

/// Maps a sqlx error to a `DatabaseError` naming the failed action.
fn db_error(action: &'static str) -> impl Fn(sqlx::Error) -> DomainError {
    move |e| DomainError::database(format!("Failed to {}: {}", action, e))
}
