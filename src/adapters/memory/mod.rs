//! In-memory implementations of every port.
//!
//! Used by unit and integration tests and by local runs without Postgres.
//! Locks are `tokio::sync` locks, so they never poison.

mod listing_directory;
mod seat_reservations;
mod subscription_repository;
mod user_accounts;
mod webhook_event_repository;

pub use listing_directory::InMemoryListingDirectory;
pub use seat_reservations::InMemorySeatReservations;
pub use subscription_repository::InMemorySubscriptionRepository;
pub use user_accounts::InMemoryUserAccounts;
pub use webhook_event_repository::InMemoryWebhookEventRepository;
