//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Following CQRS, it separates command handlers (write) from query handlers (read).

pub mod handlers;
pub mod listing_sync;
pub mod plan_allocator;
pub mod trial_expiry;

pub use listing_sync::{ListingSyncError, ListingVisibilityCoordinator};
pub use plan_allocator::{PlanAllocation, PlanAllocator, PlanCatalog, PlanOffer};
pub use trial_expiry::TrialExpiry;
