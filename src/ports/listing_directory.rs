//! Listing directory port.
//!
//! Listings belong to the marketplace CRUD layer; billing reads their
//! ownership and writes their visibility.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, SpaceId};
use crate::domain::listing::{Listing, ListingVisibility};

#[async_trait]
pub trait ListingDirectory: Send + Sync {
    async fn find_listing(&self, space_id: &SpaceId) -> Result<Option<Listing>, DomainError>;

    /// # Errors
    ///
    /// - `ListingNotFound` if the listing doesn't exist
    async fn set_visibility(
        &self,
        space_id: &SpaceId,
        visibility: ListingVisibility,
    ) -> Result<(), DomainError>;
}
