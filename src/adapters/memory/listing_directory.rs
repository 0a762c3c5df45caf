use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, SpaceId};
use crate::domain::listing::{Listing, ListingVisibility};
use crate::ports::ListingDirectory;

/// Listings keyed by space id.
#[derive(Default)]
pub struct InMemoryListingDirectory {
    listings: RwLock<HashMap<SpaceId, Listing>>,
    fail_updates: AtomicBool,
}

impl InMemoryListingDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, listing: Listing) {
        self.listings.write().await.insert(listing.id, listing);
    }

    pub async fn visibility_of(&self, space_id: &SpaceId) -> Option<ListingVisibility> {
        self.listings
            .read()
            .await
            .get(space_id)
            .map(|l| l.visibility)
    }

    /// Make every `set_visibility` call fail (simulates the listing store being down).
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ListingDirectory for InMemoryListingDirectory {
    async fn find_listing(&self, space_id: &SpaceId) -> Result<Option<Listing>, DomainError> {
        Ok(self.listings.read().await.get(space_id).cloned())
    }

    async fn set_visibility(
        &self,
        space_id: &SpaceId,
        visibility: ListingVisibility,
    ) -> Result<(), DomainError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(DomainError::database("listing store unavailable"));
        }
        let mut listings = self.listings.write().await;
        let listing = listings.get_mut(space_id).ok_or_else(|| {
            DomainError::new(ErrorCode::ListingNotFound, "Listing not found")
                .with_detail("space_id", space_id.to_string())
        })?;
        listing.visibility = visibility;
        Ok(())
    }
}
