//! Listing visibility coordinator.
//!
//! Applies the `VisibilityChange`s that committed subscription changes imply.
//! Runs after the billing write; a failure here is logged and swallowed so it
//! can never undo or fail a payment-side update.

use std::sync::Arc;

use thiserror::Error;

use crate::domain::foundation::{DomainError, SpaceId};
use crate::domain::listing::{ListingVisibility, VisibilityChange};
use crate::ports::ListingDirectory;

/// Failure to apply a listing visibility change.
#[derive(Debug, Clone, Error)]
#[error("failed to set listing {space_id} {target}: {source}")]
pub struct ListingSyncError {
    pub space_id: SpaceId,
    pub target: ListingVisibility,
    #[source]
    pub source: DomainError,
}

pub struct ListingVisibilityCoordinator {
    listings: Arc<dyn ListingDirectory>,
}

impl ListingVisibilityCoordinator {
    pub fn new(listings: Arc<dyn ListingDirectory>) -> Self {
        Self { listings }
    }

    /// Set one listing's visibility, reporting the failure to the caller.
    pub async fn try_sync(&self, change: VisibilityChange) -> Result<(), ListingSyncError> {
        self.listings
            .set_visibility(&change.space_id, change.target)
            .await
            .map_err(|source| ListingSyncError {
                space_id: change.space_id,
                target: change.target,
                source,
            })
    }

    /// Best-effort sync. Never fails.
    pub async fn sync(&self, change: VisibilityChange) {
        match self.try_sync(change).await {
            Ok(()) => tracing::info!(
                space_id = %change.space_id,
                visibility = %change.target,
                "Listing visibility synced"
            ),
            Err(e) => tracing::warn!(
                space_id = %e.space_id,
                visibility = %e.target,
                error = %e.source,
                "Listing visibility sync failed"
            ),
        }
    }

    /// Apply changes in order; the last change for a listing wins.
    pub async fn apply_all(&self, changes: &[VisibilityChange]) {
        for change in changes {
            self.sync(*change).await;
        }
    }
}
