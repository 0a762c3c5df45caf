//! Listing view owned by the marketplace CRUD layer.
//!
//! Billing only reads a listing's owner and writes its visibility; the rest
//! of the listing lives elsewhere.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{OwnedByUser, SpaceId, UserId, ValidationError};

/// Visibility of a listing in search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingVisibility {
    /// Created but never paid for.
    Pending,
    Active,
    Suspended,
}

impl ListingVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingVisibility::Pending => "pending",
            ListingVisibility::Active => "active",
            ListingVisibility::Suspended => "suspended",
        }
    }
}

impl fmt::Display for ListingVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingVisibility {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ListingVisibility::Pending),
            "active" => Ok(ListingVisibility::Active),
            "suspended" => Ok(ListingVisibility::Suspended),
            other => Err(ValidationError::invalid_format(
                "listing_status",
                format!("unknown listing status '{}'", other),
            )),
        }
    }
}

/// The slice of a listing that billing needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub id: SpaceId,
    pub owner_id: UserId,
    pub visibility: ListingVisibility,
}

impl OwnedByUser for Listing {
    fn owner_id(&self) -> &UserId {
        &self.owner_id
    }
}

/// A visibility update implied by a committed subscription change.
///
/// Produced after the financial write and applied afterwards, so a failure
/// to apply it never rolls back billing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityChange {
    pub space_id: SpaceId,
    pub target: ListingVisibility,
}

impl VisibilityChange {
    pub fn activate(space_id: SpaceId) -> Self {
        Self {
            space_id,
            target: ListingVisibility::Active,
        }
    }

    pub fn suspend(space_id: SpaceId) -> Self {
        Self {
            space_id,
            target: ListingVisibility::Suspended,
        }
    }
}
