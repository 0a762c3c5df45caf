//! PostgreSQL view of the marketplace `listings` table.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::db_error;
use crate::domain::foundation::{DomainError, ErrorCode, SpaceId, UserId};
use crate::domain::listing::{Listing, ListingVisibility};
use crate::ports::ListingDirectory;

pub struct PostgresListingDirectory {
    pool: PgPool,
}

impl PostgresListingDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ListingRow {
    id: Uuid,
    owner_id: String,
    status: String,
}

impl TryFrom<ListingRow> for Listing {
    type Error = DomainError;

    fn try_from(row: ListingRow) -> Result<Self, Self::Error> {
        let owner_id = UserId::new(row.owner_id).map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid owner_id: {}", e))
        })?;
        let visibility: ListingVisibility = row.status.parse().map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid status: {}", e))
        })?;

        Ok(Listing {
            id: SpaceId::from_uuid(row.id),
            owner_id,
            visibility,
        })
    }
}

#[async_trait]
impl ListingDirectory for PostgresListingDirectory {
    async fn find_listing(&self, space_id: &SpaceId) -> Result<Option<Listing>, DomainError> {
        let row: Option<ListingRow> =
            sqlx::query_as("SELECT id, owner_id, status FROM listings WHERE id = $1")
                .bind(space_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("fetch listing"))?;

        row.map(Listing::try_from).transpose()
    }

    async fn set_visibility(
        &self,
        space_id: &SpaceId,
        visibility: ListingVisibility,
    ) -> Result<(), DomainError> {
        let result =
            sqlx::query("UPDATE listings SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(space_id.as_uuid())
                .bind(visibility.as_str())
                .execute(&self.pool)
                .await
                .map_err(db_error("update listing status"))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::ListingNotFound,
                format!("Listing not found: {}", space_id),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_row_parses_status() {
        let row = ListingRow {
            id: Uuid::new_v4(),
            owner_id: "host-1".to_string(),
            status: "suspended".to_string(),
        };

        let listing = Listing::try_from(row).unwrap();
        assert_eq!(listing.visibility, ListingVisibility::Suspended);
    }

    #[test]
    fn listing_row_rejects_unknown_status() {
        let row = ListingRow {
            id: Uuid::new_v4(),
            owner_id: "host-1".to_string(),
            status: "archived".to_string(),
        };

        assert!(Listing::try_from(row).is_err());
    }
}
