//! PostgreSQL access to the `users.stripe_customer_id` column.

use async_trait::async_trait;
use sqlx::PgPool;

use super::db_error;
use crate::domain::foundation::{DomainError, ErrorCode, UserId};
use crate::ports::UserAccounts;

pub struct PostgresUserAccounts {
    pool: PgPool,
}

impl PostgresUserAccounts {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserAccounts for PostgresUserAccounts {
    async fn attach_customer_id(
        &self,
        user_id: &UserId,
        customer_id: &str,
    ) -> Result<(), DomainError> {
        let result = sqlx::query("UPDATE users SET stripe_customer_id = $2 WHERE id = $1")
            .bind(user_id.as_str())
            .bind(customer_id)
            .execute(&self.pool)
            .await
            .map_err(db_error("attach customer id"))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::UserNotFound,
                format!("User not found: {}", user_id),
            ));
        }
        Ok(())
    }
}
