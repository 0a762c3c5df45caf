//! User account port: the one user field billing writes.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, UserId};

#[async_trait]
pub trait UserAccounts: Send + Sync {
    /// Remember the provider customer reference on the user record.
    ///
    /// # Errors
    ///
    /// - `UserNotFound` if the user doesn't exist
    async fn attach_customer_id(&self, user_id: &UserId, customer_id: &str)
        -> Result<(), DomainError>;
}
