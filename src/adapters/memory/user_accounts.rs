use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, UserId};
use crate::ports::UserAccounts;

/// Users and their provider customer references.
#[derive(Default)]
pub struct InMemoryUserAccounts {
    customers: RwLock<HashMap<UserId, Option<String>>>,
}

impl InMemoryUserAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user_id: UserId) {
        self.customers.write().await.entry(user_id).or_insert(None);
    }

    pub async fn customer_id_of(&self, user_id: &UserId) -> Option<String> {
        self.customers.read().await.get(user_id).cloned().flatten()
    }
}

#[async_trait]
impl UserAccounts for InMemoryUserAccounts {
    async fn attach_customer_id(
        &self,
        user_id: &UserId,
        customer_id: &str,
    ) -> Result<(), DomainError> {
        let mut customers = self.customers.write().await;
        let slot = customers.get_mut(user_id).ok_or_else(|| {
            DomainError::new(ErrorCode::UserNotFound, "User not found")
                .with_detail("user_id", user_id.to_string())
        })?;
        *slot = Some(customer_id.to_string());
        Ok(())
    }
}
