//! In-memory gateways backing `AppState::fake()`.

use axum::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::repo::{ResetStore, StoreError, UserStore};
use super::repo_types::{PasswordReset, User};

#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<Vec<User>>,
    resets: RwLock<Vec<PasswordReset>>,
}

impl MemoryStore {
    pub async fn users(&self) -> Vec<User> {
        self.users.read().await.clone()
    }

    pub async fn resets(&self) -> Vec<PasswordReset> {
        self.resets.read().await.clone()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.iter().find(|u| u.id == id).cloned())
    }

    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        // mirrors the UNIQUE (email) constraint
        if users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate);
        }
        users.push(user.clone());
        Ok(())
    }

    async fn update_approved(&self, email: &str, approved: bool) -> Result<u64, StoreError> {
        let mut users = self.users.write().await;
        let mut touched = 0;
        for user in users.iter_mut().filter(|u| u.email == email) {
            user.approved = approved;
            touched += 1;
        }
        Ok(touched)
    }

    async fn update_pass_hash(&self, email: &str, pass_hash: &str) -> Result<u64, StoreError> {
        let mut users = self.users.write().await;
        let mut touched = 0;
        for user in users.iter_mut().filter(|u| u.email == email) {
            user.pass_hash = pass_hash.to_string();
            touched += 1;
        }
        Ok(touched)
    }
}

#[async_trait]
impl ResetStore for MemoryStore {
    async fn insert_reset(&self, reset: &PasswordReset) -> Result<(), StoreError> {
        self.resets.write().await.push(reset.clone());
        Ok(())
    }

    async fn find_reset(
        &self,
        email: &str,
        token: &str,
    ) -> Result<Option<PasswordReset>, StoreError> {
        Ok(self
            .resets
            .read()
            .await
            .iter()
            .find(|r| r.email == email && r.token == token)
            .cloned())
    }

    async fn delete_reset(&self, id: Uuid) -> Result<(), StoreError> {
        self.resets.write().await.retain(|r| r.id != id);
        Ok(())
    }
}
