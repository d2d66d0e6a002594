use crate::auth::user::User;
use anyhow::Result;
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug)]
pub enum CreateUserOutcome {
    Created(User),
    Conflict,
}

/// Persistence and verification boundary for user records. All operations may
/// suspend; failures surface as errors, never as panics.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_name(&self, username: &str) -> Result<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Verify a plaintext password against the user's stored hash. A mismatch
    /// is `Ok(false)`; only store-level failures are errors.
    async fn check_password(&self, user: &User, password: &str) -> Result<bool>;

    /// Persist the full user record, including appended rotation tokens.
    async fn update(&self, user: &User) -> Result<()>;

    async fn create(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<CreateUserOutcome>;

    async fn delete(&self, user: &User) -> Result<()>;
}

/// In-memory store. Passwords are kept verbatim in place of a hash, which
/// keeps fixtures readable; not a production store.
#[derive(Clone, Debug, Default)]
pub struct MemoryUserStore {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_name(&self, username: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|user| user.username == username).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.get(&id).cloned())
    }

    async fn check_password(&self, user: &User, password: &str) -> Result<bool> {
        Ok(user.password_hash == password)
    }

    async fn update(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn create(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<CreateUserOutcome> {
        let mut users = self.users.write().await;

        let taken = users
            .values()
            .any(|user| user.username == username || user.email == email);
        if taken {
            return Ok(CreateUserOutcome::Conflict);
        }

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password.to_string(),
            rotation_tokens: Vec::new(),
        };
        users.insert(user.id, user.clone());

        Ok(CreateUserOutcome::Created(user))
    }

    async fn delete(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;
        users.remove(&user.id);
        Ok(())
    }
}
