//! Read adapter over the externally provisioned `users` table.

use std::time::Duration;

use crate::model::User;
use crate::storage::{bounded, SharedStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("user not found: {username}")]
    UserNotFound { username: String },
    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Clone)]
pub struct UserDirectory {
    store: SharedStore,
    timeout: Duration,
}

impl UserDirectory {
    pub fn new(store: SharedStore, timeout: Duration) -> Self { Self { store, timeout } }

    pub async fn list_users(&self) -> Result<Vec<User>, DirectoryError> {
        Ok(bounded(self.timeout, self.store.list_users()).await?)
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<User, DirectoryError> {
        bounded(self.timeout, self.store.find_user(username))
            .await?
            .ok_or_else(|| DirectoryError::UserNotFound { username: username.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    fn directory() -> UserDirectory {
        let store = MemoryStore::with_users([
            ("alice".to_string(), "Alice A.".to_string()),
            ("bob".to_string(), "Bob B.".to_string()),
        ]);
        UserDirectory::new(Arc::new(store), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn finds_user_by_username() {
        let user = directory().get_user_by_username("bob").await.unwrap();
        assert_eq!(user.name, "Bob B.");
    }

    #[tokio::test]
    async fn missing_user_is_not_found() {
        let err = directory().get_user_by_username("mallory").await.unwrap_err();
        assert_eq!(err, DirectoryError::UserNotFound { username: "mallory".into() });
    }

    #[tokio::test]
    async fn lists_all_users() {
        let names: Vec<String> = directory().list_users().await.unwrap().into_iter().map(|u| u.username).collect();
        assert_eq!(names, vec!["alice", "bob"]);
    }
}
