//!
//! playerboard storage module
//! --------------------------
//! Data-access interface over the two persisted tables:
//! - `users` (id, external id, username, name), provisioned by another system and only read here;
//! - `players` (id, login, password digest, score, timestamps, soft-delete marker).
//!
//! A `Store` is constructed once at startup and handed to every component as a
//! `SharedStore` (`Arc<dyn Store>`). Implementations must keep `login` and
//! `username` unique and must make `raise_score` a single atomic compare-and-set.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::model::{NewPlayer, Player, User};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::{PgSettings, PgStore};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("storage call timed out")]
    Timeout,
    /// A uniqueness constraint rejected the write.
    #[error("duplicate {what}")]
    Duplicate { what: String },
    #[error("{field} does not fit the storage column")]
    OutOfRange { field: &'static str },
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn list_users(&self) -> StoreResult<Vec<User>>;
    async fn find_user(&self, username: &str) -> StoreResult<Option<User>>;

    /// Non-deleted players in storage order.
    async fn list_players(&self) -> StoreResult<Vec<Player>>;
    async fn find_player(&self, login: &str) -> StoreResult<Option<Player>>;
    /// Insert with score 0. Fails with `Duplicate` if the login is taken, including by a soft-deleted row.
    async fn insert_player(&self, new: NewPlayer) -> StoreResult<Player>;
    /// Set the score to `score` only if it is strictly greater than the stored one.
    /// Returns the score after the call, or `None` if no live player has that login.
    async fn raise_score(&self, login: &str, score: u64) -> StoreResult<Option<u64>>;
}

pub type SharedStore = Arc<dyn Store>;

/// Run a storage future with an upper bound on its duration.
pub async fn bounded<T, F>(limit: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(StoreError::Timeout),
    }
}
