//! Player registry: registration and score rules over the `players` table.
//!
//! Invariants enforced here:
//! - a player is created only when no player holds the login and a user with that
//!   username exists, checked in that order;
//! - a new player starts at score 0;
//! - a score never decreases. Lower or equal submissions are a silent no-op that
//!   returns the stored score, not an error.

use std::time::Duration;

use tracing::{debug, info};

use crate::model::{NewPlayer, Player};
use crate::security::is_valid_sha256_hash;
use crate::storage::{bounded, SharedStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("password must be a SHA-256 hex digest")]
    InvalidCredentialFormat,
    #[error("player with login {login} already exists")]
    PlayerAlreadyExists { login: String },
    #[error("cannot register player with login {login}. No such user on course")]
    NoMatchingUser { login: String },
    #[error("player not found: {login}")]
    PlayerNotFound { login: String },
    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Clone)]
pub struct PlayerRegistry {
    store: SharedStore,
    timeout: Duration,
}

impl PlayerRegistry {
    pub fn new(store: SharedStore, timeout: Duration) -> Self { Self { store, timeout } }

    pub async fn list_players(&self) -> Result<Vec<Player>, RegistryError> {
        Ok(bounded(self.timeout, self.store.list_players()).await?)
    }

    pub async fn get_player(&self, login: &str) -> Result<Player, RegistryError> {
        bounded(self.timeout, self.store.find_player(login))
            .await?
            .ok_or_else(|| RegistryError::PlayerNotFound { login: login.to_string() })
    }

    pub async fn create_player(&self, login: &str, password_hash: &str) -> Result<Player, RegistryError> {
        if !is_valid_sha256_hash(password_hash) {
            return Err(RegistryError::InvalidCredentialFormat);
        }
        if bounded(self.timeout, self.store.find_player(login)).await?.is_some() {
            return Err(RegistryError::PlayerAlreadyExists { login: login.to_string() });
        }
        if bounded(self.timeout, self.store.find_user(login)).await?.is_none() {
            return Err(RegistryError::NoMatchingUser { login: login.to_string() });
        }
        let new = NewPlayer { login: login.to_string(), password_hash: password_hash.to_string() };
        match bounded(self.timeout, self.store.insert_player(new)).await {
            Ok(player) => {
                info!(target: "registry", login = %login, "player created");
                Ok(player)
            }
            // Lost a race with a concurrent registration, or the login belongs to a soft-deleted row
            Err(StoreError::Duplicate { .. }) => Err(RegistryError::PlayerAlreadyExists { login: login.to_string() }),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the score held after the call.
    pub async fn set_score(&self, login: &str, new_score: u64) -> Result<u64, RegistryError> {
        let current = bounded(self.timeout, self.store.raise_score(login, new_score))
            .await?
            .ok_or_else(|| RegistryError::PlayerNotFound { login: login.to_string() })?;
        if current == new_score {
            debug!(target: "registry", login = %login, score = current, "score raised");
        } else {
            debug!(target: "registry", login = %login, score = current, rejected = new_score, "score kept");
        }
        Ok(current)
    }
}
