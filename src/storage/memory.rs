use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::{Store, StoreError, StoreResult};
use crate::model::{NewPlayer, Player, User};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    /// Insertion order is storage order.
    players: Vec<Player>,
    /// login -> index into `players`
    player_index: HashMap<String, usize>,
}

/// In-process store with the same uniqueness and compare-and-set guarantees as `PgStore`.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Seed the externally provisioned users table.
    pub fn with_users<I>(users: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let store = Self::new();
        for (username, name) in users {
            store.add_user(&username, &name);
        }
        store
    }

    /// Add a user row, standing in for the provisioning system. Existing usernames are left untouched.
    pub fn add_user(&self, username: &str, name: &str) {
        let mut t = self.inner.write();
        if t.users.iter().any(|u| u.username == username) { return; }
        let id = t.users.len() as i64 + 1;
        t.users.push(User { id, external_id: 100_000 + id, username: username.to_string(), name: name.to_string() });
    }

    /// Mark a player deleted, standing in for an administrative action.
    pub fn soft_delete_player(&self, login: &str) -> bool {
        let mut t = self.inner.write();
        let Some(&idx) = t.player_index.get(login) else { return false; };
        match t.players.get_mut(idx) {
            Some(p) if p.deleted_at.is_none() => {
                p.deleted_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_users(&self) -> StoreResult<Vec<User>> {
        Ok(self.inner.read().users.clone())
    }

    async fn find_user(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self.inner.read().users.iter().find(|u| u.username == username).cloned())
    }

    async fn list_players(&self) -> StoreResult<Vec<Player>> {
        Ok(self.inner.read().players.iter().filter(|p| p.deleted_at.is_none()).cloned().collect())
    }

    async fn find_player(&self, login: &str) -> StoreResult<Option<Player>> {
        let t = self.inner.read();
        Ok(t.player_index
            .get(login)
            .and_then(|&i| t.players.get(i))
            .filter(|p| p.deleted_at.is_none())
            .cloned())
    }

    async fn insert_player(&self, new: NewPlayer) -> StoreResult<Player> {
        let mut t = self.inner.write();
        if t.player_index.contains_key(&new.login) {
            return Err(StoreError::Duplicate { what: format!("login {}", new.login) });
        }
        let now = Utc::now();
        let player = Player {
            id: t.players.len() as i64 + 1,
            login: new.login.clone(),
            password_hash: new.password_hash,
            score: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let idx = t.players.len();
        t.players.push(player.clone());
        t.player_index.insert(new.login, idx);
        Ok(player)
    }

    async fn raise_score(&self, login: &str, score: u64) -> StoreResult<Option<u64>> {
        let mut t = self.inner.write();
        let Some(&idx) = t.player_index.get(login) else { return Ok(None); };
        let Some(p) = t.players.get_mut(idx).filter(|p| p.deleted_at.is_none()) else { return Ok(None); };
        if score > p.score {
            p.score = score;
            p.updated_at = Utc::now();
        }
        Ok(Some(p.score))
    }
}
