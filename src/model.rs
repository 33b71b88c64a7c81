//! Records shared by the storage layer, the registry and the HTTP surface.
//!
//! Serialized field names follow the wire format clients already consume
//! (`Username`, `Name`, `Login`, `Score`); identifiers, credentials and
//! bookkeeping timestamps are never serialized.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Externally provisioned identity. Read-only from this crate's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct User {
    #[serde(skip)]
    pub id: i64,
    /// Identity reference in the provisioning system (unique).
    #[serde(skip)]
    pub external_id: i64,
    pub username: String,
    pub name: String,
}

/// Game account linked to a user by `login == username`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Player {
    #[serde(skip)]
    pub id: i64,
    pub login: String,
    /// Client-side SHA-256 digest, stored verbatim.
    #[serde(skip)]
    pub password_hash: String,
    pub score: u64,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Insert payload for a freshly registered player; score always starts at 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPlayer {
    pub login: String,
    pub password_hash: String,
}

/// `{login, score}` body returned by registration and score updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreView {
    pub login: String,
    pub score: u64,
}

impl From<&Player> for ScoreView {
    fn from(p: &Player) -> Self { ScoreView { login: p.login.clone(), score: p.score } }
}
