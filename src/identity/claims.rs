use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Signed assertion payload: who the bearer is and until when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub login: String,
    /// Absolute expiry, unix seconds.
    pub exp: i64,
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }

    /// Valid strictly before `exp`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}

/// Token handed back to a caller after a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub login: String,
    pub expires_at: DateTime<Utc>,
}
