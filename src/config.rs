//! Startup configuration read from environment variables.
//!
//! `JWT_SECRET` is mandatory; everything else has a default. Parsing goes through a
//! lookup closure so tests never touch the process environment.

use std::path::PathBuf;
use std::time::Duration;

use tokio_postgres::config::SslMode;

use crate::storage::PgSettings;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("JWT_SECRET is not set; refusing to start without a signing key")]
    MissingSecret,
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// How the login endpoint hands the token back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenDelivery {
    /// HTTP-only, Secure, SameSite=None cookie named `Authorization`.
    Cookie,
    /// JSON response body.
    Body,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres(PgSettings),
    /// Users seeded from `PLAYERBOARD_SEED_USERS` as (username, display name).
    Memory { seed_users: Vec<(String, String)> },
}

#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub token_delivery: TokenDelivery,
    pub allowed_hosts: Vec<String>,
    pub http_port: u16,
    pub storage_timeout: Duration,
    pub store: StoreBackend,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl", &self.token_ttl)
            .field("token_delivery", &self.token_delivery)
            .field("allowed_hosts", &self.allowed_hosts)
            .field("http_port", &self.http_port)
            .field("storage_timeout", &self.storage_timeout)
            .field("store", &self.store.kind())
            .finish()
    }
}

impl StoreBackend {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreBackend::Postgres(_) => "postgres",
            StoreBackend::Memory { .. } => "memory",
        }
    }
}

const DEFAULT_TTL_MINUTES: i64 = 24 * 60;
/// One year; longer lifetimes are treated as misconfiguration.
const MAX_TTL_MINUTES: i64 = 366 * 24 * 60;
const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_PG_PORT: u16 = 5432;
const DEFAULT_STORAGE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_PG_POOL_SIZE: usize = 16;

fn parse_num<T: std::str::FromStr>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
        None => Ok(default),
        Some(v) => v.parse::<T>().map_err(|_| ConfigError::Invalid { name, value: v }),
    }
}

/// Parse `alice:Alice Doe,bob` into (username, display name) pairs; a missing name defaults to the username.
fn parse_seed_users(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((u, n)) => (u.trim().to_string(), n.trim().to_string()),
            None => (entry.to_string(), entry.to_string()),
        })
        .collect()
}

fn parse_ssl_mode(raw: Option<String>) -> Result<SslMode, ConfigError> {
    match raw.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()).as_deref() {
        None | Some("prefer") => Ok(SslMode::Prefer),
        Some("disable") => Ok(SslMode::Disable),
        Some("require") => Ok(SslMode::Require),
        Some(other) => Err(ConfigError::Invalid { name: "BOT_DB_SSLMODE", value: other.to_string() }),
    }
}

/// Wrap a lookup so `PLAYERBOARD_STORE` reads as `memory` when `force` is set.
/// Used for the `--memory` flag, so no database variable is parsed at all.
pub fn memory_override<F>(get: F, force: bool) -> impl Fn(&str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    move |k| if force && k == "PLAYERBOARD_STORE" { Some("memory".to_string()) } else { get(k) }
}

impl Config {
    /// Read the process environment; `force_memory` selects the in-memory store regardless of `PLAYERBOARD_STORE`.
    pub fn from_env_with(force_memory: bool) -> Result<Self, ConfigError> {
        Self::from_lookup(memory_override(|k| std::env::var(k).ok(), force_memory))
    }

    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = get("JWT_SECRET").filter(|s| !s.is_empty()).ok_or(ConfigError::MissingSecret)?;

        let ttl_minutes: i64 = parse_num("EXPIRATION_TIME", get("EXPIRATION_TIME"), DEFAULT_TTL_MINUTES)?;
        let token_ttl = Some(ttl_minutes)
            .filter(|m| (1..=MAX_TTL_MINUTES).contains(m))
            .and_then(chrono::Duration::try_minutes)
            .ok_or(ConfigError::Invalid { name: "EXPIRATION_TIME", value: ttl_minutes.to_string() })?;

        let token_delivery = match get("TOKEN_DELIVERY").map(|s| s.trim().to_lowercase()) {
            None => TokenDelivery::Cookie,
            Some(s) if s.is_empty() || s == "cookie" => TokenDelivery::Cookie,
            Some(s) if s == "body" => TokenDelivery::Body,
            Some(s) => return Err(ConfigError::Invalid { name: "TOKEN_DELIVERY", value: s }),
        };

        let allowed_hosts: Vec<String> = get("ALLOWED_HOSTS")
            .map(|s| s.split(',').map(|h| h.trim().to_string()).filter(|h| !h.is_empty()).collect())
            .unwrap_or_default();
        // Credentialed CORS cannot use a wildcard origin.
        if let Some(wild) = allowed_hosts.iter().find(|h| h.contains('*')) {
            return Err(ConfigError::Invalid { name: "ALLOWED_HOSTS", value: wild.clone() });
        }

        let http_port = parse_num("PLAYERBOARD_HTTP_PORT", get("PLAYERBOARD_HTTP_PORT"), DEFAULT_HTTP_PORT)?;
        let timeout_ms = parse_num("STORAGE_TIMEOUT_MS", get("STORAGE_TIMEOUT_MS"), DEFAULT_STORAGE_TIMEOUT_MS)?;
        let storage_timeout = Duration::from_millis(timeout_ms);

        let store = match get("PLAYERBOARD_STORE").map(|s| s.trim().to_lowercase()) {
            Some(s) if s == "memory" => StoreBackend::Memory {
                seed_users: get("PLAYERBOARD_SEED_USERS").map(|s| parse_seed_users(&s)).unwrap_or_default(),
            },
            None => StoreBackend::Postgres(Self::pg_settings(&get, storage_timeout)?),
            Some(s) if s.is_empty() || s == "postgres" => StoreBackend::Postgres(Self::pg_settings(&get, storage_timeout)?),
            Some(s) => return Err(ConfigError::Invalid { name: "PLAYERBOARD_STORE", value: s }),
        };

        Ok(Config {
            jwt_secret,
            token_ttl,
            token_delivery,
            allowed_hosts,
            http_port,
            storage_timeout,
            store,
        })
    }

    fn pg_settings<F>(get: &F, connect_timeout: Duration) -> Result<PgSettings, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(PgSettings {
            host: get("BOT_DB_HOST").unwrap_or_else(|| "localhost".to_string()),
            port: parse_num("BOT_DB_PORT", get("BOT_DB_PORT"), DEFAULT_PG_PORT)?,
            dbname: get("BOT_DB_NAME").unwrap_or_default(),
            user: get("BOT_DB_USER").unwrap_or_default(),
            password: get("BOT_DB_PASS").unwrap_or_default(),
            connect_timeout,
            ssl_mode: parse_ssl_mode(get("BOT_DB_SSLMODE"))?,
            ssl_root_cert: get("BOT_DB_SSLROOTCERT").filter(|s| !s.trim().is_empty()).map(PathBuf::from),
            pool_size: match parse_num("BOT_DB_POOL_SIZE", get("BOT_DB_POOL_SIZE"), DEFAULT_PG_POOL_SIZE)? {
                0 => return Err(ConfigError::Invalid { name: "BOT_DB_POOL_SIZE", value: "0".into() }),
                n => n,
            },
        })
    }
}
