//! Postgres-backed store over `tokio-postgres`.
//!
//! Requests borrow connections from a `deadpool-postgres` pool. A connection whose
//! driver has exited (server restart, network drop) is discarded on checkout and a
//! fresh one is opened, so a lost connection only fails the requests in flight.
//! TLS follows `sslmode`: `disable` uses plain TCP, `prefer` and `require` negotiate
//! rustls against the webpki roots plus an optional extra CA bundle.
//! The `users` table is owned by the provisioning system; only `players` is created here.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, PoolError, RecyclingMethod, Runtime};
use tokio_postgres::config::SslMode;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Config, NoTls, Row};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{info, warn};

use super::{Store, StoreError, StoreResult};
use crate::model::{NewPlayer, Player, User};

const PLAYER_COLUMNS: &str = "id, login, password, score, created_at, updated_at, deleted_at";

const CREATE_PLAYERS: &str = "CREATE TABLE IF NOT EXISTS players (
    id BIGSERIAL PRIMARY KEY,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    deleted_at TIMESTAMPTZ,
    login TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL,
    score BIGINT NOT NULL DEFAULT 0
)";

/// Connection parameters for the players/users database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgSettings {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub connect_timeout: Duration,
    pub ssl_mode: SslMode,
    /// Extra PEM bundle trusted alongside the webpki roots.
    pub ssl_root_cert: Option<PathBuf>,
    pub pool_size: usize,
}

impl PgSettings {
    fn to_config(&self) -> Config {
        let mut cfg = Config::new();
        cfg.host(&self.host)
            .port(self.port)
            .dbname(&self.dbname)
            .user(&self.user)
            .password(&self.password)
            .connect_timeout(self.connect_timeout)
            .ssl_mode(self.ssl_mode)
            .application_name("playerboard");
        cfg
    }
}

fn tls_connector(extra_roots: Option<&Path>) -> StoreResult<MakeRustlsConnect> {
    let mut roots = rustls::RootCertStore { roots: webpki_roots::TLS_SERVER_ROOTS.to_vec() };
    if let Some(path) = extra_roots {
        let pem = std::fs::read(path)
            .map_err(|e| StoreError::Backend(format!("reading {}: {}", path.display(), e)))?;
        let mut reader = pem.as_slice();
        for cert in rustls_pemfile::certs(&mut reader) {
            let cert = cert.map_err(|e| StoreError::Backend(format!("parsing {}: {}", path.display(), e)))?;
            roots.add(cert).map_err(|e| StoreError::Backend(format!("adding CA from {}: {}", path.display(), e)))?;
        }
    }
    let tls = rustls::ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| StoreError::Backend(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(MakeRustlsConnect::new(tls))
}

pub struct PgStore {
    pool: Pool,
}

fn backend(e: tokio_postgres::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn checkout(e: PoolError) -> StoreError {
    match e {
        PoolError::Timeout(_) => StoreError::Timeout,
        other => StoreError::Backend(other.to_string()),
    }
}

fn to_db_score(score: u64) -> StoreResult<i64> {
    i64::try_from(score).map_err(|_| StoreError::OutOfRange { field: "score" })
}

fn from_db_score(score: i64) -> StoreResult<u64> {
    u64::try_from(score).map_err(|_| StoreError::Backend(format!("negative score {} in players table", score)))
}

fn user_from_row(row: &Row) -> StoreResult<User> {
    Ok(User {
        id: row.try_get("id").map_err(backend)?,
        external_id: row.try_get("tg_id").map_err(backend)?,
        username: row.try_get("username").map_err(backend)?,
        name: row.try_get("name").map_err(backend)?,
    })
}

fn player_from_row(row: &Row) -> StoreResult<Player> {
    let score: i64 = row.try_get("score").map_err(backend)?;
    Ok(Player {
        id: row.try_get("id").map_err(backend)?,
        login: row.try_get("login").map_err(backend)?,
        password_hash: row.try_get("password").map_err(backend)?,
        score: from_db_score(score)?,
        created_at: row.try_get::<_, DateTime<Utc>>("created_at").map_err(backend)?,
        updated_at: row.try_get::<_, DateTime<Utc>>("updated_at").map_err(backend)?,
        deleted_at: row.try_get::<_, Option<DateTime<Utc>>>("deleted_at").map_err(backend)?,
    })
}

impl PgStore {
    /// Build the pool and check one connection out, so bad settings fail at startup.
    pub async fn connect(settings: &PgSettings) -> StoreResult<Self> {
        let cfg = settings.to_config();
        let store = match settings.ssl_mode {
            SslMode::Disable => Self::with_tls(cfg, NoTls, settings.pool_size, settings.connect_timeout)?,
            _ => {
                let tls = tls_connector(settings.ssl_root_cert.as_deref())?;
                Self::with_tls(cfg, tls, settings.pool_size, settings.connect_timeout)?
            }
        };
        store.client().await?;
        info!(target: "storage", "connected to postgres at {}:{}/{} (sslmode={:?}, pool={})",
            settings.host, settings.port, settings.dbname, settings.ssl_mode, settings.pool_size);
        Ok(store)
    }

    /// Pool over plain TCP. Connections are opened lazily on first use.
    pub fn from_config(cfg: Config, pool_size: usize) -> StoreResult<Self> {
        let timeout = cfg.get_connect_timeout().copied().unwrap_or(Duration::from_secs(5));
        Self::with_tls(cfg, NoTls, pool_size, timeout)
    }

    fn with_tls<T>(cfg: Config, tls: T, pool_size: usize, timeout: Duration) -> StoreResult<Self>
    where
        T: tokio_postgres::tls::MakeTlsConnect<tokio_postgres::Socket> + Clone + Sync + Send + 'static,
        T::Stream: Sync + Send,
        T::TlsConnect: Sync + Send,
        <T::TlsConnect as tokio_postgres::tls::TlsConnect<tokio_postgres::Socket>>::Future: Send,
    {
        let manager = Manager::from_config(cfg, tls, ManagerConfig { recycling_method: RecyclingMethod::Fast });
        let pool = Pool::builder(manager)
            .max_size(pool_size)
            .runtime(Runtime::Tokio1)
            .wait_timeout(Some(timeout))
            .create_timeout(Some(timeout))
            .build()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { pool })
    }

    async fn client(&self) -> StoreResult<Object> {
        self.pool.get().await.map_err(|e| {
            warn!(target: "storage", "postgres checkout failed: {}", e);
            checkout(e)
        })
    }

    /// Create the players table if it does not exist yet.
    pub async fn ensure_players_table(&self) -> StoreResult<()> {
        self.client().await?.batch_execute(CREATE_PLAYERS).await.map_err(backend)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let rows = self.client().await?
            .query("SELECT id, tg_id, username, name FROM users ORDER BY id", &[])
            .await
            .map_err(backend)?;
        rows.iter().map(user_from_row).collect()
    }

    async fn find_user(&self, username: &str) -> StoreResult<Option<User>> {
        let row = self.client().await?
            .query_opt("SELECT id, tg_id, username, name FROM users WHERE username = $1", &[&username])
            .await
            .map_err(backend)?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_players(&self) -> StoreResult<Vec<Player>> {
        let q = format!("SELECT {} FROM players WHERE deleted_at IS NULL ORDER BY id", PLAYER_COLUMNS);
        let rows = self.client().await?.query(q.as_str(), &[]).await.map_err(backend)?;
        rows.iter().map(player_from_row).collect()
    }

    async fn find_player(&self, login: &str) -> StoreResult<Option<Player>> {
        let q = format!("SELECT {} FROM players WHERE login = $1 AND deleted_at IS NULL", PLAYER_COLUMNS);
        let row = self.client().await?.query_opt(q.as_str(), &[&login]).await.map_err(backend)?;
        row.as_ref().map(player_from_row).transpose()
    }

    async fn insert_player(&self, new: NewPlayer) -> StoreResult<Player> {
        let q = format!(
            "INSERT INTO players (login, password, score, created_at, updated_at) VALUES ($1, $2, 0, now(), now()) RETURNING {}",
            PLAYER_COLUMNS
        );
        let client = self.client().await?;
        match client.query_one(q.as_str(), &[&new.login, &new.password_hash]).await {
            Ok(row) => player_from_row(&row),
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                Err(StoreError::Duplicate { what: format!("login {}", new.login) })
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn raise_score(&self, login: &str, score: u64) -> StoreResult<Option<u64>> {
        let wanted = to_db_score(score)?;
        let client = self.client().await?;
        // Conditional write: the comparison and the update happen in one statement under the row lock.
        let updated = client
            .query_opt(
                "UPDATE players SET score = $2, updated_at = now() \
                 WHERE login = $1 AND deleted_at IS NULL AND score < $2 RETURNING score",
                &[&login, &wanted],
            )
            .await
            .map_err(backend)?;
        if let Some(row) = updated {
            let s: i64 = row.try_get("score").map_err(backend)?;
            return from_db_score(s).map(Some);
        }
        let current = client
            .query_opt("SELECT score FROM players WHERE login = $1 AND deleted_at IS NULL", &[&login])
            .await
            .map_err(backend)?;
        match current {
            Some(row) => {
                let s: i64 = row.try_get("score").map_err(backend)?;
                from_db_score(s).map(Some)
            }
            None => Ok(None),
        }
    }
}
