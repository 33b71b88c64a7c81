//! Framework-agnostic request operations.
//!
//! Each operation takes already-parsed input and returns `AppResult`, so the HTTP
//! layer only extracts parameters and renders results. Authentication and the
//! same-login authorization rule for score updates live here.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::directory::UserDirectory;
use crate::error::{AppError, AppResult};
use crate::identity::{Claims, IssuedToken, TokenService};
use crate::model::{Player, ScoreView, User};
use crate::registry::{PlayerRegistry, RegistryError};
use crate::security::{credentials_match, is_valid_sha256_hash};
use crate::storage::SharedStore;

/// `{login, password}` body of registration and login.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsInput {
    pub login: String,
    pub password: String,
}

impl CredentialsInput {
    fn validate(&self) -> AppResult<()> {
        if self.login.is_empty() || self.password.is_empty() {
            return Err(AppError::invalid_input());
        }
        if !is_valid_sha256_hash(&self.password) {
            return Err(RegistryError::InvalidCredentialFormat.into());
        }
        Ok(())
    }
}

/// `{score}` body of a score update. A zero score is rejected as a missing field.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoreInput {
    pub score: u64,
}

impl ScoreInput {
    pub fn validate(&self) -> AppResult<()> {
        if self.score == 0 {
            return Err(AppError::invalid_input());
        }
        Ok(())
    }
}

fn invalid_credentials() -> AppError {
    AppError::user("invalid_credentials", "invalid credentials")
}

#[derive(Clone)]
pub struct Gateway {
    registry: PlayerRegistry,
    directory: UserDirectory,
    tokens: TokenService,
    token_ttl: chrono::Duration,
}

impl Gateway {
    pub fn new(store: SharedStore, tokens: TokenService, token_ttl: chrono::Duration, storage_timeout: Duration) -> Self {
        Self {
            registry: PlayerRegistry::new(store.clone(), storage_timeout),
            directory: UserDirectory::new(store, storage_timeout),
            tokens,
            token_ttl,
        }
    }

    pub fn token_ttl(&self) -> chrono::Duration { self.token_ttl }

    pub async fn list_users(&self) -> AppResult<Vec<User>> {
        Ok(self.directory.list_users().await?)
    }

    pub async fn get_user(&self, username: &str) -> AppResult<User> {
        Ok(self.directory.get_user_by_username(username).await?)
    }

    pub async fn list_players(&self) -> AppResult<Vec<Player>> {
        Ok(self.registry.list_players().await?)
    }

    pub async fn get_player(&self, login: &str) -> AppResult<Player> {
        Ok(self.registry.get_player(login).await?)
    }

    pub async fn register(&self, input: &CredentialsInput) -> AppResult<ScoreView> {
        input.validate()?;
        let player = self.registry.create_player(&input.login, &input.password).await?;
        Ok(ScoreView::from(&player))
    }

    /// Exchange a login and password digest for a token.
    ///
    /// An unknown login and a wrong digest produce the same error so the response
    /// does not reveal which logins exist.
    pub async fn login(&self, input: &CredentialsInput) -> AppResult<IssuedToken> {
        input.validate()?;
        let player = match self.registry.get_player(&input.login).await {
            Ok(p) => p,
            Err(RegistryError::PlayerNotFound { .. }) => {
                info!(target: "auth", login = %input.login, "login rejected");
                return Err(invalid_credentials());
            }
            Err(e) => return Err(e.into()),
        };
        if !credentials_match(&player.password_hash, &input.password) {
            info!(target: "auth", login = %input.login, "login rejected");
            return Err(invalid_credentials());
        }
        let issued = self.tokens.issue(&player.login, self.token_ttl).map_err(|e| {
            tracing::error!(target: "auth", "token issue failed: {}", e);
            AppError::internal("internal", "internal server error")
        })?;
        info!(target: "auth", login = %player.login, "login ok");
        Ok(issued)
    }

    /// Authenticate the presented token and require it to belong to `login`.
    pub fn authorize(&self, login: &str, presented: Option<&str>) -> AppResult<Claims> {
        let Some(token) = presented.filter(|t| !t.is_empty()) else {
            return Err(AppError::auth("unauthenticated", "Missing authorization token"));
        };
        let claims = self.tokens.verify(token).map_err(|e| {
            debug!(target: "auth", "token rejected: {}", e);
            AppError::from(e)
        })?;
        if claims.login != login {
            return Err(AppError::forbidden("forbidden", "Unauthorized access"));
        }
        Ok(claims)
    }

    pub async fn update_score(&self, login: &str, new_score: u64, presented: Option<&str>) -> AppResult<ScoreView> {
        let claims = self.authorize(login, presented)?;
        self.update_score_as(claims, new_score).await
    }

    /// Apply a score update for claims already returned by `authorize`.
    pub async fn update_score_as(&self, claims: Claims, new_score: u64) -> AppResult<ScoreView> {
        match self.registry.set_score(&claims.login, new_score).await {
            Ok(score) => Ok(ScoreView { login: claims.login, score }),
            // A valid token whose player has since vanished is a bad request, not a missing resource.
            Err(e @ RegistryError::PlayerNotFound { .. }) => Err(AppError::user("player_not_found".to_string(), e.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}
