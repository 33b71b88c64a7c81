//!
//! playerboard HTTP server
//! -----------------------
//! Axum router binding the `Gateway` operations to HTTP.
//!
//! Responsibilities:
//! - JSON request parsing, with any malformed body reported as 400 `Invalid input`.
//! - Token delivery on login (HTTP-only cookie or response body, per configuration).
//! - Token extraction on score updates from `Authorization: Bearer` or the `Authorization` cookie.
//! - CORS for the configured browser origins.
//! - Store construction and startup (`run`).

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use crate::config::{Config, StoreBackend, TokenDelivery};
use crate::error::{AppError, AppResult};
use crate::gateway::{CredentialsInput, Gateway, ScoreInput};
use crate::identity::TokenService;
use crate::model::{Player, ScoreView, User};
use crate::storage::{MemoryStore, PgStore, SharedStore};

pub const AUTH_COOKIE: &str = "Authorization";

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Gateway,
    pub delivery: TokenDelivery,
}

impl AppState {
    pub fn new(store: SharedStore, config: &Config) -> Self {
        let tokens = TokenService::new(config.jwt_secret.as_bytes());
        Self {
            gateway: Gateway::new(store, tokens, config.token_ttl, config.storage_timeout),
            delivery: config.token_delivery,
        }
    }
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all(header::COOKIE) {
        let Ok(s) = cookie.to_str() else { continue; };
        for part in s.split(';') {
            if let Some((k, v)) = part.trim().split_once('=') {
                if k == name { return Some(v.to_string()); }
            }
        }
    }
    None
}

/// Bearer header first, then the auth cookie.
fn presented_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(|t| t.trim().to_string());
    bearer.or_else(|| parse_cookie(headers, AUTH_COOKIE))
}

fn auth_cookie(token: &str, max_age_secs: i64) -> AppResult<HeaderValue> {
    // SameSite=None so cross-site browser clients can store it; that requires Secure.
    HeaderValue::from_str(&format!(
        "{}={}; Max-Age={}; Path=/; HttpOnly; Secure; SameSite=None",
        AUTH_COOKIE, token, max_age_secs
    ))
    .map_err(|_| AppError::internal("internal", "internal server error"))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload.map(|Json(v)| v).map_err(|_| AppError::invalid_input())
}

async fn ping() -> impl IntoResponse {
    Json(json!({"ping": "pong"}))
}

async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<User>>> {
    Ok(Json(state.gateway.list_users().await?))
}

async fn get_user(State(state): State<AppState>, Path(username): Path<String>) -> AppResult<Json<User>> {
    Ok(Json(state.gateway.get_user(&username).await?))
}

async fn list_players(State(state): State<AppState>) -> AppResult<Json<Vec<Player>>> {
    Ok(Json(state.gateway.list_players().await?))
}

async fn get_player(State(state): State<AppState>, Path(login): Path<String>) -> AppResult<Json<Player>> {
    match state.gateway.get_player(&login).await {
        Ok(player) => Ok(Json(player)),
        Err(AppError::NotFound { code, .. }) => Err(AppError::NotFound { code, message: "player not found".into() }),
        Err(e) => Err(e),
    }
}

async fn add_player(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsInput>, JsonRejection>,
) -> AppResult<Json<ScoreView>> {
    let input = body(payload)?;
    Ok(Json(state.gateway.register(&input).await?))
}

async fn update_player(
    State(state): State<AppState>,
    Path(login): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<ScoreInput>, JsonRejection>,
) -> AppResult<Json<ScoreView>> {
    let token = presented_token(&headers);
    // Authenticate before looking at the body
    let claims = state.gateway.authorize(&login, token.as_deref())?;
    let input = body(payload)?;
    input.validate()?;
    Ok(Json(state.gateway.update_score_as(claims, input.score).await?))
}

async fn login(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsInput>, JsonRejection>,
) -> AppResult<Response> {
    let input = body(payload)?;
    let issued = state.gateway.login(&input).await?;
    match state.delivery {
        TokenDelivery::Body => Ok(Json(issued).into_response()),
        TokenDelivery::Cookie => {
            // Cookie outlives the token so an expired token still reaches the server and gets a 401
            let max_age = state
                .gateway
                .token_ttl()
                .num_seconds()
                .checked_mul(2)
                .ok_or_else(|| AppError::internal("internal", "internal server error"))?;
            let mut headers = HeaderMap::new();
            headers.insert(header::SET_COOKIE, auth_cookie(&issued.token, max_age)?);
            Ok((StatusCode::OK, headers, Json(json!({"message": "success"}))).into_response())
        }
    }
}

fn cors_layer(allowed_hosts: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = allowed_hosts
        .iter()
        .filter_map(|h| match HeaderValue::from_str(h) {
            Ok(v) if !h.contains('*') => Some(v),
            _ => {
                warn!(target: "startup", "ignoring invalid ALLOWED_HOSTS entry {:?}", h);
                None
            }
        })
        .collect();
    if origins.is_empty() { return None; }
    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::PUT, Method::POST, Method::GET, Method::OPTIONS, Method::DELETE])
            .allow_headers([
                header::CONTENT_TYPE,
                header::CONTENT_LENGTH,
                header::ACCEPT_ENCODING,
                header::HeaderName::from_static("x-csrf-token"),
                header::AUTHORIZATION,
                header::ACCEPT,
                header::ORIGIN,
                header::CACHE_CONTROL,
                header::HeaderName::from_static("x-requested-with"),
            ])
            .expose_headers([header::CONTENT_LENGTH])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(12 * 3600)),
    )
}

/// Build the router. CORS is attached only when at least one valid origin is configured.
pub fn router(state: AppState, allowed_hosts: &[String]) -> Router {
    let app = Router::new()
        .route("/ping", get(ping))
        .route("/users", get(list_users))
        .route("/users/{username}", get(get_user))
        .route("/players", get(list_players).post(add_player))
        .route("/players/{login}", get(get_player).put(update_player))
        .route("/login", post(login))
        .with_state(state);
    match cors_layer(allowed_hosts) {
        Some(cors) => app.layer(cors),
        None => app,
    }
}

async fn open_store(config: &Config) -> anyhow::Result<SharedStore> {
    match &config.store {
        StoreBackend::Postgres(pg) => {
            let store = PgStore::connect(pg)
                .await
                .with_context(|| format!("While connecting to postgres at {}:{}", pg.host, pg.port))?;
            store.ensure_players_table().await.context("While ensuring the players table")?;
            Ok(Arc::new(store))
        }
        StoreBackend::Memory { seed_users } => {
            warn!(target: "startup", "using in-memory store; players are lost on exit");
            Ok(Arc::new(MemoryStore::with_users(seed_users.iter().cloned())))
        }
    }
}

/// Start the HTTP server and serve until the process is stopped.
pub async fn run(config: Config) -> anyhow::Result<()> {
    info!(target: "startup", "playerboard starting: {:?}", config);
    let store = open_store(&config).await?;
    let app = router(AppState::new(store, &config), &config.allowed_hosts);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
