//! HTTP integration tests: drive the router in-process over a memory store.
//! Covers registration, login in both token delivery modes, and the score update gate.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use playerboard::config::{Config, TokenDelivery};
use playerboard::server::{router, AppState};
use playerboard::storage::MemoryStore;

const CAROL_HASH: &str = "a665a45920422f9d417e4867efdc4fb8a04a1f3fff1fa07e998e86f7f7a27ae3";

fn config(delivery: TokenDelivery) -> Config {
    let mut cfg = Config::from_lookup(|k| match k {
        "JWT_SECRET" => Some("integration-secret".to_string()),
        "PLAYERBOARD_STORE" => Some("memory".to_string()),
        "EXPIRATION_TIME" => Some("10".to_string()),
        _ => None,
    })
    .expect("config");
    cfg.token_delivery = delivery;
    cfg
}

fn app_with(delivery: TokenDelivery) -> (Arc<MemoryStore>, Router) {
    let store = Arc::new(MemoryStore::with_users([
        ("carol".to_string(), "Carol".to_string()),
        ("dave".to_string(), "Dave".to_string()),
    ]));
    let cfg = config(delivery);
    let app = router(AppState::new(store.clone(), &cfg), &cfg.allowed_hosts);
    (store, app)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Option<String>, Value) {
    let resp = app.clone().oneshot(req).await.expect("router");
    let status = resp.status();
    let cookie = resp
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.expect("body");
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).expect("json body") };
    (status, cookie, value)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn json_req(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn with_bearer(mut req: Request<Body>, token: &str) -> Request<Body> {
    req.headers_mut().insert(header::AUTHORIZATION, format!("Bearer {token}").parse().unwrap());
    req
}

fn with_cookie(mut req: Request<Body>, cookie_pair: &str) -> Request<Body> {
    req.headers_mut().insert(header::COOKIE, cookie_pair.parse().unwrap());
    req
}

async fn register_carol(app: &Router) {
    let (status, _, body) = send(app, json_req("POST", "/players", json!({"login": "carol", "password": CAROL_HASH}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"login": "carol", "score": 0}));
}

async fn login_body_token(app: &Router) -> String {
    let (status, _, body) = send(app, json_req("POST", "/login", json!({"login": "carol", "password": CAROL_HASH}))).await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().expect("token in body").to_string()
}

#[tokio::test]
async fn ping_pongs() {
    let (_, app) = app_with(TokenDelivery::Body);
    let (status, _, body) = send(&app, get("/ping")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ping": "pong"}));
}

#[tokio::test]
async fn users_are_listed_and_fetched() {
    let (_, app) = app_with(TokenDelivery::Body);
    let (status, _, body) = send(&app, get("/users")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{"Username": "carol", "Name": "Carol"}, {"Username": "dave", "Name": "Dave"}]));

    let (status, _, body) = send(&app, get("/users/dave")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["Name"], "Dave");

    let (status, _, body) = send(&app, get("/users/zed")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "user not found");
}

#[tokio::test]
async fn registration_flow_and_failures() {
    let (_, app) = app_with(TokenDelivery::Body);
    register_carol(&app).await;

    let (status, _, body) = send(&app, json_req("POST", "/players", json!({"login": "carol", "password": CAROL_HASH}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "player with login carol already exists");

    let (status, _, body) = send(&app, json_req("POST", "/players", json!({"login": "erin", "password": CAROL_HASH}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "cannot register player with login erin. No such user on course");

    let (status, _, _) = send(&app, json_req("POST", "/players", json!({"login": "dave", "password": "secret"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, body) = send(&app, json_req("POST", "/players", json!({"login": "dave"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid input");

    let (status, _, body) = send(&app, get("/players")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{"Login": "carol", "Score": 0}]));

    let (status, _, body) = send(&app, get("/players/carol")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"Login": "carol", "Score": 0}));

    let (status, _, body) = send(&app, get("/players/dave")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "player not found");
}

#[tokio::test]
async fn login_then_score_updates_only_move_up() {
    let (_, app) = app_with(TokenDelivery::Body);
    register_carol(&app).await;
    let token = login_body_token(&app).await;

    let (status, _, body) = send(&app, with_bearer(json_req("PUT", "/players/carol", json!({"score": 10})), &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"login": "carol", "score": 10}));

    let (status, _, body) = send(&app, with_bearer(json_req("PUT", "/players/carol", json!({"score": 5})), &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"login": "carol", "score": 10}));

    let (_, _, body) = send(&app, get("/players/carol")).await;
    assert_eq!(body["Score"], 10);
}

#[tokio::test]
async fn cookie_delivery_sets_http_only_cookie_usable_for_updates() {
    let (_, app) = app_with(TokenDelivery::Cookie);
    register_carol(&app).await;

    let (status, cookie, body) = send(&app, json_req("POST", "/login", json!({"login": "carol", "password": CAROL_HASH}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "success"}));
    let cookie = cookie.expect("Set-Cookie");
    assert!(cookie.contains("HttpOnly") && cookie.contains("Secure"));
    // 10 minute ttl, cookie kept for twice as long
    assert!(cookie.contains("Max-Age=1200"));

    let pair = cookie.split(';').next().unwrap().to_string();
    let (status, _, body) = send(&app, with_cookie(json_req("PUT", "/players/carol", json!({"score": 7})), &pair)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"login": "carol", "score": 7}));
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let (_, app) = app_with(TokenDelivery::Body);
    register_carol(&app).await;

    let wrong = "b".repeat(64);
    let (s1, _, b1) = send(&app, json_req("POST", "/login", json!({"login": "carol", "password": wrong}))).await;
    let (s2, _, b2) = send(&app, json_req("POST", "/login", json!({"login": "dave", "password": CAROL_HASH}))).await;
    assert_eq!(s1, StatusCode::BAD_REQUEST);
    assert_eq!(s2, StatusCode::BAD_REQUEST);
    assert_eq!(b1, b2);
}

#[tokio::test]
async fn score_update_gate() {
    let (store, app) = app_with(TokenDelivery::Body);
    register_carol(&app).await;
    store.add_user("erin", "Erin");
    let (status, _, _) = send(&app, json_req("POST", "/players", json!({"login": "erin", "password": CAROL_HASH}))).await;
    assert_eq!(status, StatusCode::OK);
    let token = login_body_token(&app).await;

    // no token
    let (status, _, _) = send(&app, json_req("PUT", "/players/carol", json!({"score": 1}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // garbage token
    let (status, _, body) = send(&app, with_bearer(json_req("PUT", "/players/carol", json!({"score": 1})), "x.y.z")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid or expired token");

    // someone else's score
    let (status, _, body) = send(&app, with_bearer(json_req("PUT", "/players/erin", json!({"score": 1})), &token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Unauthorized access");

    // auth passes, body does not
    let (status, _, body) = send(&app, with_bearer(json_req("PUT", "/players/carol", json!({"score": -3})), &token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid input");

    // zero counts as a missing score
    let (status, _, body) = send(&app, with_bearer(json_req("PUT", "/players/carol", json!({"score": 0})), &token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid input");

    let (_, _, body) = send(&app, get("/players/erin")).await;
    assert_eq!(body["Score"], 0);
}

#[test]
fn wildcard_origin_never_reaches_the_router() {
    let err = Config::from_lookup(|k| match k {
        "JWT_SECRET" => Some("integration-secret".to_string()),
        "PLAYERBOARD_STORE" => Some("memory".to_string()),
        "ALLOWED_HOSTS" => Some("*".to_string()),
        _ => None,
    })
    .unwrap_err();
    assert!(err.to_string().contains("ALLOWED_HOSTS"));

    let store = Arc::new(MemoryStore::new());
    let cfg = config(TokenDelivery::Body);
    // a wildcard that bypasses config parsing is dropped instead of panicking
    let _app = router(AppState::new(store, &cfg), &["*".to_string()]);
}

#[tokio::test]
async fn soft_deleted_player_cannot_update_with_old_token() {
    let (store, app) = app_with(TokenDelivery::Body);
    register_carol(&app).await;
    let token = login_body_token(&app).await;
    assert!(store.soft_delete_player("carol"));

    let (status, _, body) = send(&app, with_bearer(json_req("PUT", "/players/carol", json!({"score": 4})), &token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "player not found: carol");
}
