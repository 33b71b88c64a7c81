//!
//! playerboard server binary
//! -------------------------
//! Command-line entry point for the player HTTP API. Configuration comes from
//! environment variables; a few CLI flags override them.

use anyhow::Result;
use std::env;

use playerboard::config::Config;

fn parse_port_arg(args: &[String], flag: &str) -> Option<u16> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return args[i + 1].parse::<u16>().ok();
        }
        i += 1;
    }
    None
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("playerboard server\n\nUSAGE:\n  playerboard_server [--http-port N] [--memory]\n\nOPTIONS:\n  --http-port N   HTTP API port (env: PLAYERBOARD_HTTP_PORT, default 8080)\n  --memory        Use the in-memory store (env: PLAYERBOARD_STORE=memory; seed users via PLAYERBOARD_SEED_USERS=alice:Alice,bob)\n\nENVIRONMENT:\n  JWT_SECRET (required), EXPIRATION_TIME (minutes, default 1440), TOKEN_DELIVERY (cookie|body),\n  ALLOWED_HOSTS, BOT_DB_HOST, BOT_DB_PORT, BOT_DB_NAME, BOT_DB_USER, BOT_DB_PASS,\n  BOT_DB_SSLMODE (disable|prefer|require), BOT_DB_SSLROOTCERT, BOT_DB_POOL_SIZE, STORAGE_TIMEOUT_MS\n");
        return Ok(());
    }

    // Initialize tracing subscriber with env filter, defaulting to info
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    // A missing signing secret is fatal
    let mut config = Config::from_env_with(has_flag(&args, "--memory"))?;

    if let Some(port) = parse_port_arg(&args, "--http-port") {
        config.http_port = port;
    }

    tracing::info!(target: "startup", "Using port: http={}, store={}", config.http_port, config.store.kind());
    playerboard::server::run(config).await
}
