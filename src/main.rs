//! siwb-auth application entry point.
//!
//! Bootstraps the server:
//! 1. Load configuration from environment
//! 2. Pick the nonce backend (Redis when configured, cookie otherwise)
//! 3. Build router with auth routes, body limit, CORS and security headers
//! 4. Start Axum server
//!
//! Also supports `gen-secret` subcommand for generating a SESSION_SECRET.

use rand::Rng;
use siwb_auth::{auth::middleware::AppState, config::Config, routes};
use std::net::SocketAddr;

/// Generate a random 256-bit secret, hex-encoded.
fn gen_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

fn print_usage() {
    eprintln!("Usage: siwb-auth [gen-secret]");
    eprintln!();
    eprintln!("With no arguments, starts the server.");
    eprintln!();
    eprintln!("  gen-secret   Print a random value suitable for SESSION_SECRET");
    eprintln!();
    eprintln!("Then set in .env:");
    eprintln!("  SESSION_SECRET=<output>");
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        None => {}
        Some("gen-secret") if args.len() == 2 => {
            println!("{}", gen_secret());
            return;
        }
        Some(_) => {
            print_usage();
            std::process::exit(1);
        }
    }

    // Initialize tracing with env filter support (RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env().expect("Failed to load config");
    tracing::info!("Starting siwb-auth on {}", config.bind_addr);

    if config.session_secret.is_none() {
        tracing::error!("SESSION_SECRET is not set; sign-in will fail until it is configured");
    }

    let bind_addr = config.bind_addr;
    let state = AppState::from_config(config).expect("Failed to build application state");

    if state.nonces.is_shared() {
        // Fail fast on a bad Redis URL or unreachable server
        state
            .nonces
            .ping()
            .await
            .expect("Failed to connect to Redis");
    }
    if let Some(caveat) = state.nonces.caveat() {
        tracing::warn!("REDIS_URL not set; using cookie nonces ({})", caveat);
    }
    tracing::info!(
        nonce_backend = state.nonces.backend_name(),
        contract_wallets = state.verifier.supports_contract_wallets(),
        "Auth configured"
    );

    let app = routes::app(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .expect("Failed to bind");
    tracing::info!("Listening on {}", bind_addr);

    // Start server (with_connect_info required for ConnectInfo<SocketAddr> extractors)
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
