//! Axum extractors for authentication and rate limiting.

use crate::auth::cookies::{read_cookie, SESSION_COOKIE};
use crate::auth::nonce::NonceStore;
use crate::auth::session::{unix_now, SessionSigner};
use crate::auth::verify::SignatureVerifier;
use crate::config::Config;
use crate::error::AppError;
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::request::Parts,
};
use redis::AsyncCommands;
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub nonces: NonceStore,
    pub verifier: SignatureVerifier,
    /// `None` when no signing secret is configured; session minting and
    /// validation then fail closed.
    pub signer: Option<Arc<SessionSigner>>,
}

impl AppState {
    /// Assemble state from configuration.
    pub fn from_config(config: Config) -> Result<Self, AppError> {
        let nonces = NonceStore::from_redis_url(config.redis_url.as_deref())?;
        let verifier = SignatureVerifier::new(
            config.chain_rpc_url.as_deref(),
            std::time::Duration::from_secs(config.rpc_timeout_secs),
        )?;
        let signer = config
            .session_secret
            .as_deref()
            .and_then(|secret| SessionSigner::new(secret, config.session_ttl_secs).ok())
            .map(Arc::new);

        Ok(AppState {
            config: Arc::new(config),
            nonces,
            verifier,
            signer,
        })
    }

    /// The session signer, or the misconfiguration error.
    pub fn signer(&self) -> Result<&SessionSigner, AppError> {
        self.signer.as_deref().ok_or_else(AppError::missing_secret)
    }
}

/// Signed-in wallet extractor.
///
/// Reads the session cookie and validates its signature and expiry.
/// Returns 401 Unauthorized if missing or invalid.
pub struct SessionUser {
    pub address: String,
    pub expires_at: u64,
}

impl SessionUser {
    async fn extract(parts: &Parts, state: &AppState) -> Result<Self, AppError> {
        let signer = state.signer()?;

        let token = read_cookie(&parts.headers, SESSION_COOKIE)
            .ok_or_else(|| AppError::Unauthorized("Not signed in".to_string()))?;

        let claims = signer.verify(token, unix_now()).map_err(|e| {
            tracing::debug!(error = %e, "Rejected session token");
            AppError::Unauthorized("Not signed in".to_string())
        })?;

        Ok(SessionUser {
            address: claims.sub,
            expires_at: claims.exp,
        })
    }
}

impl FromRequestParts<AppState> for SessionUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        SessionUser::extract(parts, state).await
    }
}

/// Optional signed-in wallet extractor.
///
/// Yields Some(SessionUser) if a valid session cookie is present, None otherwise.
/// Does not fail the request if the session is missing or invalid.
impl OptionalFromRequestParts<AppState> for SessionUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(SessionUser::extract(parts, state).await.ok())
    }
}

/// Check rate limit using Redis INCR with TTL.
///
/// # Arguments
/// * `con` - Redis connection
/// * `key` - Rate limit key (e.g., "ratelimit:nonce:127.0.0.1")
/// * `max` - Maximum requests allowed in window
/// * `window_secs` - Time window in seconds
///
/// # Returns
/// * `Ok(true)` if under limit
/// * `Ok(false)` if limit exceeded
pub async fn check_rate_limit<C>(
    con: &mut C,
    key: &str,
    max: u32,
    window_secs: u64,
) -> Result<bool, redis::RedisError>
where
    C: AsyncCommands,
{
    // Create the window with its TTL and count in one MULTI/EXEC; INCR
    // keeps the TTL, so the counter can never outlive its window.
    let (count,): (u32,) = redis::pipe()
        .atomic()
        .cmd("SET")
        .arg(key)
        .arg(0)
        .arg("EX")
        .arg(window_secs)
        .arg("NX")
        .ignore()
        .incr(key, 1)
        .query_async(con)
        .await?;

    Ok(count <= max)
}
