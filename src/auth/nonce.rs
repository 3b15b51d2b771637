//! Sign-in nonce issuance and single-use consumption.
//!
//! Two backends, chosen once at start-up:
//! - [`NonceStore::Shared`]: Redis. Safe across instances; consumption is a
//!   single atomic DEL.
//! - [`NonceStore::Cookie`]: the nonce travels in the `siwb_nonce` cookie and
//!   is compared against the message. Single-instance only, and concurrent
//!   tabs sharing one cookie jar can race. This is an accepted degradation;
//!   there is nothing to lock across processes in this mode.

use crate::error::AppError;
use crate::storage;
use rand::Rng;

/// Length of a nonce in characters.
pub const NONCE_LEN: usize = 32;

/// Generate a cryptographically random nonce: 16 random bytes, hex encoded.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_LEN / 2];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Extract the nonce from a sign-in message.
///
/// The message must end with `at <nonce>` where `<nonce>` is exactly
/// [`NONCE_LEN`] ASCII word characters (`[A-Za-z0-9_]`).
pub fn extract_nonce(message: &str) -> Option<&str> {
    let split = message.len().checked_sub(NONCE_LEN)?;
    // A non-boundary split means the tail holds multi-byte chars, so it
    // cannot be a nonce anyway.
    let (head, nonce) = (message.get(..split)?, message.get(split..)?);
    if !nonce
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_')
    {
        return None;
    }
    head.ends_with("at ").then_some(nonce)
}

/// Nonce storage strategy.
#[derive(Clone)]
pub enum NonceStore {
    /// Shared key-value store (`nonce:{value}` keys with TTL).
    Shared(redis::Client),
    /// Same-request cookie fallback.
    Cookie,
}

impl NonceStore {
    /// Select the backend by presence of a Redis URL.
    pub fn from_redis_url(redis_url: Option<&str>) -> Result<Self, redis::RedisError> {
        match redis_url {
            Some(url) => Ok(NonceStore::Shared(redis::Client::open(url)?)),
            None => Ok(NonceStore::Cookie),
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, NonceStore::Shared(_))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            NonceStore::Shared(_) => "redis",
            NonceStore::Cookie => "cookie",
        }
    }

    /// Operational limits of the backend, if any.
    pub fn caveat(&self) -> Option<&'static str> {
        match self {
            NonceStore::Shared(_) => None,
            NonceStore::Cookie => {
                Some("not safe across instances; concurrent tabs sharing a cookie jar can race")
            }
        }
    }

    /// Verify the shared store is reachable. Always succeeds in cookie mode.
    pub async fn ping(&self) -> Result<(), AppError> {
        if let NonceStore::Shared(client) = self {
            let mut con = connect(client).await?;
            let _: () = redis::cmd("PING").query_async(&mut con).await?;
        }
        Ok(())
    }

    /// Issue a new nonce. In shared mode it is recorded with `ttl_secs`.
    ///
    /// The caller is responsible for also handing the nonce to the client
    /// in the nonce cookie.
    pub async fn issue(&self, ttl_secs: u64) -> Result<String, AppError> {
        let nonce = generate_nonce();
        if let NonceStore::Shared(client) = self {
            let mut con = connect(client).await?;
            storage::nonce::store_nonce(&mut con, &nonce, ttl_secs).await?;
        }
        Ok(nonce)
    }

    /// Consume `nonce`, returning whether it was live.
    ///
    /// `cookie_nonce` is the value of the request's nonce cookie; it is only
    /// consulted in cookie mode. Misses and mismatches are `Ok(false)`; only
    /// store faults are errors.
    pub async fn consume(
        &self,
        nonce: &str,
        cookie_nonce: Option<&str>,
    ) -> Result<bool, AppError> {
        match self {
            NonceStore::Shared(client) => {
                let mut con = connect(client).await?;
                Ok(storage::nonce::take_nonce(&mut con, nonce).await?)
            }
            NonceStore::Cookie => Ok(cookie_nonce == Some(nonce)),
        }
    }
}

async fn connect(client: &redis::Client) -> Result<redis::aio::MultiplexedConnection, AppError> {
    client
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| AppError::Internal(format!("Redis connection error: {}", e)))
}
