//! Compact HMAC-SHA256 session tokens.
//!
//! Format: `b64url(header).b64url(claims).b64url(mac)`, unpadded, where the
//! header is `{"alg":"HS256","typ":"JWT"}` and the MAC covers the first two
//! segments joined by `.`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";
const TOKEN_TYPE: &str = "JWT";

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("No signing secret configured")]
    MissingSecret,

    #[error("Malformed token")]
    Malformed,

    #[error("Token signature mismatch")]
    BadSignature,

    #[error("Unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Token expired")]
    Expired,

    #[error("Token JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Verified wallet address.
    pub sub: String,
    /// Issued at, unix seconds.
    pub iat: u64,
    /// Expiry, unix seconds.
    pub exp: u64,
}

/// Mints and validates session tokens with a server secret.
pub struct SessionSigner {
    secret: Zeroizing<Vec<u8>>,
    ttl_secs: u64,
}

impl SessionSigner {
    /// Build a signer. An empty secret is refused: a trusted credential is
    /// never minted without an explicit server secret.
    pub fn new(secret: &str, ttl_secs: u64) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }
        Ok(Self {
            secret: Zeroizing::new(secret.as_bytes().to_vec()),
            ttl_secs,
        })
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Claims for a session issued to `sub` at `now`.
    pub fn claims_for(&self, sub: &str, now: u64) -> SessionClaims {
        SessionClaims {
            sub: sub.to_string(),
            iat: now,
            exp: now.saturating_add(self.ttl_secs),
        }
    }

    /// Sign `claims` into a compact token.
    pub fn sign(&self, claims: &SessionClaims) -> Result<String, TokenError> {
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: TOKEN_TYPE.to_string(),
        };
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?)
        );
        let mac = self.mac(signing_input.as_bytes())?.finalize().into_bytes();
        Ok(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(mac)))
    }

    /// Validate a token and return its claims.
    ///
    /// The MAC is checked (in constant time) before either JSON segment is
    /// decoded, and `exp` must lie strictly after `now`.
    pub fn verify(&self, token: &str, now: u64) -> Result<SessionClaims, TokenError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(mac_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        let tag = URL_SAFE_NO_PAD
            .decode(mac_b64)
            .map_err(|_| TokenError::Malformed)?;
        let signing_input_len = header_b64.len() + 1 + claims_b64.len();
        self.mac(&token.as_bytes()[..signing_input_len])?
            .verify_slice(&tag)
            .map_err(|_| TokenError::BadSignature)?;

        let header: Header = serde_json::from_slice(
            &URL_SAFE_NO_PAD
                .decode(header_b64)
                .map_err(|_| TokenError::Malformed)?,
        )?;
        if header.alg != ALGORITHM {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }

        let claims: SessionClaims = serde_json::from_slice(
            &URL_SAFE_NO_PAD
                .decode(claims_b64)
                .map_err(|_| TokenError::Malformed)?,
        )?;
        if claims.exp <= now {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    fn mac(&self, data: &[u8]) -> Result<HmacSha256, TokenError> {
        // HMAC accepts keys of any length
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| TokenError::MissingSecret)?;
        mac.update(data);
        Ok(mac)
    }
}

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
