//! Request and response models for the API.
//!
//! All models use serde for serialization/deserialization.

use serde::{Deserialize, Serialize};

/// Request to verify a signed sign-in message.
///
/// Fields are optional so that a missing field is reported with the
/// endpoint's own 400 message instead of a generic extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct VerifyRequest {
    pub address: Option<String>,
    pub message: Option<String>,
    pub signature: Option<String>, // hex, 0x-prefixed
}

impl VerifyRequest {
    /// All three fields, if present and non-empty.
    pub fn fields(&self) -> Option<(&str, &str, &str)> {
        fn non_empty(v: &Option<String>) -> Option<&str> {
            v.as_deref().filter(|s| !s.is_empty())
        }
        Some((
            non_empty(&self.address)?,
            non_empty(&self.message)?,
            non_empty(&self.signature)?,
        ))
    }
}

/// Generic success body.
#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        OkResponse { ok: true }
    }
}

/// Response containing a nonce to embed in the sign-in message.
#[derive(Debug, Serialize)]
pub struct NonceResponse {
    pub nonce: String,
}

/// Response describing the current session.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub address: String,
    pub expires_at: u64,
}
