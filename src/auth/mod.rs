//! Wallet sign-in: nonces, signature verification, session tokens and cookies.

pub mod cookies;
pub mod middleware;
pub mod nonce;
pub mod session;
pub mod verify;

pub use middleware::{check_rate_limit, AppState, SessionUser};
pub use nonce::{extract_nonce, generate_nonce, NonceStore};
pub use session::{SessionClaims, SessionSigner, TokenError};
pub use verify::SignatureVerifier;
