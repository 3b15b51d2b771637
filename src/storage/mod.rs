//! Redis storage layer for sign-in nonces.
//!
//! All functions are async and generic over redis::AsyncCommands.

pub mod nonce;
