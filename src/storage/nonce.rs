//! Sign-in nonce Redis operations.
//!
//! Redis key pattern:
//! - `nonce:{value}`: marker for a live, unconsumed nonce (STRING, with TTL)

use redis::AsyncCommands;

fn nonce_key(nonce: &str) -> String {
    format!("nonce:{}", nonce)
}

/// Store a freshly issued nonce with TTL.
pub async fn store_nonce<C>(
    con: &mut C,
    nonce: &str,
    ttl_secs: u64,
) -> Result<(), redis::RedisError>
where
    C: AsyncCommands,
{
    con.set_ex::<_, _, ()>(nonce_key(nonce), 1u8, ttl_secs).await?;
    Ok(())
}

/// Consume a nonce (single-use).
///
/// A single DEL both checks for and removes the key, so of any number of
/// concurrent callers presenting the same nonce exactly one sees `true`.
pub async fn take_nonce<C>(con: &mut C, nonce: &str) -> Result<bool, redis::RedisError>
where
    C: AsyncCommands,
{
    let deleted: i64 = con.del(nonce_key(nonce)).await?;
    Ok(deleted > 0)
}
