use std::env;
use std::net::SocketAddr;

/// Public Base mainnet endpoint, used for contract-wallet signature checks.
pub const DEFAULT_CHAIN_RPC_URL: &str = "https://mainnet.base.org";

#[derive(Clone)]
pub struct Config {
    // Session signing. Optional at load time so a missing secret surfaces as a
    // per-request 500 instead of a crash loop.
    pub session_secret: Option<String>,

    // Shared nonce store. None selects the cookie fallback.
    pub redis_url: Option<String>,

    // Chain access for ERC-1271 wallets. None disables contract wallets.
    pub chain_rpc_url: Option<String>,
    pub rpc_timeout_secs: u64,

    // Server
    pub bind_addr: SocketAddr,
    pub max_body_bytes: usize,

    // TTLs (in seconds)
    pub session_ttl_secs: u64,
    pub nonce_ttl_secs: u64,

    // Rate limiting
    pub rate_limit_nonce_per_min: u32,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field(
                "session_secret",
                &self.session_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("redis_url", &self.redis_url.as_ref().map(|_| "[REDACTED]"))
            .field("chain_rpc_url", &self.chain_rpc_url)
            .field("rpc_timeout_secs", &self.rpc_timeout_secs)
            .field("bind_addr", &self.bind_addr)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("nonce_ttl_secs", &self.nonce_ttl_secs)
            .field("rate_limit_nonce_per_min", &self.rate_limit_nonce_per_min)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to parse {0}: {1}")]
    ParseError(String, String),
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Attempt to load .env file, but don't fail if it doesn't exist
        // (env vars may be set directly in production)
        let _ = dotenvy::dotenv();

        // No default: an absent secret must never be replaced by a built-in one.
        let session_secret = non_empty_var("SESSION_SECRET");

        let redis_url = non_empty_var("REDIS_URL");
        if let Some(url) = &redis_url {
            if !url.starts_with("redis://")
                && !url.starts_with("rediss://")
                && !url.starts_with("unix://")
            {
                return Err(ConfigError::InvalidValue(
                    "REDIS_URL".to_string(),
                    "must use redis://, rediss:// or unix:// scheme".to_string(),
                ));
            }
        }

        // Unset means the public default; set-but-empty means disabled.
        let chain_rpc_url = match env::var("CHAIN_RPC_URL") {
            Ok(url) if url.trim().is_empty() => None,
            Ok(url) => Some(url.trim().to_string()),
            Err(_) => Some(DEFAULT_CHAIN_RPC_URL.to_string()),
        };
        if let Some(url) = &chain_rpc_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::InvalidValue(
                    "CHAIN_RPC_URL".to_string(),
                    "must be an http(s) URL".to_string(),
                ));
            }
        }
        let rpc_timeout_secs = parse_env_or_default("RPC_TIMEOUT_SECS", 10)?;

        // Server
        let bind_addr_str = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_addr = bind_addr_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::ParseError("BIND_ADDR".to_string(), e.to_string()))?;
        let max_body_bytes = parse_env_or_default("MAX_BODY_BYTES", 16_384)?;

        // TTLs
        let session_ttl_secs: u64 = parse_env_or_default("SESSION_TTL_SECS", 604_800)?;
        let nonce_ttl_secs: u64 = parse_env_or_default("NONCE_TTL_SECS", 300)?;
        if session_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "SESSION_TTL_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        if nonce_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "NONCE_TTL_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        // Rate limiting
        let rate_limit_nonce_per_min = parse_env_or_default("RATE_LIMIT_NONCE_PER_MIN", 30)?;

        Ok(Config {
            session_secret,
            redis_url,
            chain_rpc_url,
            rpc_timeout_secs,
            bind_addr,
            max_body_bytes,
            session_ttl_secs,
            nonce_ttl_secs,
            rate_limit_nonce_per_min,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Helper function to parse environment variable with a default value
fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| ConfigError::ParseError(key.to_string(), format!("{}: {}", e, val))),
        Err(_) => Ok(default),
    }
}
