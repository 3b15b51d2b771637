//! Session and nonce cookie construction and parsing.

use axum::http::{header, HeaderMap, HeaderValue};

/// Session credential cookie.
pub const SESSION_COOKIE: &str = "siwb_session";
/// Fallback nonce carrier cookie.
pub const NONCE_COOKIE: &str = "siwb_nonce";

const ATTRIBUTES: &str = "Path=/; HttpOnly; Secure; SameSite=Lax";

fn build(name: &str, value: &str, max_age_secs: u64) -> HeaderValue {
    let cookie = format!("{}={}; Max-Age={}; {}", name, value, max_age_secs, ATTRIBUTES);
    // Names are constants and values are hex or base64url, so this cannot
    // contain bytes that are invalid in a header; fall back to an expired
    // cookie rather than panicking.
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| clear(name))
}

fn clear(name: &str) -> HeaderValue {
    match name {
        SESSION_COOKIE => HeaderValue::from_static(
            "siwb_session=; Max-Age=0; Path=/; HttpOnly; Secure; SameSite=Lax",
        ),
        _ => HeaderValue::from_static(
            "siwb_nonce=; Max-Age=0; Path=/; HttpOnly; Secure; SameSite=Lax",
        ),
    }
}

/// `Set-Cookie` value carrying a session token.
pub fn session_cookie(token: &str, max_age_secs: u64) -> HeaderValue {
    build(SESSION_COOKIE, token, max_age_secs)
}

/// `Set-Cookie` value that expires the session cookie.
pub fn clear_session_cookie() -> HeaderValue {
    clear(SESSION_COOKIE)
}

/// `Set-Cookie` value carrying a freshly issued nonce.
pub fn nonce_cookie(nonce: &str, max_age_secs: u64) -> HeaderValue {
    build(NONCE_COOKIE, nonce, max_age_secs)
}

/// `Set-Cookie` value that expires the nonce cookie.
pub fn clear_nonce_cookie() -> HeaderValue {
    clear(NONCE_COOKIE)
}

/// Read a cookie value from the request's `Cookie` header(s).
///
/// Empty values are treated as absent.
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}
