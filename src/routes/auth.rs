//! Auth API endpoints.

use crate::auth::cookies::{
    clear_nonce_cookie, clear_session_cookie, nonce_cookie, read_cookie, session_cookie,
    NONCE_COOKIE,
};
use crate::auth::middleware::{check_rate_limit, AppState, SessionUser};
use crate::auth::nonce::{extract_nonce, NonceStore};
use crate::auth::session::unix_now;
use crate::error::AppError;
use crate::models::{NonceResponse, OkResponse, SessionResponse, VerifyRequest};
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{header::SET_COOKIE, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;

/// GET /api/auth/nonce: Issue a single-use sign-in nonce
pub async fn issue_nonce(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<impl IntoResponse, AppError> {
    // Rate limit by IP; the cookie fallback has no shared counter.
    if let NonceStore::Shared(client) = &state.nonces {
        let mut con = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Redis connection error: {}", e)))?;

        let rate_limit_key = format!("ratelimit:nonce:{}", addr.ip());
        let allowed = check_rate_limit(
            &mut con,
            &rate_limit_key,
            state.config.rate_limit_nonce_per_min,
            60,
        )
        .await
        .map_err(|e| AppError::Internal(format!("Rate limit check failed: {}", e)))?;

        if !allowed {
            let mut hasher = std::hash::DefaultHasher::new();
            addr.ip().hash(&mut hasher);
            let ip_hash = format!("{:x}", hasher.finish());
            tracing::warn!(action = "rate_limited", endpoint = "auth/nonce", ip_hash = %ip_hash, "Rate limit exceeded");
            return Err(AppError::RateLimited);
        }
    }

    let ttl_secs = state.config.nonce_ttl_secs;
    let nonce = state.nonces.issue(ttl_secs).await?;

    Ok((
        [(SET_COOKIE, nonce_cookie(&nonce, ttl_secs))],
        Json(NonceResponse { nonce }),
    ))
}

/// POST /api/auth/verify: Verify a signed sign-in message and start a session
///
/// The nonce cookie is cleared on every response, success or failure.
pub async fn verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Response {
    let mut response = match verify_and_mint(&state, &headers, body).await {
        Ok(token) => (
            [(
                SET_COOKIE,
                session_cookie(&token, state.config.session_ttl_secs),
            )],
            Json(OkResponse::ok()),
        )
            .into_response(),
        Err(err) => err.into_response(),
    };

    response.headers_mut().append(SET_COOKIE, clear_nonce_cookie());
    response
}

/// Nonce consumption, signature check and token minting. Returns the token.
async fn verify_and_mint(
    state: &AppState,
    headers: &HeaderMap,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<String, AppError> {
    let missing_fields =
        || AppError::BadRequest("Missing address, message, or signature".to_string());

    let Json(req) = body.map_err(|e| {
        tracing::debug!(error = %e, "Unreadable verify body");
        missing_fields()
    })?;
    let (address, message, signature) = req.fields().ok_or_else(missing_fields)?;

    let nonce = extract_nonce(message)
        .ok_or_else(|| AppError::BadRequest("Missing nonce in message".to_string()))?;

    // Replay boundary: a consumed nonce is never returned, even if a later
    // step fails.
    let cookie_nonce = read_cookie(headers, NONCE_COOKIE);
    if !state.nonces.consume(nonce, cookie_nonce).await? {
        tracing::warn!(action = "nonce_rejected", backend = state.nonces.backend_name(), "Invalid or reused nonce");
        return Err(AppError::BadRequest("Invalid or reused nonce".to_string()));
    }

    if !state.verifier.verify(address, message, signature).await? {
        tracing::warn!(action = "auth_failed", address = %address, "Invalid signature");
        return Err(AppError::Unauthorized("Invalid signature".to_string()));
    }

    let signer = state.signer()?;
    let claims = signer.claims_for(address, unix_now());
    let token = signer
        .sign(&claims)
        .map_err(|e| AppError::Internal(format!("Token signing failed: {}", e)))?;

    tracing::info!(action = "auth_success", address = %address, expires_at = claims.exp, "Wallet signed in");

    Ok(token)
}

/// GET /api/auth/session: Describe the current session
pub async fn session(user: SessionUser) -> Json<SessionResponse> {
    Json(SessionResponse {
        address: user.address,
        expires_at: user.expires_at,
    })
}

/// POST /api/auth/logout: Clear the session cookie
///
/// Tokens are stateless: a copy of the token stays valid until it expires.
pub async fn logout(user: Option<SessionUser>) -> impl IntoResponse {
    if let Some(user) = user {
        tracing::info!(action = "logout", address = %user.address, "Wallet signed out");
    }

    (
        [(SET_COOKIE, clear_session_cookie())],
        Json(OkResponse::ok()),
    )
}

#[cfg(test)]
mod tests {
    use crate::auth::middleware::AppState;
    use crate::auth::session::{unix_now, SessionSigner};
    use crate::auth::verify::mock_rpc::{self, magic_word};
    use crate::config::Config;
    use crate::routes;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;
    use axum::{
        body::Body,
        extract::connect_info::MockConnectInfo,
        http::{header, Request, StatusCode},
        response::Response,
        Router,
    };
    use std::net::SocketAddr;
    use tower::ServiceExt;

    const NONCE: &str = "abcdef0123456789abcdef0123456789";
    const SECRET: &str = "test-session-secret";

    fn test_config(secret: Option<&str>) -> Config {
        Config {
            session_secret: secret.map(str::to_string),
            redis_url: None,
            chain_rpc_url: None,
            rpc_timeout_secs: 5,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            max_body_bytes: 16_384,
            session_ttl_secs: 604_800,
            nonce_ttl_secs: 300,
            rate_limit_nonce_per_min: 30,
        }
    }

    fn test_app(secret: Option<&str>) -> Router {
        let state = AppState::from_config(test_config(secret)).unwrap();
        routes::app(state).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))))
    }

    fn signed_body(wallet: &PrivateKeySigner, message: &str) -> String {
        let signature = wallet.sign_message_sync(message.as_bytes()).unwrap();
        serde_json::json!({
            "address": wallet.address().to_string(),
            "message": message,
            "signature": format!("0x{}", hex::encode(signature.as_bytes())),
        })
        .to_string()
    }

    async fn post_verify(app: Router, body: String, cookie: Option<&str>) -> Response {
        let mut request = Request::builder()
            .method("POST")
            .uri("/api/auth/verify")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        app.oneshot(request.body(Body::from(body)).unwrap())
            .await
            .unwrap()
    }

    fn set_cookies(response: &Response) -> Vec<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    fn cookie_value<'a>(cookies: &'a [String], name: &str) -> Option<&'a str> {
        cookies.iter().find_map(|c| {
            c.split(';')
                .next()
                .and_then(|pair| pair.strip_prefix(&format!("{}=", name)))
        })
    }

    fn nonce_cleared(cookies: &[String]) -> bool {
        cookies
            .iter()
            .any(|c| c.starts_with("siwb_nonce=;") && c.contains("Max-Age=0"))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_verify_success_sets_session() {
        let wallet = PrivateKeySigner::random();
        let message = format!("Sign in to App at {}", NONCE);
        let cookie = format!("siwb_nonce={}", NONCE);

        let response = post_verify(
            test_app(Some(SECRET)),
            signed_body(&wallet, &message),
            Some(&cookie),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let cookies = set_cookies(&response);
        assert!(nonce_cleared(&cookies));

        let session = cookies
            .iter()
            .find(|c| c.starts_with("siwb_session="))
            .expect("session cookie set");
        assert!(session.contains("HttpOnly"));
        assert!(session.contains("Secure"));
        assert!(session.contains("SameSite=Lax"));
        assert!(session.contains("Path=/"));
        assert!(session.contains("Max-Age=604800"));

        let token = cookie_value(&cookies, "siwb_session").unwrap();
        let claims = SessionSigner::new(SECRET, 604_800)
            .unwrap()
            .verify(token, unix_now())
            .unwrap();
        assert_eq!(claims.sub, wallet.address().to_string());
        assert_eq!(claims.exp, claims.iat + 604_800);

        assert_eq!(body_json(response).await, serde_json::json!({ "ok": true }));
    }

    #[tokio::test]
    async fn test_verify_contract_wallet_signature() {
        let (rpc_url, requests) =
            mock_rpc::spawn(vec![("eth_call", serde_json::json!({ "result": magic_word() }))])
                .await;
        let mut config = test_config(Some(SECRET));
        config.chain_rpc_url = Some(rpc_url);
        let app = routes::app(AppState::from_config(config).unwrap())
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));

        // Smart-wallet signatures are not 65-byte ECDSA signatures
        let wallet = "0x4242424242424242424242424242424242424242";
        let body = serde_json::json!({
            "address": wallet,
            "message": format!("Sign in to App at {}", NONCE),
            "signature": format!("0x{}", "ab".repeat(70)),
        })
        .to_string();
        let cookie = format!("siwb_nonce={}", NONCE);

        let response = post_verify(app, body, Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(requests.lock().unwrap().len(), 1);

        let cookies = set_cookies(&response);
        let token = cookie_value(&cookies, "siwb_session").unwrap();
        let claims = SessionSigner::new(SECRET, 604_800)
            .unwrap()
            .verify(token, unix_now())
            .unwrap();
        assert_eq!(claims.sub, wallet);
    }

    #[tokio::test]
    async fn test_verify_contract_wallet_rejected() {
        let (rpc_url, _) = mock_rpc::spawn(vec![(
            "eth_call",
            serde_json::json!({ "error": { "message": "execution reverted" } }),
        )])
        .await;
        let mut config = test_config(Some(SECRET));
        config.chain_rpc_url = Some(rpc_url);
        let app = routes::app(AppState::from_config(config).unwrap())
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));

        let body = serde_json::json!({
            "address": "0x4242424242424242424242424242424242424242",
            "message": format!("Sign in to App at {}", NONCE),
            "signature": format!("0x{}", "ab".repeat(70)),
        })
        .to_string();
        let cookie = format!("siwb_nonce={}", NONCE);

        let response = post_verify(app, body, Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(cookie_value(&set_cookies(&response), "siwb_session").is_none());
        assert_eq!(body_json(response).await["error"], "Invalid signature");
    }

    #[tokio::test]
    async fn test_verify_missing_fields() {
        let body = serde_json::json!({ "address": "0xabc", "message": "hi" }).to_string();
        let response = post_verify(test_app(Some(SECRET)), body, None).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["error"],
            "Missing address, message, or signature"
        );
    }

    #[tokio::test]
    async fn test_verify_malformed_json() {
        let response = post_verify(test_app(Some(SECRET)), "{not json".to_string(), None).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["error"],
            "Missing address, message, or signature"
        );
    }

    #[tokio::test]
    async fn test_verify_missing_nonce() {
        let wallet = PrivateKeySigner::random();
        let cookie = format!("siwb_nonce={}", NONCE);
        let response = post_verify(
            test_app(Some(SECRET)),
            signed_body(&wallet, "Sign in to App"),
            Some(&cookie),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(nonce_cleared(&set_cookies(&response)));
        assert_eq!(body_json(response).await["error"], "Missing nonce in message");
    }

    #[tokio::test]
    async fn test_verify_nonce_cookie_mismatch() {
        let wallet = PrivateKeySigner::random();
        let message = format!("Sign in to App at {}", NONCE);
        let response = post_verify(
            test_app(Some(SECRET)),
            signed_body(&wallet, &message),
            Some("siwb_nonce=ffffffffffffffffffffffffffffffff"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let cookies = set_cookies(&response);
        assert!(nonce_cleared(&cookies));
        assert!(cookie_value(&cookies, "siwb_session").is_none());
        assert_eq!(body_json(response).await["error"], "Invalid or reused nonce");
    }

    #[tokio::test]
    async fn test_verify_without_nonce_cookie() {
        let wallet = PrivateKeySigner::random();
        let message = format!("Sign in to App at {}", NONCE);
        let response =
            post_verify(test_app(Some(SECRET)), signed_body(&wallet, &message), None).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Invalid or reused nonce");
    }

    #[tokio::test]
    async fn test_verify_signature_from_other_wallet() {
        let wallet = PrivateKeySigner::random();
        let impostor = PrivateKeySigner::random();
        let message = format!("Sign in to App at {}", NONCE);
        let signature = impostor.sign_message_sync(message.as_bytes()).unwrap();
        let body = serde_json::json!({
            "address": wallet.address().to_string(),
            "message": message,
            "signature": format!("0x{}", hex::encode(signature.as_bytes())),
        })
        .to_string();
        let cookie = format!("siwb_nonce={}", NONCE);

        let response = post_verify(test_app(Some(SECRET)), body, Some(&cookie)).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let cookies = set_cookies(&response);
        assert!(nonce_cleared(&cookies));
        assert!(cookie_value(&cookies, "siwb_session").is_none());
        assert_eq!(body_json(response).await["error"], "Invalid signature");
    }

    #[tokio::test]
    async fn test_verify_without_secret_fails_closed() {
        let wallet = PrivateKeySigner::random();
        let message = format!("Sign in to App at {}", NONCE);
        let cookie = format!("siwb_nonce={}", NONCE);

        let response =
            post_verify(test_app(None), signed_body(&wallet, &message), Some(&cookie)).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let cookies = set_cookies(&response);
        assert!(nonce_cleared(&cookies));
        assert!(cookie_value(&cookies, "siwb_session").is_none());
        assert_eq!(
            body_json(response).await["error"],
            "Server misconfigured: SESSION_SECRET is required"
        );
    }

    #[tokio::test]
    async fn test_issue_nonce_sets_cookie() {
        let response = test_app(Some(SECRET))
            .oneshot(
                Request::builder()
                    .uri("/api/auth/nonce")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let cookies = set_cookies(&response);
        let cookie_nonce = cookie_value(&cookies, "siwb_nonce").unwrap().to_string();
        assert!(cookies[0].contains("Max-Age=300"));

        let body = body_json(response).await;
        let nonce = body["nonce"].as_str().unwrap();
        assert_eq!(nonce.len(), 32);
        assert!(nonce.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(nonce, cookie_nonce);
    }

    #[tokio::test]
    async fn test_full_cookie_mode_flow() {
        let app = test_app(Some(SECRET));
        let wallet = PrivateKeySigner::random();

        // 1. Obtain a nonce
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/auth/nonce")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let nonce = body_json(response).await["nonce"]
            .as_str()
            .unwrap()
            .to_string();

        // 2. Sign in
        let message = format!("Sign in to App at {}", nonce);
        let cookie = format!("siwb_nonce={}", nonce);
        let response =
            post_verify(app.clone(), signed_body(&wallet, &message), Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let cookies = set_cookies(&response);
        let token = cookie_value(&cookies, "siwb_session").unwrap().to_string();

        // 3. Session is visible
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/auth/session")
                    .header(header::COOKIE, format!("siwb_session={}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["address"], wallet.address().to_string());

        // 4. Logout clears the cookie
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/logout")
                    .header(header::COOKIE, format!("siwb_session={}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookies = set_cookies(&response);
        assert!(cookies
            .iter()
            .any(|c| c.starts_with("siwb_session=;") && c.contains("Max-Age=0")));
    }

    #[tokio::test]
    async fn test_session_requires_cookie() {
        let response = test_app(Some(SECRET))
            .oneshot(
                Request::builder()
                    .uri("/api/auth/session")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "Not signed in");
    }

    #[tokio::test]
    async fn test_logout_without_session() {
        let response = test_app(None)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/logout")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!({ "ok": true }));
    }
}
