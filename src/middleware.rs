//! Security headers middleware.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};

/// Middleware that adds security headers to all responses.
///
/// - **Cache-Control: no-store**
///   Responses carry session cookies and nonces; no intermediary may cache them.
///
/// - **Referrer-Policy: no-referrer**
///
/// - **X-Content-Type-Options: nosniff**
///   Forces browsers to respect the declared JSON content type.
///
/// - **X-Frame-Options: DENY** and `frame-ancestors 'none'`
///   The API is never meant to be framed.
///
/// - **Strict-Transport-Security**
///   The session cookie is `Secure`, so the service is only useful over HTTPS.
///
/// - **Content-Security-Policy: default-src 'none'**
///   The service only returns JSON; nothing it serves should load resources.
///
/// # Usage
///
/// ```rust,no_run
/// use axum::Router;
/// use axum::middleware;
/// use siwb_auth::middleware::security_headers;
///
/// let app: Router = Router::new()
///     .layer(middleware::from_fn(security_headers));
/// ```
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("cache-control", HeaderValue::from_static("no-store"));
    headers.insert("referrer-policy", HeaderValue::from_static("no-referrer"));
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "strict-transport-security",
        HeaderValue::from_static("max-age=63072000; includeSubDomains"),
    );
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );

    response
}
