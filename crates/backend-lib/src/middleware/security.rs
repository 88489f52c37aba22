use super::hosts::request_host;
use crate::config::Settings;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Redirect plain-HTTP requests to https when `security.ssl_redirect` is on.
///
/// The scheme is read from `x-forwarded-proto` as set by the proxy.
pub async fn https_redirect(
    State(settings): State<Arc<Settings>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !settings.security.ssl_redirect || is_secure(&request) {
        return next.run(request).await;
    }

    let Some(host) = request_host(&request) else {
        return next.run(request).await;
    };
    let path = request
        .uri()
        .path_and_query()
        .map_or("/", |pq| pq.as_str());

    match HeaderValue::from_str(&format!("https://{host}{path}")) {
        Ok(location) => (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response(),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

fn is_secure(request: &Request<Body>) -> bool {
    request.uri().scheme_str() == Some("https")
        || request
            .headers()
            .get("x-forwarded-proto")
            .and_then(|h| h.to_str().ok())
            .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
}

/// Add the configured hardening headers to every response
pub async fn security_headers(
    State(settings): State<Arc<Settings>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let security = &settings.security;
    let headers = response.headers_mut();

    if security.content_type_nosniff {
        headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    }
    if security.xss_filter {
        headers.insert(header::X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));
    }
    if !security.x_frame_options.is_empty() {
        match HeaderValue::from_str(&security.x_frame_options) {
            Ok(value) => {
                headers.insert(header::X_FRAME_OPTIONS, value);
            },
            Err(_) => tracing::warn!(value = %security.x_frame_options, "invalid x_frame_options"),
        }
    }

    response
}
