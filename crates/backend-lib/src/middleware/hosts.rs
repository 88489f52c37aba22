use crate::{config::Settings, error::AppError};
use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Host of the request: the URI authority when present, else the `Host` header
pub fn request_host(request: &Request<Body>) -> Option<String> {
    if let Some(authority) = request.uri().authority() {
        return Some(authority.as_str().to_string());
    }
    request
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
}

/// Reject requests whose host is not in `allowed_hosts`
pub async fn enforce_allowed_hosts(
    State(settings): State<Arc<Settings>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let host = request_host(&request).unwrap_or_default();

    if !settings.host_allowed(&host) {
        tracing::warn!(host = %host, path = %request.uri().path(), "rejected request for disallowed host");
        return Err(AppError::DisallowedHost(host));
    }

    Ok(next.run(request).await)
}
