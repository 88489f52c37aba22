//! Session cookie encoding.

use crate::config::Settings;
use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};

/// Build the `Set-Cookie` value carrying `session_id`
pub fn session_cookie(settings: &Settings, session_id: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{}={session_id}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        settings.session.cookie_name, settings.session.ttl_secs
    );
    if settings.security.session_cookie_secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// `Set-Cookie` value that makes the browser drop the session cookie
pub fn clear_session_cookie(settings: &Settings) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        settings.session.cookie_name
    );
    if settings.security.session_cookie_secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Session id sent by the client, if any
pub fn extract_session_id(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == cookie_name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
