//! HTTP-level tests for the login, signup and logout flow.
use account_backend::{
    auth::{hash_password, MemorySessionStore, SessionStore},
    config::Settings,
    epoch::ProcessEpoch,
    router::create_router,
    storage::{MemoryUserStore, NewUser, UserStore},
    AppState,
};
use account_common::texts;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, Response, StatusCode},
    Router,
};
use std::{sync::Arc, time::Duration};
use tempfile::TempDir;
use tower::ServiceExt;

const EPOCH: ProcessEpoch = ProcessEpoch::from_micros(1_700_000_000_000_000);
const PASSWORD: &str = "password1";

fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.debug = true;
    settings.allowed_hosts = vec!["*".to_string()];
    settings.password.scrypt_log_n = 4;
    settings.auth.max_attempts = 3;
    settings
}

async fn seed(users: &impl UserStore) {
    let hash = hash_password(PASSWORD, 4).unwrap();
    users
        .create(NewUser::new("user", "user@example.com", hash.clone()))
        .await
        .unwrap();
    let mut inactive = NewUser::new("sleeper", "sleeper@example.com", hash);
    inactive.is_active = false;
    users.create(inactive).await.unwrap();
}

async fn memory_app() -> (Router, Arc<AppState<MemoryUserStore>>) {
    let state = Arc::new(AppState::with_memory_storage(test_settings(), EPOCH));
    seed(&state.users).await;
    (create_router(state.clone()), state)
}

fn get(path: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(path).header(header::HOST, "localhost");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, format!("sessionid={cookie}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn post(path: &str, form: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::HOST, "localhost")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, format!("sessionid={cookie}"));
    }
    builder.body(Body::from(form.to_string())).unwrap()
}

fn login_form(identifier: &str, password: &str) -> String {
    format!("email_or_username={identifier}&password={password}")
}

/// Session id set by the response; `Some("")` when the cookie is cleared
fn set_cookie(response: &Response<Body>) -> Option<String> {
    let raw = response.headers().get(header::SET_COOKIE)?.to_str().ok()?;
    let pair = raw.split(';').next()?;
    pair.strip_prefix("sessionid=").map(str::to_string)
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn assert_redirect_to_login(response: &Response<Body>) {
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/");
}

/// Log in and return the authenticated session id
async fn login(app: &Router, identifier: &str) -> String {
    let response = app
        .clone()
        .oneshot(post("/", &login_form(identifier, PASSWORD), None))
        .await
        .unwrap();
    assert_redirect_to_login(&response);
    set_cookie(&response).expect("login must set a session cookie")
}

#[tokio::test]
async fn test_login_by_email_is_remembered() {
    let (app, _) = memory_app().await;

    let sid = login(&app, "user@example.com").await;

    let response = app.clone().oneshot(get("/", Some(&sid))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Welcome, user"), "{body}");

    let response = app.oneshot(get("/", Some(&sid))).await.unwrap();
    assert!(body_text(response).await.contains("Welcome, user"));
}

#[tokio::test]
async fn test_login_rotates_session_id() {
    let (app, state) = memory_app().await;

    let response = app.clone().oneshot(get("/", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let anonymous = set_cookie(&response).expect("anonymous visit is stamped");
    assert!(state.sessions.load(&anonymous).await.unwrap().is_some());

    let response = app
        .clone()
        .oneshot(post("/", &login_form("user", PASSWORD), Some(&anonymous)))
        .await
        .unwrap();
    assert_redirect_to_login(&response);
    let authenticated = set_cookie(&response).unwrap();

    assert_ne!(authenticated, anonymous);
    assert!(state.sessions.load(&anonymous).await.unwrap().is_none());
    assert!(state.sessions.load(&authenticated).await.unwrap().is_some());
}

#[tokio::test]
async fn test_wrong_password_establishes_no_session() {
    let (app, _) = memory_app().await;

    let response = app
        .clone()
        .oneshot(post("/", &login_form("user@example.com", "wrong"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let sid = set_cookie(&response);
    let body = body_text(response).await;
    assert!(body.contains(texts::LOGIN_FAILED));
    assert!(!body.contains("Welcome"));

    let response = app.oneshot(get("/", sid.as_deref())).await.unwrap();
    let body = body_text(response).await;
    assert!(!body.contains("Welcome"));
    // Notices are shown once
    assert!(!body.contains(texts::LOGIN_FAILED));
}

#[tokio::test]
async fn test_inactive_account_cannot_log_in() {
    let (app, _) = memory_app().await;

    for identifier in ["sleeper", "sleeper@example.com"] {
        let response = app
            .clone()
            .oneshot(post("/", &login_form(identifier, PASSWORD), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains(texts::LOGIN_FAILED));
    }
}

#[tokio::test]
async fn test_blank_login_renders_index() {
    let (app, _) = memory_app().await;

    let response = app.oneshot(post("/", &login_form("", ""), None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains(texts::LOGIN_BLANK));
    assert!(!body.contains("id=\"signup\""));
}

#[tokio::test]
async fn test_restart_forces_logout() {
    let users = MemoryUserStore::new();
    seed(&users).await;
    let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new(Duration::from_secs(3600)));

    let before = create_router(Arc::new(AppState::new(
        users.clone(),
        sessions.clone(),
        test_settings(),
        EPOCH,
    )));
    let sid = login(&before, "user").await;

    let after = create_router(Arc::new(AppState::new(
        users,
        sessions.clone(),
        test_settings(),
        ProcessEpoch::from_micros(EPOCH.as_micros() + 1),
    )));

    let response = after.clone().oneshot(get("/", Some(&sid))).await.unwrap();
    assert_redirect_to_login(&response);
    let fresh = set_cookie(&response).expect("a fresh session carries the notice");
    assert_ne!(fresh, sid);
    assert!(sessions.load(&sid).await.unwrap().is_none());

    let response = after.oneshot(get("/", Some(&fresh))).await.unwrap();
    let body = body_text(response).await;
    assert!(body.contains(texts::SERVER_RESTARTED));
    assert!(!body.contains("Welcome"));
}

#[tokio::test]
async fn test_signup_then_login() {
    let (app, state) = memory_app().await;

    let response = app
        .clone()
        .oneshot(post(
            "/signup",
            "username=newbie&email=newbie%40example.com&password=password9&password_confirm=password9",
            None,
        ))
        .await
        .unwrap();
    assert_redirect_to_login(&response);
    let sid = set_cookie(&response).unwrap();

    let response = app.clone().oneshot(get("/", Some(&sid))).await.unwrap();
    assert!(body_text(response).await.contains(texts::SIGNUP_SUCCESS));
    assert!(state.users.find_by_username("newbie").await.unwrap().is_some());

    let response = app
        .clone()
        .oneshot(post("/", "email_or_username=newbie&password=password9", None))
        .await
        .unwrap();
    assert_redirect_to_login(&response);
}

#[tokio::test]
async fn test_signup_duplicate_username_is_field_error() {
    let (app, state) = memory_app().await;

    let response = app
        .clone()
        .oneshot(post(
            "/signup",
            "username=user&email=other%40example.com&password=password9&password_confirm=password9",
            None,
        ))
        .await
        .unwrap();
    assert_redirect_to_login(&response);
    let sid = set_cookie(&response).unwrap();

    let response = app.oneshot(get("/", Some(&sid))).await.unwrap();
    let body = body_text(response).await;
    assert!(body.contains("data-field=\"username\""), "{body}");
    assert!(state.users.find_by_email("other@example.com").await.unwrap().is_none());
    assert_eq!(state.users.len().await, 2);
}

#[tokio::test]
async fn test_signup_mismatch_is_form_wide() {
    let (app, state) = memory_app().await;

    let response = app
        .clone()
        .oneshot(post(
            "/signup",
            "username=newbie&email=newbie%40example.com&password=password9&password_confirm=password8",
            None,
        ))
        .await
        .unwrap();
    assert_redirect_to_login(&response);
    let sid = set_cookie(&response).unwrap();

    let response = app.oneshot(get("/", Some(&sid))).await.unwrap();
    let body = body_text(response).await;
    assert!(body.contains("<li class=\"error\">"), "{body}");
    assert!(!body.contains("data-field"));
    assert!(state.users.find_by_username("newbie").await.unwrap().is_none());
}

#[tokio::test]
async fn test_signup_get_redirects() {
    let (app, _) = memory_app().await;

    let response = app.oneshot(get("/signup", None)).await.unwrap();
    assert_redirect_to_login(&response);
    assert!(set_cookie(&response).is_none());
}

#[tokio::test]
async fn test_anonymous_logout_is_noop_redirect() {
    let (app, _) = memory_app().await;

    for request in [get("/logout", None), post("/logout", "", None)] {
        let response = app.clone().oneshot(request).await.unwrap();
        assert_redirect_to_login(&response);
        assert!(set_cookie(&response).is_none());
    }
}

#[tokio::test]
async fn test_logout_ends_session() {
    let (app, state) = memory_app().await;
    let sid = login(&app, "user").await;

    let response = app.clone().oneshot(post("/logout", "", Some(&sid))).await.unwrap();
    assert_redirect_to_login(&response);
    assert_eq!(set_cookie(&response).as_deref(), Some(""));
    assert!(state.sessions.load(&sid).await.unwrap().is_none());

    let response = app.oneshot(get("/", Some(&sid))).await.unwrap();
    assert!(!body_text(response).await.contains("Welcome"));
}

#[tokio::test]
async fn test_repeated_failures_lock_out_client() {
    let (app, _) = memory_app().await;
    let from = |form: String| {
        let mut request = post("/", &form, None);
        request.headers_mut().insert("x-real-ip", "203.0.113.9".parse().unwrap());
        request
    };

    for _ in 0..3 {
        let response = app.clone().oneshot(from(login_form("user", "wrong"))).await.unwrap();
        assert!(body_text(response).await.contains(texts::LOGIN_FAILED));
    }

    let response = app.clone().oneshot(from(login_form("user", PASSWORD))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains(texts::LOGIN_THROTTLED));

    // A different address is unaffected
    login(&app, "user").await;
}

#[tokio::test]
async fn test_disallowed_host_gets_bad_request() {
    let mut settings = test_settings();
    settings.allowed_hosts = vec!["accounts.example.com".to_string()];
    let app = create_router(Arc::new(AppState::with_memory_storage(settings, EPOCH)));

    let request = Request::builder()
        .uri("/")
        .header(header::HOST, "evil.test")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .uri("/")
        .header(header::HOST, "accounts.example.com")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::X_FRAME_OPTIONS], "DENY");

    // Liveness is exempt from the host check
    let request = Request::builder()
        .uri("/healthz")
        .header(header::HOST, "10.0.0.3:8000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");
}

#[tokio::test]
async fn test_file_storage_survives_new_state() {
    let dir = TempDir::new().unwrap();
    let mut settings = test_settings();
    settings.storage.path = dir.path().to_path_buf();

    let first = AppState::with_file_storage(settings.clone(), EPOCH).unwrap();
    seed(&first.users).await;
    let sid = login(&create_router(Arc::new(first)), "user").await;

    // Same process epoch, fresh stores over the same directory
    let second = AppState::with_file_storage(settings, EPOCH).unwrap();
    let response = create_router(Arc::new(second))
        .oneshot(get("/", Some(&sid)))
        .await
        .unwrap();
    assert!(body_text(response).await.contains("Welcome, user"));
}

fn post_with_content_type(path: &str, content_type: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::HOST, "localhost");
    if let Some(content_type) = content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder.body(Body::from("email_or_username=&password=")).unwrap()
}

#[tokio::test]
async fn test_unreadable_login_body_is_blank_submission() {
    let (app, _) = memory_app().await;

    for content_type in [None, Some("application/json"), Some("text/plain")] {
        let response = app
            .clone()
            .oneshot(post_with_content_type("/", content_type))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{content_type:?}");
        assert!(body_text(response).await.contains(texts::LOGIN_BLANK));
    }
}

#[tokio::test]
async fn test_unreadable_signup_body_redirects_with_field_errors() {
    let (app, state) = memory_app().await;

    for content_type in [None, Some("application/json"), Some("text/plain")] {
        let response = app
            .clone()
            .oneshot(post_with_content_type("/signup", content_type))
            .await
            .unwrap();
        assert_redirect_to_login(&response);
        let sid = set_cookie(&response).expect("field errors travel in the session");

        let response = app.clone().oneshot(get("/", Some(&sid))).await.unwrap();
        let body = body_text(response).await;
        assert!(body.contains("data-field=\"username\""), "{body}");
    }
    assert_eq!(state.users.len().await, 2);
}
