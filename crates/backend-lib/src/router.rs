// ============================
// crates/backend-lib/src/router.rs
// ============================
//! HTTP router: wires the account handlers to sessions and cookies.
use crate::auth::{
    cookie::{clear_session_cookie, extract_session_id, session_cookie},
    token_generator::is_well_formed_session_id,
    Session,
};
use crate::config::Settings;
use crate::error::AppError;
use crate::handlers::{self, current_user, Outcome};
use crate::metric_keys;
use crate::middleware::{enforce_allowed_hosts, https_redirect, security_headers, ClientIp};
use crate::render::render_page;
use crate::storage::UserStore;
use crate::AppState;
use account_common::{routes, LoginForm, SignupForm};
use axum::{
    extract::{rejection::FormRejection, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::from_fn_with_state,
    response::{Html, IntoResponse, Response},
    routing::get,
    Form, Router,
};
use chrono::Utc;
use metrics::counter;
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, warn};

/// Create the application router
pub fn create_router<S: UserStore + Clone + 'static>(state: Arc<AppState<S>>) -> Router {
    let settings = state.settings.clone();

    let account = Router::new()
        .route(routes::LOGIN, get(login_page::<S>).post(login_submit::<S>))
        .route(routes::SIGNUP, get(signup_page::<S>).post(signup_submit::<S>))
        .route(routes::LOGOUT, get(logout::<S>).post(logout::<S>))
        .with_state(state)
        .layer(from_fn_with_state(settings.clone(), https_redirect))
        .layer(from_fn_with_state(settings.clone(), enforce_allowed_hosts));

    Router::new()
        .route(routes::HEALTH, get(health))
        .merge(account)
        .layer(from_fn_with_state(settings.clone(), security_headers))
        .layer(cors_layer(&settings))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            },
        })
        .collect();

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
}

async fn health() -> &'static str {
    "ok"
}

async fn login_page<S: UserStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    client: ClientIp,
    headers: HeaderMap,
) -> Response {
    login(&state, &headers, client, None).await
}

async fn login_submit<S: UserStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    client: ClientIp,
    headers: HeaderMap,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Response {
    login(&state, &headers, client, Some(form_or_blank(form))).await
}

async fn login<S: UserStore>(
    state: &AppState<S>,
    headers: &HeaderMap,
    ClientIp(ip): ClientIp,
    form: Option<LoginForm>,
) -> Response {
    let mut session = open_session(state, headers).await;
    let current = current_user(state, &session).await;
    let outcome = handlers::login_or_home(state, &mut session, current, form, ip.into()).await;
    respond(state, session, outcome).await
}

async fn signup_page<S: UserStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> Response {
    let mut session = open_session(&state, &headers).await;
    let outcome = handlers::signup(&state, &mut session, None).await;
    respond(&state, session, outcome).await
}

async fn signup_submit<S: UserStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    form: Result<Form<SignupForm>, FormRejection>,
) -> Response {
    let mut session = open_session(&state, &headers).await;
    let outcome = handlers::signup(&state, &mut session, Some(form_or_blank(form))).await;
    respond(&state, session, outcome).await
}

/// A POST body that is not a readable form counts as a form with every field blank
fn form_or_blank<T: Default>(form: Result<Form<T>, FormRejection>) -> T {
    match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            debug!(%rejection, "unreadable form body, treating fields as blank");
            T::default()
        },
    }
}

async fn logout<S: UserStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> Response {
    let mut session = open_session(&state, &headers).await;
    let current = current_user(&state, &session).await;
    let outcome = handlers::logout(&mut session, current.as_ref());
    respond(&state, session, outcome).await
}

/// Restore the session named by the cookie, or start a fresh one
async fn open_session<S>(state: &AppState<S>, headers: &HeaderMap) -> Session {
    let Some(id) = extract_session_id(headers, &state.settings.session.cookie_name) else {
        return Session::new();
    };
    if !is_well_formed_session_id(&id) {
        debug!("ignoring malformed session cookie");
        return Session::new();
    }

    match state.sessions.load(&id).await {
        Ok(Some(record)) => Session::from_record(id, record),
        Ok(None) => {
            debug!("session cookie refers to an unknown or expired session");
            counter!(metric_keys::SESSION_EXPIRED_TTL).increment(1);
            Session::new()
        },
        Err(e) => {
            warn!(error = %e, "failed to load session");
            Session::new()
        },
    }
}

/// Turn an [`Outcome`] into a response and persist the session
async fn respond<S>(state: &AppState<S>, mut session: Session, outcome: Outcome) -> Response {
    let mut response = match outcome {
        Outcome::Redirect(location) => {
            (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
        },
        Outcome::Render { page, user } => {
            let notices = session.take_notices();
            Html(render_page(page, user.as_ref(), &notices)).into_response()
        },
    };

    match persist(state, &mut session).await {
        Ok(Some(cookie)) => {
            response.headers_mut().append(header::SET_COOKIE, cookie);
        },
        Ok(None) => {},
        Err(e) => error!(error = %e, "failed to persist session"),
    }

    response
}

/// Write the session back to the store.
///
/// Returns the `Set-Cookie` value the client needs, if any. Empty sessions
/// are not stored; a client whose stored session became empty gets its
/// cookie cleared.
async fn persist<S>(state: &AppState<S>, session: &mut Session) -> Result<Option<HeaderValue>, AppError> {
    let retired = session.take_retired_ids();
    for id in &retired {
        state.sessions.destroy(id).await?;
    }

    let settings = &state.settings;
    if session.is_empty() {
        if !session.is_new() {
            state.sessions.destroy(session.id()).await?;
        } else if retired.is_empty() {
            return Ok(None);
        }
        return clear_session_cookie(settings)
            .map(Some)
            .map_err(|e| AppError::Internal(e.to_string()));
    }

    session.touch(Utc::now());
    state.sessions.save(session.id(), session.record()).await?;
    session.mark_persisted();

    session_cookie(settings, session.id())
        .map(Some)
        .map_err(|e| AppError::Internal(e.to_string()))
}
