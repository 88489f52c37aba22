// ============================
// crates/backend-lib/src/handlers/account.rs
// ============================
//! Login, signup and logout.
//!
//! These functions hold the account flow and know nothing about HTTP: they
//! take the client's [`Session`] and the submitted form (if the request was a
//! POST) and return an [`Outcome`]. Failures never escape; they become
//! notices on the session.
use crate::auth::{hash_password_secure, ClientKey, Session};
use crate::error::AppError;
use crate::metric_keys;
use crate::notify::Notifier;
use crate::render::Page;
use crate::storage::{NewUser, User, UserStore};
use crate::validation::{validate_signup, CleanedSignup, EMAIL_TAKEN, USERNAME_TAKEN};
use crate::AppState;
use account_common::{routes, texts, LoginForm, SignupForm};
use metrics::counter;
use tracing::{error, info, warn};

/// What the HTTP layer should send back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// 302 to the given path
    Redirect(&'static str),
    /// 200 with a rendered page
    Render { page: Page, user: Option<User> },
}

/// The signed-in user for `session`, if the reference points at an active account
pub async fn current_user<S: UserStore>(state: &AppState<S>, session: &Session) -> Option<User> {
    let user_id = session.user_id()?;
    match state.users.find_by_id(user_id).await {
        Ok(Some(user)) if user.is_active => Some(user),
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, %user_id, "failed to load session user");
            None
        },
    }
}

/// Home page and login endpoint.
///
/// `submission` is the posted login form, `None` for a GET.
pub async fn login_or_home<S: UserStore>(
    state: &AppState<S>,
    session: &mut Session,
    current: Option<User>,
    submission: Option<LoginForm>,
    client: ClientKey,
) -> Outcome {
    if let Some(user) = &current {
        if session.epoch() != Some(state.epoch) {
            info!(username = %user.username, epoch = %state.epoch, "session predates server start, logging out");
            counter!(metric_keys::SESSION_EXPIRED_EPOCH).increment(1);
            session.logout();
            session.info(texts::SERVER_RESTARTED);
            return Outcome::Redirect(routes::LOGIN);
        }
    }

    if let Some(form) = submission {
        let identifier = form.email_or_username.trim();
        if identifier.is_empty() || form.password.is_empty() {
            session.error(texts::LOGIN_BLANK);
            return Outcome::Render { page: Page::Index, user: current };
        }

        info!(identifier, "login attempt");

        if !state.login_limiter.check(client) {
            warn!(identifier, client = ?client, "login refused, client is locked out");
            counter!(metric_keys::LOGIN_THROTTLED).increment(1);
            session.error(texts::LOGIN_THROTTLED);
        } else if let Some(user) = authenticate(&state.users, identifier, &form.password).await {
            state.login_limiter.record_success(client);
            session.login(user.id);
            session.set_epoch(state.epoch);
            info!(username = %user.username, "login succeeded");
            counter!(metric_keys::LOGIN_SUCCESS).increment(1);
            return Outcome::Redirect(routes::LOGIN);
        } else {
            state.login_limiter.record_failure(client);
            session.error(texts::LOGIN_FAILED);
            warn!(identifier, "login failed");
            counter!(metric_keys::LOGIN_FAILURE).increment(1);
        }
    }

    if session.epoch().is_none() {
        session.set_epoch(state.epoch);
    }

    Outcome::Render { page: Page::Home, user: current }
}

/// Resolve `identifier` (email when it contains `@`, username otherwise)
/// and check the password. Unknown and inactive accounts yield `None`
/// exactly like a wrong password.
async fn authenticate<S: UserStore>(users: &S, identifier: &str, password: &str) -> Option<User> {
    let lookup = if identifier.contains('@') {
        users.find_by_email(identifier).await
    } else {
        users.find_by_username(identifier).await
    };

    let user = match lookup {
        Ok(Some(user)) => user,
        Ok(None) => return None,
        Err(e) => {
            error!(error = %e, "user lookup failed during login");
            return None;
        },
    };

    if !user.is_active {
        return None;
    }

    if users.verify_password(&user, password).await {
        Some(user)
    } else {
        None
    }
}

/// Signup endpoint; always redirects to the login page
pub async fn signup<S: UserStore>(
    state: &AppState<S>,
    session: &mut Session,
    submission: Option<SignupForm>,
) -> Outcome {
    let Some(form) = submission else {
        return Outcome::Redirect(routes::LOGIN);
    };

    match validate_signup(form, &state.users, &state.settings.password).await {
        Ok(cleaned) => match create_account(state, cleaned).await {
            Ok(user) => {
                info!(username = %user.username, email = %user.email, "signup succeeded");
                counter!(metric_keys::SIGNUP_CREATED).increment(1);
                session.success(texts::SIGNUP_SUCCESS);
            },
            // The store re-checks uniqueness case-insensitively on insert
            Err(AppError::DuplicateUsername(_)) => session.field_error("username", USERNAME_TAKEN),
            Err(AppError::DuplicateEmail(_)) => session.field_error("email", EMAIL_TAKEN),
            Err(e) => {
                error!(error = %e, "signup failed");
                session.error(texts::SIGNUP_FAILED);
            },
        },
        Err(errors) => {
            info!(errors = errors.len(), "signup rejected");
            counter!(metric_keys::SIGNUP_REJECTED).increment(1);
            errors.report(session);
        },
    }

    Outcome::Redirect(routes::LOGIN)
}

async fn create_account<S: UserStore>(
    state: &AppState<S>,
    cleaned: CleanedSignup,
) -> Result<User, AppError> {
    let CleanedSignup { username, email, password } = cleaned;
    let password_hash = hash_password_secure(password, state.settings.password.scrypt_log_n).await?;
    state
        .users
        .create(NewUser::new(username, email, password_hash))
        .await
}

/// Logout endpoint; a no-op for anonymous clients
pub fn logout(session: &mut Session, current: Option<&User>) -> Outcome {
    if let Some(user) = current {
        session.logout();
        info!(username = %user.username, "logged out");
        counter!(metric_keys::LOGOUT).increment(1);
    }
    Outcome::Redirect(routes::LOGIN)
}
