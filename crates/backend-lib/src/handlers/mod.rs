//! Request handlers.

pub mod account;

pub use account::{current_user, login_or_home, logout, signup, Outcome};
