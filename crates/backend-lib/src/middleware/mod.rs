// crates/backend-lib/src/middleware/mod.rs

//! Middleware for the account server.

pub mod client_ip;
pub mod hosts;
pub mod security;

pub use client_ip::ClientIp;
pub use hosts::enforce_allowed_hosts;
pub use security::{https_redirect, security_headers};
