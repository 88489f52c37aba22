// ============================
// crates/backend-lib/src/config.rs
// ============================
//! Configuration management.
//!
//! Settings are layered with figment: built-in defaults, then a TOML file,
//! then `ACCOUNT_`-prefixed environment variables (`__` separates nested
//! keys, e.g. `ACCOUNT_SERVER__PORT=9000`). The binary loads an env file
//! into the process environment before any of this runs.
use anyhow::{bail, Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "ACCOUNT_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Listener settings
    pub server: ServerSettings,
    /// Debug mode relaxes the production checks in [`Settings::validate`]
    pub debug: bool,
    /// Accepted `Host` header values; `*` accepts any host
    #[serde(deserialize_with = "list_or_csv")]
    pub allowed_hosts: Vec<String>,
    /// Application secret
    pub secret_key: SecretKey,
    /// Default tracing filter
    pub log_level: String,
    /// Emit JSON log lines
    pub log_json: bool,
    /// User and session persistence
    pub storage: StorageSettings,
    /// Session cookie settings
    pub session: SessionSettings,
    /// Login throttling
    pub auth: AuthSettings,
    /// Password policy applied at signup
    pub password: PasswordRequirements,
    /// HTTPS redirect, cookie and header hardening
    pub security: SecuritySettings,
    /// Cross-origin requests
    pub cors: CorsSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// JSON files under `storage.path`
    File,
    /// Process memory; everything is lost on restart
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Data directory
    pub path: PathBuf,
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Session lifetime in seconds, refreshed on every request
    pub ttl_secs: u64,
    pub cookie_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Failed logins per client before lockout
    pub max_attempts: u32,
    /// Lockout duration in seconds
    pub lockout_secs: u64,
}

/// Password complexity requirements
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordRequirements {
    /// Minimum password length in characters
    pub min_length: usize,
    /// Require uppercase letters
    pub require_uppercase: bool,
    /// Require lowercase letters
    pub require_lowercase: bool,
    /// Require digits
    pub require_digit: bool,
    /// Require special characters
    pub require_special: bool,
    /// Reject passwords made only of digits
    pub reject_numeric: bool,
    /// scrypt cost parameter (log2 of N)
    pub scrypt_log_n: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    /// Redirect requests that did not arrive over HTTPS
    pub ssl_redirect: bool,
    /// Mark the session cookie `Secure`
    pub session_cookie_secure: bool,
    /// Send `X-Content-Type-Options: nosniff`
    pub content_type_nosniff: bool,
    /// Send `X-XSS-Protection: 1; mode=block`
    pub xss_filter: bool,
    /// Value of `X-Frame-Options`; empty disables the header
    pub x_frame_options: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsSettings {
    #[serde(deserialize_with = "list_or_csv")]
    pub allowed_origins: Vec<String>,
}

/// Secret string that never shows up in `Debug` output
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            debug: false,
            allowed_hosts: vec!["localhost".to_string(), "127.0.0.1".to_string()],
            secret_key: SecretKey::default(),
            log_level: "info".to_string(),
            log_json: false,
            storage: StorageSettings::default(),
            session: SessionSettings::default(),
            auth: AuthSettings::default(),
            password: PasswordRequirements::default(),
            security: SecuritySettings::default(),
            cors: CorsSettings::default(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data"),
            backend: StorageBackend::File,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 60 * 60 * 24 * 14, // 2 weeks
            cookie_name: "sessionid".to_string(),
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_secs: 5 * 60,
        }
    }
}

impl Default for PasswordRequirements {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: false,
            require_lowercase: false,
            require_digit: true,
            require_special: false,
            reject_numeric: true,
            scrypt_log_n: 15,
        }
    }
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            ssl_redirect: false,
            session_cookie_secure: false,
            content_type_nosniff: true,
            xss_filter: true,
            x_frame_options: "DENY".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the given TOML file and the environment.
    /// A missing file is not an error; defaults and env still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let settings: Settings = Self::figment(path)
            .extract()
            .with_context(|| format!("invalid configuration (file: {})", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Provider stack used by [`Settings::load_from`]
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            bail!("unknown log level: {}", self.log_level);
        }
        if self.session.ttl_secs == 0 {
            bail!("session.ttl_secs must be greater than zero");
        }
        if self.session.cookie_name.is_empty()
            || !self
                .session
                .cookie_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            bail!("session.cookie_name must be a non-empty token");
        }
        if self.auth.max_attempts == 0 {
            bail!("auth.max_attempts must be greater than zero");
        }
        if self.password.min_length < 4 {
            bail!("password.min_length must be at least 4");
        }
        if !(1..=20).contains(&self.password.scrypt_log_n) {
            bail!("password.scrypt_log_n must be between 1 and 20");
        }
        if !self.debug {
            if self.secret_key.is_empty() {
                bail!("secret_key must be set when debug is off");
            }
            if self.allowed_hosts.is_empty() {
                bail!("allowed_hosts must not be empty when debug is off");
            }
        }
        Ok(())
    }

    /// Socket address to listen on
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .with_context(|| {
                format!("invalid bind address {}:{}", self.server.host, self.server.port)
            })
    }

    /// Check a `Host` header value (port stripped) against `allowed_hosts`.
    ///
    /// A leading dot matches the domain and every subdomain. In debug mode an
    /// empty list allows local hosts only.
    pub fn host_allowed(&self, host: &str) -> bool {
        let host = strip_port(host).to_ascii_lowercase();
        if self.allowed_hosts.is_empty() {
            return self.debug && matches!(host.as_str(), "localhost" | "127.0.0.1" | "[::1]");
        }
        self.allowed_hosts.iter().any(|pattern| {
            let pattern = pattern.trim().to_ascii_lowercase();
            if pattern == "*" {
                return true;
            }
            match pattern.strip_prefix('.') {
                Some(domain) => host == domain || host.ends_with(&pattern),
                None => host == pattern,
            }
        })
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // IPv6 literal: keep the brackets, drop anything after them
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Accept either a list or a comma-separated string (as env files provide)
fn list_or_csv<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrCsv {
        List(Vec<String>),
        Csv(String),
    }

    let items = match ListOrCsv::deserialize(deserializer)? {
        ListOrCsv::List(items) => items,
        ListOrCsv::Csv(csv) => csv.split(',').map(str::to_string).collect(),
    };
    Ok(items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect())
}
