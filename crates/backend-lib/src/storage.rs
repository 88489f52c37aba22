// ============================
// crates/backend-lib/src/storage.rs
// ============================
//! User account storage with in-memory and flat-file implementations.
use crate::auth::password::verify_password_blocking;
use crate::error::AppError;
use account_common::UserId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{fs as tokio_fs, sync::RwLock};
use uuid::Uuid;

/// File holding all accounts inside the data directory
pub const USERS_FILE: &str = "users.json";

/// A stored user account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    /// scrypt PHC string
    pub password_hash: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

/// Data needed to create an account
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
}

impl NewUser {
    pub fn new(username: impl Into<String>, email: impl Into<String>, password_hash: String) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password_hash,
            is_active: true,
        }
    }
}

/// Trait for user store backends
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create an account. Username and email uniqueness is checked
    /// atomically with the insert.
    async fn create(&self, new_user: NewUser) -> Result<User, AppError>;

    /// Case-insensitive email lookup
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Exact username lookup
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, AppError>;

    /// Check `plain` against the user's stored hash
    async fn verify_password(&self, user: &User, plain: &str) -> bool {
        verify_password_blocking(user.password_hash.clone(), plain.to_string()).await
    }
}

/// Lower-case the domain part of an email address; the local part is kept as typed
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_ascii_lowercase()),
        None => email.to_string(),
    }
}

/// The account table shared by both backends
#[derive(Debug, Default, Serialize, Deserialize)]
struct UserTable {
    users: Vec<User>,
}

impl UserTable {
    fn by_email(&self, email: &str) -> Option<&User> {
        self.users.iter().find(|u| u.email.eq_ignore_ascii_case(email.trim()))
    }

    fn by_username(&self, username: &str) -> Option<&User> {
        self.users.iter().find(|u| u.username == username)
    }

    fn by_id(&self, id: UserId) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    fn insert(&mut self, new_user: NewUser) -> Result<User, AppError> {
        if self
            .users
            .iter()
            .any(|u| u.username.to_lowercase() == new_user.username.to_lowercase())
        {
            return Err(AppError::DuplicateUsername(new_user.username));
        }
        let email = normalize_email(&new_user.email);
        if self.by_email(&email).is_some() {
            return Err(AppError::DuplicateEmail(email));
        }

        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email,
            password_hash: new_user.password_hash,
            is_active: new_user.is_active,
            date_joined: Utc::now(),
        };
        self.users.push(user.clone());
        Ok(user)
    }
}

/// Accounts kept in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryUserStore {
    table: Arc<RwLock<UserTable>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, new_user: NewUser) -> Result<User, AppError> {
        self.table.write().await.insert(new_user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.table.read().await.by_email(email).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        Ok(self.table.read().await.by_username(username).cloned())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, AppError> {
        Ok(self.table.read().await.by_id(id).cloned())
    }
}

/// Accounts persisted as one JSON document, rewritten on every create
#[derive(Debug, Clone)]
pub struct FlatFileUserStore {
    path: PathBuf,
    table: Arc<RwLock<UserTable>>,
}

impl FlatFileUserStore {
    /// Open (or start) the account file inside `root`
    pub fn new<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;
        let path = root.join(USERS_FILE);

        let table = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == ErrorKind::NotFound => UserTable::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            table: Arc::new(RwLock::new(table)),
        })
    }

    async fn write_table(&self, table: &UserTable) -> Result<(), AppError> {
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(table)?;
        tokio_fs::write(&tmp, json).await?;
        tokio_fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for FlatFileUserStore {
    async fn create(&self, new_user: NewUser) -> Result<User, AppError> {
        // Holding the write lock across the file write serialises creates
        let mut table = self.table.write().await;
        let user = table.insert(new_user)?;
        if let Err(e) = self.write_table(&table).await {
            table.users.pop();
            return Err(e);
        }
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.table.read().await.by_email(email).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        Ok(self.table.read().await.by_username(username).cloned())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, AppError> {
        Ok(self.table.read().await.by_id(id).cloned())
    }
}
