// ============================
// crates/backend-lib/src/auth/session_store.rs
// ============================
//! Session persistence backends.
use super::session::SessionRecord;
use super::token_generator::is_well_formed_session_id;
use crate::error::AppError;
use async_trait::async_trait;
use chrono::Utc;
use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{fs as tokio_fs, sync::RwLock, task::JoinHandle};
use uuid::Uuid;

/// Trait for session backends.
///
/// Implementations treat records idle for longer than their TTL as absent.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a live record
    async fn load(&self, id: &str) -> Result<Option<SessionRecord>, AppError>;

    /// Insert or replace a record
    async fn save(&self, id: &str, record: &SessionRecord) -> Result<(), AppError>;

    /// Remove a record; removing a missing id is not an error
    async fn destroy(&self, id: &str) -> Result<(), AppError>;

    /// Remove expired records, returning how many were dropped
    async fn clear_expired(&self) -> Result<usize, AppError>;
}

/// In-process session store
#[derive(Debug, Clone)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
    ttl: Duration,
}

impl MemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Number of stored records, expired or not
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &str) -> Result<Option<SessionRecord>, AppError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(id)
            .filter(|record| !record.is_expired(self.ttl, Utc::now()))
            .cloned())
    }

    async fn save(&self, id: &str, record: &SessionRecord) -> Result<(), AppError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(id.to_string(), record.clone());
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<(), AppError> {
        self.sessions.write().await.remove(id);
        Ok(())
    }

    async fn clear_expired(&self) -> Result<usize, AppError> {
        let mut sessions = self.sessions.write().await;
        let now = Utc::now();
        let before = sessions.len();
        sessions.retain(|_, record| !record.is_expired(self.ttl, now));
        Ok(before - sessions.len())
    }
}

const TMP_EXTENSION: &str = "tmp";
const TMP_MAX_AGE: Duration = Duration::from_secs(60);

/// One JSON file per session under a directory, so sessions outlive the process
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    root: PathBuf,
    ttl: Duration,
}

impl FileSessionStore {
    pub fn new<P: AsRef<Path>>(root: P, ttl: Duration) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root, ttl })
    }

    /// Path for `id`; ids that could escape the directory are refused
    fn path_for(&self, id: &str) -> Result<PathBuf, AppError> {
        if !is_well_formed_session_id(id) {
            return Err(AppError::InvalidInput("malformed session id".to_string()));
        }
        Ok(self.root.join(format!("{id}.json")))
    }

    async fn read_record(path: &Path) -> Result<Option<SessionRecord>, AppError> {
        let content = match tokio_fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&content) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "discarding unreadable session file");
                Ok(None)
            },
        }
    }

    /// Temp files older than [`TMP_MAX_AGE`] belong to writes that never finished
    async fn is_abandoned(entry: &tokio_fs::DirEntry) -> bool {
        let Ok(modified) = entry.metadata().await.and_then(|meta| meta.modified()) else {
            return false;
        };
        modified.elapsed().is_ok_and(|age| age >= TMP_MAX_AGE)
    }

    async fn remove_file(path: &Path) -> Result<(), AppError> {
        match tokio_fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, id: &str) -> Result<Option<SessionRecord>, AppError> {
        let Ok(path) = self.path_for(id) else {
            return Ok(None);
        };
        match Self::read_record(&path).await? {
            Some(record) if record.is_expired(self.ttl, Utc::now()) => {
                Self::remove_file(&path).await?;
                Ok(None)
            },
            other => Ok(other),
        }
    }

    async fn save(&self, id: &str, record: &SessionRecord) -> Result<(), AppError> {
        let path = self.path_for(id)?;
        // Each write gets its own temp file; concurrent saves race only on the rename
        let tmp = self.root.join(format!("{id}.{}.{TMP_EXTENSION}", Uuid::new_v4().simple()));
        let json = serde_json::to_vec(record)?;
        tokio_fs::write(&tmp, json).await?;
        if let Err(e) = tokio_fs::rename(&tmp, &path).await {
            let _ = Self::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<(), AppError> {
        match self.path_for(id) {
            Ok(path) => Self::remove_file(&path).await,
            Err(_) => Ok(()),
        }
    }

    async fn clear_expired(&self) -> Result<usize, AppError> {
        let now = Utc::now();
        let mut removed = 0;
        let mut entries = tokio_fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            match path.extension().and_then(|ext| ext.to_str()) {
                Some("json") => {},
                Some(TMP_EXTENSION) => {
                    if Self::is_abandoned(&entry).await {
                        Self::remove_file(&path).await?;
                    }
                    continue;
                },
                _ => continue,
            }
            let expired = match Self::read_record(&path).await? {
                Some(record) => record.is_expired(self.ttl, now),
                None => true,
            };
            if expired {
                Self::remove_file(&path).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Spawn the periodic expiry sweep
pub fn spawn_cleanup_task(store: Arc<dyn SessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.clear_expired().await {
                Ok(0) => {},
                Ok(removed) => tracing::debug!(removed, "expired sessions removed"),
                Err(e) => tracing::warn!(error = %e, "session cleanup failed"),
            }
        }
    })
}
