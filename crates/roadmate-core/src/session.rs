use crate::error::{AgentError, Result};
use crate::types::Turn;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs as async_fs;
use tokio::sync::{OwnedMutexGuard, RwLock};

/// A single conversation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn append(&mut self, turns: Vec<Turn>) {
        self.updated_at = Utc::now();
        self.turns.extend(turns);
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            id: self.id.clone(),
            turn_count: self.turns.len(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Summary used by listings and eviction.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    pub id: String,
    pub turn_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Ordered, append-only per-session history.
///
/// Implementations make `append` atomic for one session. Callers that need a
/// consistent load → modify → append sequence hold the session's lock from
/// [`SessionLocks`] for its duration.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// History of a session, empty if it has never been seen.
    async fn load(&self, session_id: &str) -> Result<Vec<Turn>>;

    /// Append turns, creating the session if needed.
    async fn append(&self, session_id: &str, turns: Vec<Turn>) -> Result<()>;

    async fn list(&self) -> Result<Vec<SessionStats>>;

    async fn remove(&self, session_id: &str) -> Result<bool>;
}

fn check_id(session_id: &str) -> Result<()> {
    if session_id.trim().is_empty() {
        return Err(AgentError::InvalidInput("session id must not be empty".into()));
    }
    Ok(())
}

/// Process-lifetime store.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Vec<Turn>> {
        check_id(session_id)?;
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .map(|s| s.turns.clone())
            .unwrap_or_default())
    }

    async fn append(&self, session_id: &str, turns: Vec<Turn>) -> Result<()> {
        check_id(session_id)?;
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(session_id))
            .append(turns);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SessionStats>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.values().map(Session::stats).collect())
    }

    async fn remove(&self, session_id: &str) -> Result<bool> {
        Ok(self.sessions.write().await.remove(session_id).is_some())
    }
}

/// One JSON file per session. File names are the url-safe base64 of the id,
/// so any caller-supplied id maps to a valid, distinct file name.
pub struct FileSessionStore {
    dir: PathBuf,
    // Serializes read-modify-write per file; other sessions proceed.
    locks: SessionLocks,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            locks: SessionLocks::new(),
        })
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", URL_SAFE_NO_PAD.encode(session_id.as_bytes())))
    }

    async fn read(&self, path: &Path) -> Result<Option<Session>> {
        match async_fs::read_to_string(path).await {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_appended(&self, session_id: &str, turns: Vec<Turn>) -> Result<()> {
        let path = self.path_for(session_id);
        let mut session = self
            .read(&path)
            .await?
            .unwrap_or_else(|| Session::new(session_id));
        session.append(turns);

        // Write to a sibling file and rename so readers never see a torn file.
        let tmp = path.with_extension("json.tmp");
        async_fs::write(&tmp, serde_json::to_string_pretty(&session)?).await?;
        async_fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, session_id: &str) -> Result<Vec<Turn>> {
        check_id(session_id)?;
        Ok(self
            .read(&self.path_for(session_id))
            .await?
            .map(|s| s.turns)
            .unwrap_or_default())
    }

    async fn append(&self, session_id: &str, turns: Vec<Turn>) -> Result<()> {
        check_id(session_id)?;
        let guard = self.locks.acquire(session_id).await;
        let result = self.write_appended(session_id, turns).await;
        drop(guard);
        self.locks.prune();
        result
    }

    async fn list(&self) -> Result<Vec<SessionStats>> {
        let mut stats = Vec::new();
        let mut entries = async_fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.read(&path).await {
                Ok(Some(session)) => stats.push(session.stats()),
                Ok(None) => {}
                Err(e) => tracing::warn!("Failed to load session from {:?}: {}", path, e),
            }
        }
        Ok(stats)
    }

    async fn remove(&self, session_id: &str) -> Result<bool> {
        let guard = self.locks.acquire(session_id).await;
        let result = match async_fs::remove_file(self.path_for(session_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        };
        drop(guard);
        self.locks.prune();
        result
    }
}

/// Per-session exclusive locks. Different ids never contend.
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Wait for exclusive access to a session.
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        self.entry(session_id).lock_owned().await
    }

    /// Take the lock only if nobody holds it.
    pub fn try_acquire(&self, session_id: &str) -> Result<OwnedMutexGuard<()>> {
        self.entry(session_id)
            .try_lock_owned()
            .map_err(|_| AgentError::SessionConcurrencyConflict(session_id.to_string()))
    }

    /// Drop lock entries nobody is holding or waiting on.
    pub fn prune(&self) -> usize {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolOutput;
    use std::time::Duration;

    async fn exercise(store: &dyn SessionStore) {
        assert!(store.load("s1").await.unwrap().is_empty());

        store
            .append("s1", vec![Turn::user("I'm hungry"), Turn::assistant("Pizza or burgers?")])
            .await
            .unwrap();
        store
            .append("s1", vec![Turn::user("burgers")])
            .await
            .unwrap();
        store
            .append("s2", vec![Turn::tool_result(&ToolOutput::ok("c", "x"))])
            .await
            .unwrap();

        let first = store.load("s1").await.unwrap();
        let second = store.load("s1").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert_eq!(first[2].text(), Some("burgers"));

        let mut ids: Vec<String> = store.list().await.unwrap().into_iter().map(|s| s.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["s1", "s2"]);

        assert!(store.remove("s2").await.unwrap());
        assert!(!store.remove("s2").await.unwrap());
        assert!(store.load("s2").await.unwrap().is_empty());

        assert!(matches!(store.load("").await, Err(AgentError::InvalidInput(_))));
        assert!(store.append("  ", vec![]).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_store() {
        exercise(&MemorySessionStore::new()).await;
    }

    #[tokio::test]
    async fn test_file_store() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FileSessionStore::new(tmp.path()).unwrap();
        exercise(&store).await;

        // Ids with path separators still map to a file inside the directory.
        store.append("../escape/me", vec![Turn::user("hi")]).await.unwrap();
        assert_eq!(store.load("../escape/me").await.unwrap().len(), 1);
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let tmp = tempfile::TempDir::new().unwrap();
        FileSessionStore::new(tmp.path())
            .unwrap()
            .append("s1", vec![Turn::user("hello")])
            .await
            .unwrap();
        let reopened = FileSessionStore::new(tmp.path()).unwrap();
        assert_eq!(reopened.load("s1").await.unwrap()[0].text(), Some("hello"));
    }

    #[tokio::test]
    async fn test_file_store_writes_to_other_sessions_proceed() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FileSessionStore::new(tmp.path()).unwrap();
        let held = store.locks.acquire("s1").await;

        let other = tokio::time::timeout(
            Duration::from_millis(100),
            store.append("s2", vec![Turn::user("hi")]),
        )
        .await;
        assert!(matches!(other, Ok(Ok(()))));

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            store.append("s1", vec![Turn::user("waiting")]),
        )
        .await;
        assert!(blocked.is_err());
        assert!(store.load("s1").await.unwrap().is_empty());

        drop(held);
        store.append("s1", vec![Turn::user("now")]).await.unwrap();
        assert_eq!(store.load("s1").await.unwrap().len(), 1);
        assert!(store.locks.is_empty());
    }

    #[tokio::test]
    async fn test_locks_serialize_same_session_only() {
        let locks = Arc::new(SessionLocks::new());
        let held = locks.acquire("a").await;

        assert!(matches!(
            locks.try_acquire("a"),
            Err(AgentError::SessionConcurrencyConflict(_))
        ));
        let other = tokio::time::timeout(Duration::from_millis(100), locks.acquire("b")).await;
        assert!(other.is_ok(), "different sessions must not block each other");

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire("a").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(held);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_prune_keeps_held_locks() {
        let locks = SessionLocks::new();
        let held = locks.acquire("a").await;
        drop(locks.acquire("b").await);
        assert_eq!(locks.len(), 2);
        assert_eq!(locks.prune(), 1);
        assert_eq!(locks.len(), 1);
        drop(held);
        assert_eq!(locks.prune(), 1);
        assert!(locks.is_empty());
    }
}
