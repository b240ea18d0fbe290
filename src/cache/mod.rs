//! Cache Store: the local, disposable SQLite copy of remote data.
//!
//! Entity modules ([`papers`], [`analyses`], [`notes`]) expose synchronous functions
//! over a `&Connection`. [`CacheStore`] wraps the shared connection for async
//! callers: every call takes the lock and runs on the blocking pool, so per-paper
//! status updates are serialized.

pub mod analyses;
pub mod notes;
pub mod papers;
pub mod stats;
pub mod types;

use anyhow::Result;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

/// Shared handle to the cache database.
#[derive(Clone)]
pub struct CacheStore {
    conn: Arc<Mutex<Connection>>,
}

impl CacheStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` against the connection on the blocking pool.
    pub async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| anyhow::anyhow!("cache lock poisoned: {e}"))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| anyhow::anyhow!("cache task failed: {e}"))?
    }

    /// Run `f` against the connection on the current thread.
    pub fn blocking<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("cache lock poisoned: {e}"))?;
        f(&mut conn)
    }
}

/// Write an entry to the sync_log audit table.
pub(crate) fn write_sync_log(
    conn: &Connection,
    operation: &str,
    entity_kind: &str,
    entity_key: &str,
    details: Option<&serde_json::Value>,
) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    let details_json = details.map(|d| d.to_string());
    conn.execute(
        "INSERT INTO sync_log (operation, entity_kind, entity_key, details, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![operation, entity_kind, entity_key, details_json, now],
    )?;
    Ok(())
}

/// Decode a JSON array column, treating malformed or empty text as empty.
pub(crate) fn json_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}
