#![allow(dead_code)]

use async_trait::async_trait;
use macp_sync::cache::CacheStore;
use macp_sync::db;
use macp_sync::error::RemoteError;
use macp_sync::remote::{EntryKind, PutRequest, RemoteEntry, RemoteFile, RemoteStore, VersionToken};
use macp_sync::sync::SyncEngine;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};
use tokio::time::Instant;

pub const OWNER: &str = "octo";

/// Fresh in-memory cache with schema and migrations applied.
pub fn test_cache() -> CacheStore {
    CacheStore::new(db::open_memory_database().unwrap())
}

/// Engine over `remote` with default layout and retry policy, owned by [`OWNER`].
pub fn engine(remote: &Arc<FakeRemote>, cache: &CacheStore) -> SyncEngine {
    SyncEngine::new(remote.clone(), cache.clone(), OWNER)
}

/// Row count of a cache table.
pub fn count(cache: &CacheStore, table: &str) -> i64 {
    cache
        .blocking(|conn| {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?)
        })
        .unwrap()
}

/// Entity tables rendered to comparable rows, ignoring the audit log.
pub fn snapshot(cache: &CacheStore) -> Vec<String> {
    cache
        .blocking(|conn| {
            let mut rows = Vec::new();
            for sql in [
                "SELECT arxiv_id || '|' || title || '|' || status || '|' || COALESCE(owner, '') || '|' || updated_at FROM papers ORDER BY id",
                "SELECT paper_id || '|' || provider || '|' || summary FROM analyses ORDER BY id",
                "SELECT owner || '|' || content || '|' || tags FROM notes ORDER BY id",
            ] {
                let mut stmt = conn.prepare(sql)?;
                let mapped = stmt.query_map([], |row| row.get::<_, String>(0))?;
                for row in mapped {
                    rows.push(row?);
                }
            }
            Ok(rows)
        })
        .unwrap()
}

#[derive(Debug, Clone)]
pub struct PutRecord {
    pub path: String,
    pub at: Instant,
    pub version: Option<String>,
    pub accepted: bool,
}

#[derive(Default)]
struct State {
    files: BTreeMap<String, (String, u64)>,
    next_sha: u64,
    scripted_put_errors: HashMap<String, VecDeque<RemoteError>>,
    sticky_put_errors: HashMap<String, RemoteError>,
    get_errors: HashMap<String, RemoteError>,
    list_errors: HashMap<String, RemoteError>,
    puts: Vec<PutRecord>,
    gets: usize,
}

/// In-process remote store with GitHub-like version checks.
///
/// A write to an existing file must present its current SHA: none at all is
/// `Unprocessable`, a stale one is `Conflict`.
pub struct FakeRemote {
    name: String,
    state: Mutex<State>,
    gate: Option<Arc<Semaphore>>,
    pub put_started: Notify,
}

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(None))
    }

    /// Every `put` waits for a permit from `gate` after announcing itself on
    /// [`FakeRemote::put_started`].
    pub fn gated(gate: Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self::build(Some(gate)))
    }

    fn build(gate: Option<Arc<Semaphore>>) -> Self {
        Self {
            name: format!("fake-{}", NEXT_ID.fetch_add(1, Ordering::SeqCst)),
            state: Mutex::new(State::default()),
            gate,
            put_started: Notify::new(),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn insert(&self, path: &str, content: &str) {
        let mut state = self.state();
        state.next_sha += 1;
        let sha = state.next_sha;
        state.files.insert(path.to_string(), (content.to_string(), sha));
    }

    pub fn insert_json(&self, path: &str, value: &Value) {
        self.insert(path, &serde_json::to_string_pretty(value).unwrap());
    }

    pub fn remove(&self, path: &str) {
        self.state().files.remove(path);
    }

    pub fn content(&self, path: &str) -> Option<String> {
        self.state().files.get(path).map(|(c, _)| c.clone())
    }

    pub fn json(&self, path: &str) -> Option<Value> {
        self.content(path).map(|c| serde_json::from_str(&c).unwrap())
    }

    pub fn paths(&self) -> Vec<String> {
        self.state().files.keys().cloned().collect()
    }

    /// The next puts to `path` fail with these errors, in order.
    pub fn script_put_errors(&self, path: &str, errors: Vec<RemoteError>) {
        self.state()
            .scripted_put_errors
            .insert(path.to_string(), errors.into());
    }

    /// Every put to `path` fails with `error`.
    pub fn fail_puts(&self, path: &str, error: RemoteError) {
        self.state().sticky_put_errors.insert(path.to_string(), error);
    }

    pub fn fail_gets(&self, path: &str, error: RemoteError) {
        self.state().get_errors.insert(path.to_string(), error);
    }

    pub fn fail_lists(&self, dir: &str, error: RemoteError) {
        self.state().list_errors.insert(dir.to_string(), error);
    }

    pub fn puts(&self) -> Vec<PutRecord> {
        self.state().puts.clone()
    }

    pub fn puts_to(&self, path: &str) -> Vec<PutRecord> {
        self.puts().into_iter().filter(|p| p.path == path).collect()
    }

    pub fn get_count(&self) -> usize {
        self.state().gets
    }

    fn apply_put(&self, request: &PutRequest<'_>) -> Result<VersionToken, RemoteError> {
        let mut state = self.state();
        let path = request.path.to_string();
        let version = request.version.map(|v| v.as_str().to_string());

        let scripted = state
            .scripted_put_errors
            .get_mut(&path)
            .and_then(VecDeque::pop_front);
        let failure = scripted.or_else(|| state.sticky_put_errors.get(&path).cloned());

        let failure = failure.or_else(|| match (state.files.get(&path), &version) {
            (Some(_), None) => Some(RemoteError::Unprocessable(format!("{path}: sha required"))),
            (Some((_, sha)), Some(v)) if sha.to_string() != *v => {
                Some(RemoteError::Conflict(format!("{path}: stale sha {v}")))
            }
            (None, Some(v)) => Some(RemoteError::Conflict(format!("{path}: no file for sha {v}"))),
            _ => None,
        });

        state.puts.push(PutRecord {
            path: path.clone(),
            at: Instant::now(),
            version,
            accepted: failure.is_none(),
        });
        if let Some(error) = failure {
            return Err(error);
        }

        state.next_sha += 1;
        let sha = state.next_sha;
        state.files.insert(path, (request.content.to_string(), sha));
        Ok(VersionToken(sha.to_string()))
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn get(&self, path: &str) -> Result<Option<RemoteFile>, RemoteError> {
        let mut state = self.state();
        state.gets += 1;
        if let Some(error) = state.get_errors.get(path) {
            return Err(error.clone());
        }
        Ok(state.files.get(path).map(|(content, sha)| RemoteFile {
            content: content.clone(),
            version: VersionToken(sha.to_string()),
        }))
    }

    async fn put(&self, request: PutRequest<'_>) -> Result<VersionToken, RemoteError> {
        if let Some(gate) = &self.gate {
            self.put_started.notify_one();
            gate.acquire().await.expect("gate closed").forget();
        }
        self.apply_put(&request)
    }

    async fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let state = self.state();
        if let Some(error) = state.list_errors.get(dir) {
            return Err(error.clone());
        }
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let mut seen = BTreeSet::new();
        let mut entries = Vec::new();
        for path in state.files.keys() {
            let Some(rest) = path.strip_prefix(&prefix) else { continue };
            let (name, kind) = match rest.split_once('/') {
                Some((child_dir, _)) => (child_dir, EntryKind::Dir),
                None => (rest, EntryKind::File),
            };
            if seen.insert(name.to_string()) {
                entries.push(RemoteEntry {
                    name: name.to_string(),
                    path: format!("{prefix}{name}"),
                    kind,
                });
            }
        }
        Ok(entries)
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// A minimal valid paper document in the remote format.
pub fn paper_doc(id: &str, title: &str) -> Value {
    serde_json::json!({
        "id": id,
        "title": title,
        "authors": ["A. Author"],
        "abstract": format!("Abstract of {title}"),
        "url": format!("https://arxiv.org/abs/{}", id.trim_start_matches("arxiv:")),
        "status": "saved",
        "source": "arxiv",
    })
}
