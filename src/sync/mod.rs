//! Synchronization Engine.
//!
//! Pushes cache entities to the remote store ([`save`]), keeps the manifest in
//! step, and rebuilds the cache from the remote ([`hydrate`]). The remote is the
//! system of record; on divergence the remote wins.
//!
//! Expected remote conditions never surface as `Err`. Saves report a
//! [`SaveOutcome`]; hydration counts per-item failures in its stats.

pub mod hydrate;
pub mod queue;
pub mod retry;
pub mod save;
pub mod session;

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::cache::CacheStore;
use crate::config::MacpConfig;
use crate::error::RemoteError;
use crate::layout::Layout;
use crate::remote::{RemoteStore, VersionToken};

pub use hydrate::HydrationStats;
pub use queue::{QueueStats, SyncJob, SyncQueue};
pub use retry::RetryPolicy;
pub use session::{Principal, SyncSession};

/// Result of pushing one document to the remote.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// The remote accepted the write.
    Written { attempts: u32, version: VersionToken },
    /// Nothing needed writing.
    Skipped { reason: String },
    /// The entity failed validation; no network call was made.
    Invalid { errors: Vec<String> },
    /// A deterministic failure (auth, permission, not found, unprocessable).
    Rejected { attempts: u32, error: RemoteError },
    /// Transient failures on every attempt.
    Exhausted { attempts: u32, error: RemoteError },
}

impl SaveOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written { .. })
    }

    /// Number of remote attempts made; zero when none were.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Written { attempts, .. }
            | Self::Rejected { attempts, .. }
            | Self::Exhausted { attempts, .. } => *attempts,
            Self::Skipped { .. } | Self::Invalid { .. } => 0,
        }
    }

    pub(crate) fn from_attempts(result: Result<VersionToken, RemoteError>, attempts: u32) -> Self {
        match result {
            Ok(version) => Self::Written { attempts, version },
            Err(error) if error.is_transient() => Self::Exhausted { attempts, error },
            Err(error) => Self::Rejected { attempts, error },
        }
    }
}

// One manifest writer per remote store in this process, keyed by store identity.
static MANIFEST_LOCKS: Lazy<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn manifest_lock_for(store: &str) -> Arc<tokio::sync::Mutex<()>> {
    let mut locks = MANIFEST_LOCKS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    Arc::clone(locks.entry(store.to_string()).or_default())
}

/// Binds one remote store, one cache, and one owning principal.
pub struct SyncEngine {
    remote: Arc<dyn RemoteStore>,
    cache: CacheStore,
    owner: String,
    layout: Layout,
    legacy: Layout,
    retry: RetryPolicy,
    manifest_lock: Option<Arc<tokio::sync::Mutex<()>>>,
}

impl SyncEngine {
    /// Engine with the default layout, retry policy, and a serialized manifest writer.
    pub fn new(remote: Arc<dyn RemoteStore>, cache: CacheStore, owner: impl Into<String>) -> Self {
        let lock = manifest_lock_for(&remote.describe());
        Self {
            remote,
            cache,
            owner: owner.into(),
            layout: Layout::current(),
            legacy: Layout::legacy(),
            retry: RetryPolicy::default(),
            manifest_lock: Some(lock),
        }
    }

    pub fn from_config(
        remote: Arc<dyn RemoteStore>,
        cache: CacheStore,
        owner: impl Into<String>,
        config: &MacpConfig,
    ) -> Self {
        Self::new(remote, cache, owner)
            .with_layouts(
                Layout::new(config.remote.root.as_str()),
                Layout::new(config.remote.legacy_root.as_str()),
            )
            .with_retry(RetryPolicy::from_config(&config.sync))
            .with_serialized_manifest(config.sync.serialize_manifest_writes)
    }

    pub fn with_layouts(mut self, current: Layout, legacy: Layout) -> Self {
        self.layout = current;
        self.legacy = legacy;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Turn the per-store manifest writer lock on or off. With it off,
    /// concurrent manifest updates can lose each other's entries.
    pub fn with_serialized_manifest(mut self, enabled: bool) -> Self {
        self.manifest_lock = enabled.then(|| manifest_lock_for(&self.remote.describe()));
        self
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn legacy_layout(&self) -> &Layout {
        &self.legacy
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }
}
