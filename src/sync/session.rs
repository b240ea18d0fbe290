//! Per-principal sync sessions.
//!
//! Authentication state travels in a [`SyncSession`] built for one principal,
//! never in process-wide flags, so concurrent requests for different users
//! cannot observe each other's credentials or repository.

use std::sync::Arc;

use super::{SyncEngine, SyncQueue};
use crate::cache::CacheStore;
use crate::config::MacpConfig;
use crate::error::ConfigError;
use crate::remote::{GitHubContents, RemoteStore, RepoId, TokenDecryptor};

/// The user on whose behalf the engine talks to the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub login: String,
    /// Connected repository as `owner/name`, unvalidated.
    pub repository: Option<String>,
    /// Access token in its stored, possibly encrypted, form.
    pub sealed_token: Option<String>,
}

impl Principal {
    /// The principal described by the `[remote]` config section.
    ///
    /// An empty `owner` falls back to the repository owner.
    pub fn from_config(config: &MacpConfig) -> Self {
        let remote = &config.remote;
        let non_empty = |s: &str| (!s.trim().is_empty()).then(|| s.trim().to_string());
        let login = non_empty(&remote.owner)
            .or_else(|| {
                remote
                    .repository
                    .split_once('/')
                    .map(|(owner, _)| owner.to_string())
            })
            .unwrap_or_else(|| "local".into());
        Self {
            login,
            repository: non_empty(&remote.repository),
            sealed_token: non_empty(&remote.token),
        }
    }
}

pub struct SyncSession {
    principal: Principal,
    repo: RepoId,
    engine: Arc<SyncEngine>,
}

impl std::fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSession")
            .field("login", &self.principal.login)
            .field("repo", &self.repo)
            .finish_non_exhaustive()
    }
}

impl SyncSession {
    /// Validate the principal's repository and credentials and connect to GitHub.
    ///
    /// Fails before any network call when the repository identifier is unsafe
    /// or the token is missing.
    pub fn open(
        principal: Principal,
        config: &MacpConfig,
        cache: CacheStore,
        decryptor: &dyn TokenDecryptor,
    ) -> Result<Self, ConfigError> {
        let raw_repo = principal
            .repository
            .as_deref()
            .ok_or(ConfigError::MissingRepository)?;
        let repo = RepoId::parse(raw_repo)?;
        let sealed = principal
            .sealed_token
            .as_deref()
            .ok_or_else(|| ConfigError::MissingCredentials(format!("no token for {}", principal.login)))?;
        let token = decryptor.decrypt(sealed)?;

        let remote = GitHubContents::new(
            &config.remote.api_base,
            repo.clone(),
            &token,
            config.remote.read_timeout(),
            config.remote.write_timeout(),
        )?;
        tracing::debug!(login = %principal.login, repo = %repo, "sync session opened");
        Ok(Self::with_remote(principal, repo, Arc::new(remote), cache, config))
    }

    /// Session over an already-built remote store.
    pub fn with_remote(
        principal: Principal,
        repo: RepoId,
        remote: Arc<dyn RemoteStore>,
        cache: CacheStore,
        config: &MacpConfig,
    ) -> Self {
        let engine = SyncEngine::from_config(remote, cache, principal.login.clone(), config);
        Self {
            principal,
            repo,
            engine: Arc::new(engine),
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn repo(&self) -> &RepoId {
        &self.repo
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Start a background queue feeding this session's engine.
    pub fn start_queue(&self, config: &MacpConfig) -> SyncQueue {
        SyncQueue::start(
            Arc::clone(&self.engine),
            config.sync.queue_capacity,
            config.sync.workers,
        )
    }
}
