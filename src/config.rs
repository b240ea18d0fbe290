use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MacpConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RemoteConfig {
    pub api_base: String,
    /// `owner/name` of the connected repository.
    pub repository: String,
    /// Access token as stored at rest. Passed through the configured decryptor.
    pub token: String,
    /// Login of the principal owning the cache rows written by hydration.
    pub owner: String,
    pub root: String,
    pub legacy_root: String,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SyncConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub queue_capacity: usize,
    pub workers: usize,
    pub serialize_manifest_writes: bool,
}

impl Default for MacpConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            remote: RemoteConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_macp_dir()
            .join("cache.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".into(),
            repository: String::new(),
            token: String::new(),
            owner: String::new(),
            root: crate::layout::CURRENT_ROOT.into(),
            legacy_root: crate::layout::LEGACY_ROOT.into(),
            read_timeout_secs: 15,
            write_timeout_secs: 30,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 2000,
            queue_capacity: 64,
            workers: 2,
            serialize_manifest_writes: true,
        }
    }
}

impl RemoteConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

impl SyncConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

/// Returns `~/.macp/`
pub fn default_macp_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".macp")
}

/// Returns the default config file path: `~/.macp/config.toml`
pub fn default_config_path() -> PathBuf {
    default_macp_dir().join("config.toml")
}

impl MacpConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MacpConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (MACP_DB, MACP_REPO, MACP_TOKEN, MACP_OWNER, MACP_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MACP_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("MACP_REPO") {
            self.remote.repository = val;
        }
        if let Ok(val) = std::env::var("MACP_TOKEN") {
            self.remote.token = val;
        }
        if let Ok(val) = std::env::var("MACP_OWNER") {
            self.remote.owner = val;
        }
        if let Ok(val) = std::env::var("MACP_LOG_LEVEL") {
            self.server.log_level = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
