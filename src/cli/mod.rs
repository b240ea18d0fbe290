pub mod hydrate;
pub mod init;
pub mod save_paper;
pub mod status;
pub mod validate;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use macp_sync::cache::CacheStore;
use macp_sync::config::MacpConfig;
use macp_sync::db;
use macp_sync::remote::PlaintextToken;
use macp_sync::sync::{Principal, SaveOutcome, SyncSession};

/// Open the on-disk cache named by the config.
pub fn open_cache(config: &MacpConfig) -> Result<CacheStore> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)
        .with_context(|| format!("failed to open cache at {}", db_path.display()))?;
    Ok(CacheStore::new(conn))
}

/// Open a session for the principal described by `[remote]`.
pub fn open_session(config: &MacpConfig, cache: CacheStore) -> Result<SyncSession> {
    let principal = Principal::from_config(config);
    SyncSession::open(principal, config, cache, &PlaintextToken)
        .context("cannot connect to the remote repository (set MACP_REPO and MACP_TOKEN)")
}

pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg} [{elapsed}]") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// One-line description of a save outcome for terminal output.
pub fn describe_outcome(outcome: &SaveOutcome) -> String {
    match outcome {
        SaveOutcome::Written { attempts, version } => {
            format!("written ({} attempt{}, sha {})", attempts, if *attempts == 1 { "" } else { "s" }, version.as_str())
        }
        SaveOutcome::Skipped { reason } => format!("skipped: {reason}"),
        SaveOutcome::Invalid { errors } => format!("invalid: {}", errors.join("; ")),
        SaveOutcome::Rejected { attempts, error } => format!("rejected after {attempts} attempt(s): {error}"),
        SaveOutcome::Exhausted { attempts, error } => format!("gave up after {attempts} attempts: {error}"),
    }
}
