//! CLI `init` command: create the manifest in the connected repository.

use anyhow::{bail, Result};

use macp_sync::config::MacpConfig;
use macp_sync::sync::SaveOutcome;

pub async fn init(config: &MacpConfig) -> Result<()> {
    let cache = super::open_cache(config)?;
    let session = super::open_session(config, cache)?;
    let engine = session.engine();

    let outcome = engine.init_repository().await;
    println!("{}: {}", engine.layout().manifest(), super::describe_outcome(&outcome));
    match outcome {
        SaveOutcome::Written { .. } | SaveOutcome::Skipped { .. } => Ok(()),
        _ => bail!("failed to initialize {}", session.repo()),
    }
}
