//! CLI `save-paper` command: validate, cache, then push through the queue.

use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;

use macp_sync::cache::papers;
use macp_sync::codec;
use macp_sync::config::MacpConfig;
use macp_sync::sync::SyncJob;
use macp_sync::validate::{validator, EntityKind};

pub async fn save_paper(config: &MacpConfig, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let data: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("{} is not JSON", file.display()))?;

    let check = validator().validate(EntityKind::Paper, &data);
    if !check.valid {
        bail!("paper rejected: {}", check.errors.join("; "));
    }
    let mut paper = codec::decode_paper(&raw).map_err(|e| anyhow!(e))?;

    let cache = super::open_cache(config)?;
    let session = super::open_session(config, cache.clone())?;
    if paper.owner.is_none() {
        paper.owner = Some(session.principal().login.clone());
    }

    let cached = paper.clone();
    let outcome = cache
        .call(move |conn| papers::record_discovery(conn, &cached))
        .await?;
    println!("cache: {} ({:?})", paper.arxiv_id, outcome);

    let queue = session.start_queue(config);
    queue
        .enqueue(SyncJob::Paper(paper))
        .map_err(|e| anyhow!(e))?;
    let pb = super::spinner("Pushing to remote");
    queue.shutdown().await;
    pb.finish_and_clear();

    let stats = queue.stats();
    if stats.written == 0 {
        bail!("remote save failed; the paper stays in the local cache");
    }
    println!("remote: saved to {}", session.repo());
    Ok(())
}
