//! CLI `hydrate` command: rebuild the cache from the repository.

use anyhow::{Context, Result};

use macp_sync::config::MacpConfig;

pub async fn hydrate(config: &MacpConfig) -> Result<()> {
    let cache = super::open_cache(config)?;
    let session = super::open_session(config, cache)?;

    let pb = super::spinner(&format!("Hydrating from {}", session.repo()));
    let result = session.engine().hydrate().await;
    pb.finish_and_clear();
    let stats = result.with_context(|| format!("could not read {}", session.repo()))?;

    println!("Hydration from {} ({})", session.repo(), stats.root);
    println!("{}", "=".repeat(40));
    println!("  Papers:      {}", stats.papers);
    println!("  Analyses:    {}", stats.analyses);
    println!("  Notes:       {}", stats.notes);
    println!("  Skipped:     {}", stats.skipped);
    println!("  Errors:      {}", stats.errors);
    if stats.errors > 0 {
        println!();
        println!("Some items could not be read; see the log for details.");
    }
    Ok(())
}
