//! CLI `status` command: cache health and counts, plus remote manifest sizes.

use anyhow::{Context, Result};

use macp_sync::cache::stats::cache_stats;
use macp_sync::cache::types::PaperStatus;
use macp_sync::config::MacpConfig;
use macp_sync::db;

pub async fn status(config: &MacpConfig, offline: bool) -> Result<()> {
    let db_path = config.resolved_db_path();
    if !db_path.exists() {
        println!("Cache: not found at {}", db_path.display());
        println!("Run `macp-sync hydrate` to build it.");
        return Ok(());
    }

    let cache = super::open_cache(config)?;
    let (report, stats) = cache
        .call(|conn| {
            let report = db::check_database_health(conn).context("failed to run health check")?;
            let stats = cache_stats(conn, None)?;
            Ok((report, stats))
        })
        .await?;

    println!("Cache");
    println!("{}", "=".repeat(40));
    println!("  Database:        {}", db_path.display());
    println!("  Schema version:  {}", report.schema_version);
    println!(
        "  Integrity:       {}",
        if report.integrity_ok { "ok".to_string() } else { format!("FAILED ({})", report.integrity_details) }
    );
    println!("  Last hydrated:   {}", stats.last_hydrated_at.as_deref().unwrap_or("never"));
    println!();
    println!("  Papers:          {}", stats.papers);
    for status in PaperStatus::ALL {
        let count = stats.papers_by_status.get(status.as_str()).copied().unwrap_or(0);
        println!("    {:<14} {}", status.as_str(), count);
    }
    println!("  Analyses:        {}", stats.analyses);
    println!("  Notes:           {}", stats.notes);
    println!("  Sync log:        {}", report.log_count);

    if offline {
        return Ok(());
    }

    let session = super::open_session(config, cache)?;
    println!();
    println!("Remote {}", session.repo());
    println!("{}", "=".repeat(40));
    match session.engine().fetch_manifest().await {
        Ok(Some(manifest)) => {
            println!("  Manifest:        v{} ({})", manifest.version, manifest.updated_at.as_deref().unwrap_or("never updated"));
            for (section, count) in manifest.counts() {
                println!("    {:<14} {}", section, count);
            }
        }
        Ok(None) => println!("  Manifest:        missing (run `macp-sync init`)"),
        Err(e) => println!("  Manifest:        unreadable ({e})"),
    }
    Ok(())
}
