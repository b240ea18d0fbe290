use anyhow::Result;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::BTreeMap;

/// Cache counts shown by `macp-sync status`.
#[derive(Debug, Serialize)]
pub struct CacheStats {
    pub papers: u64,
    pub analyses: u64,
    pub notes: u64,
    pub papers_by_status: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_hydrated_at: Option<String>,
}

/// Compute cache statistics, optionally restricted to one owner.
pub fn cache_stats(conn: &Connection, owner: Option<&str>) -> Result<CacheStats> {
    let papers: i64 = conn.query_row(
        "SELECT COUNT(*) FROM papers WHERE (?1 IS NULL OR owner = ?1)",
        params![owner],
        |row| row.get(0),
    )?;
    let analyses: i64 = conn.query_row(
        "SELECT COUNT(*) FROM analyses a JOIN papers p ON p.id = a.paper_id \
         WHERE (?1 IS NULL OR p.owner = ?1)",
        params![owner],
        |row| row.get(0),
    )?;
    let notes: i64 = conn.query_row(
        "SELECT COUNT(*) FROM notes WHERE (?1 IS NULL OR owner = ?1)",
        params![owner],
        |row| row.get(0),
    )?;

    let mut papers_by_status = BTreeMap::new();
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) FROM papers WHERE (?1 IS NULL OR owner = ?1) GROUP BY status",
    )?;
    let rows = stmt.query_map(params![owner], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    for row in rows {
        let (status, count) = row?;
        papers_by_status.insert(status, count as u64);
    }

    Ok(CacheStats {
        papers: papers as u64,
        analyses: analyses as u64,
        notes: notes as u64,
        papers_by_status,
        last_hydrated_at: crate::db::migrations::get_last_hydrated(conn)?,
    })
}
