use anyhow::{bail, Result};
use rusqlite::{params, Connection, Row};

use super::json_list;
use super::types::{normalize_paper_id, Analysis};
use super::write_sync_log;
use crate::cache::papers::paper_row_id;

const ANALYSIS_COLUMNS: &str = "a.id, p.arxiv_id, a.provider, a.owner, a.summary, a.key_findings, \
     a.methodology, a.research_gaps, a.tags, a.strength_score, a.provenance, a.analyzed_at";

fn row_to_analysis(row: &Row<'_>) -> rusqlite::Result<Analysis> {
    let findings: String = row.get(5)?;
    let gaps: String = row.get(7)?;
    let tags: String = row.get(8)?;
    let provenance: String = row.get(10)?;
    Ok(Analysis {
        id: Some(row.get(0)?),
        arxiv_id: row.get(1)?,
        provider: row.get(2)?,
        owner: row.get(3)?,
        summary: row.get(4)?,
        key_findings: json_list(&findings),
        methodology: row.get(6)?,
        research_gaps: json_list(&gaps),
        tags: json_list(&tags),
        strength_score: row.get(9)?,
        provenance: serde_json::from_str(&provenance).unwrap_or_default(),
        analyzed_at: row.get(11)?,
    })
}

/// Insert an analysis for an existing paper. Returns the new row id.
///
/// The cache allows several analyses per paper, even from the same provider;
/// callers that need one-per-provider check [`analysis_exists`] first.
pub fn insert_analysis(conn: &Connection, analysis: &Analysis) -> Result<i64> {
    let Some(paper_id) = paper_row_id(conn, &analysis.arxiv_id)? else {
        bail!("paper not found: {}", analysis.arxiv_id);
    };
    conn.execute(
        "INSERT INTO analyses (paper_id, owner, provider, summary, key_findings, methodology, \
         research_gaps, tags, strength_score, provenance, analysis_type, analyzed_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            paper_id,
            analysis.owner,
            analysis.provider,
            analysis.summary,
            serde_json::to_string(&analysis.key_findings)?,
            analysis.methodology,
            serde_json::to_string(&analysis.research_gaps)?,
            serde_json::to_string(&analysis.tags)?,
            analysis.strength_score,
            serde_json::to_string(&analysis.provenance)?,
            analysis.provenance.analysis_type.as_str(),
            analysis.analyzed_at,
        ],
    )?;
    let id = conn.last_insert_rowid();
    write_sync_log(
        conn,
        "insert",
        "analysis",
        &format!("{}/{}", normalize_paper_id(&analysis.arxiv_id), analysis.provider),
        Some(&serde_json::json!({"id": id})),
    )?;
    Ok(id)
}

/// Whether the cache already holds an analysis of this paper by this provider.
pub fn analysis_exists(conn: &Connection, arxiv_id: &str, provider: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM analyses a JOIN papers p ON p.id = a.paper_id \
         WHERE p.arxiv_id = ?1 AND a.provider = ?2",
        params![normalize_paper_id(arxiv_id), provider],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// All analyses of a paper, oldest first.
pub fn list_analyses(conn: &Connection, arxiv_id: &str) -> Result<Vec<Analysis>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ANALYSIS_COLUMNS} FROM analyses a JOIN papers p ON p.id = a.paper_id \
         WHERE p.arxiv_id = ?1 ORDER BY a.id"
    ))?;
    let rows = stmt
        .query_map(params![normalize_paper_id(arxiv_id)], row_to_analysis)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Set the owner on an analysis that has none. Returns `true` if the row changed.
pub fn backfill_analysis_owner(conn: &Connection, analysis_id: i64, owner: &str) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE analyses SET owner = ?1 WHERE id = ?2 AND owner IS NULL",
        params![owner, analysis_id],
    )?;
    if rows > 0 {
        write_sync_log(
            conn,
            "backfill",
            "analysis",
            &analysis_id.to_string(),
            Some(&serde_json::json!({"owner": owner})),
        )?;
    }
    Ok(rows > 0)
}
