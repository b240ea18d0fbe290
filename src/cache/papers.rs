//! Paper rows: discovery, remote upsert, status transitions, purge.
//!
//! Papers are matched by their business key (`arxiv_id`), never by row id.
//! Two merge rules exist. [`record_discovery`] only fills fields that are still
//! empty, because a repeated search must not clobber what the user already saved.
//! [`upsert_from_remote`] lets the remote document win, except that status never
//! moves backwards, which keeps repeated hydration runs from undoing analyses.

use anyhow::{bail, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use super::json_list;
use super::types::{normalize_paper_id, Paper, PaperStatus};
use super::write_sync_log;
use crate::codec;
use crate::validate::{validator, EntityKind};

/// What an upsert did to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

const PAPER_COLUMNS: &str =
    "arxiv_id, title, authors, abstract, url, source, status, owner, added_at";

fn row_to_paper(row: &Row<'_>) -> rusqlite::Result<Paper> {
    let authors: String = row.get(2)?;
    let status: String = row.get(6)?;
    Ok(Paper {
        arxiv_id: row.get(0)?,
        title: row.get(1)?,
        authors: json_list(&authors),
        abstract_text: row.get(3)?,
        url: row.get(4)?,
        source: row.get(5)?,
        status: status.parse().unwrap_or_default(),
        owner: row.get(7)?,
        added_at: row.get(8)?,
    })
}

/// Fetch a paper by business key.
pub fn get_paper(conn: &Connection, arxiv_id: &str) -> Result<Option<Paper>> {
    let arxiv_id = normalize_paper_id(arxiv_id);
    let paper = conn
        .query_row(
            &format!("SELECT {PAPER_COLUMNS} FROM papers WHERE arxiv_id = ?1"),
            params![arxiv_id],
            row_to_paper,
        )
        .optional()?;
    Ok(paper)
}

/// Surrogate row id for a business key.
pub fn paper_row_id(conn: &Connection, arxiv_id: &str) -> Result<Option<i64>> {
    let arxiv_id = normalize_paper_id(arxiv_id);
    let id = conn
        .query_row(
            "SELECT id FROM papers WHERE arxiv_id = ?1",
            params![arxiv_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// List papers, optionally restricted to one owner, oldest first.
pub fn list_papers(conn: &Connection, owner: Option<&str>) -> Result<Vec<Paper>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PAPER_COLUMNS} FROM papers \
         WHERE (?1 IS NULL OR owner = ?1) ORDER BY id"
    ))?;
    let papers = stmt
        .query_map(params![owner], row_to_paper)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(papers)
}

/// Refuse a paper the schema validator rejects. Both write paths call this first.
fn ensure_valid(paper: &Paper) -> Result<()> {
    let check = validator().validate(EntityKind::Paper, &codec::paper_document(paper));
    if !check.valid {
        bail!("invalid paper {:?}: {}", paper.arxiv_id, check.errors.join("; "));
    }
    Ok(())
}

/// Record a paper seen by a search. Existing rows only get their empty fields filled.
pub fn record_discovery(conn: &mut Connection, paper: &Paper) -> Result<UpsertOutcome> {
    ensure_valid(paper)?;
    let tx = conn.transaction()?;
    let outcome = match get_paper(&tx, &paper.arxiv_id)? {
        None => {
            insert_paper(&tx, paper, paper.owner.as_deref())?;
            UpsertOutcome::Inserted
        }
        Some(existing) => {
            let mut merged = existing.clone();
            fill_if_empty(&mut merged.title, &paper.title);
            fill_if_empty(&mut merged.abstract_text, &paper.abstract_text);
            fill_if_empty(&mut merged.url, &paper.url);
            if merged.authors.is_empty() {
                merged.authors = paper.authors.clone();
            }
            if merged.source == "unknown" && !paper.source.is_empty() {
                merged.source = paper.source.clone();
            }
            if merged.owner.is_none() {
                merged.owner = paper.owner.clone();
            }
            apply_merge(&tx, &existing, &merged)?
        }
    };
    tx.commit()?;
    Ok(outcome)
}

/// Insert or overwrite a paper from its remote document.
///
/// Non-empty remote fields replace cached ones. Status only advances. `owner`
/// is back-filled onto rows that have none.
pub fn upsert_from_remote(
    conn: &mut Connection,
    paper: &Paper,
    owner: Option<&str>,
) -> Result<UpsertOutcome> {
    ensure_valid(paper)?;
    let tx = conn.transaction()?;
    let outcome = match get_paper(&tx, &paper.arxiv_id)? {
        None => {
            insert_paper(&tx, paper, owner.or(paper.owner.as_deref()))?;
            UpsertOutcome::Inserted
        }
        Some(existing) => {
            let mut merged = existing.clone();
            overwrite_if_present(&mut merged.title, &paper.title);
            overwrite_if_present(&mut merged.abstract_text, &paper.abstract_text);
            overwrite_if_present(&mut merged.url, &paper.url);
            if !paper.authors.is_empty() {
                merged.authors = paper.authors.clone();
            }
            if paper.status.rank() > merged.status.rank() {
                merged.status = paper.status;
            }
            if merged.owner.is_none() {
                merged.owner = owner.map(str::to_string).or_else(|| paper.owner.clone());
            }
            apply_merge(&tx, &existing, &merged)?
        }
    };
    tx.commit()?;
    Ok(outcome)
}

fn fill_if_empty(slot: &mut String, candidate: &str) {
    if slot.is_empty() && !candidate.is_empty() {
        *slot = candidate.to_string();
    }
}

fn overwrite_if_present(slot: &mut String, candidate: &str) {
    if !candidate.is_empty() {
        *slot = candidate.to_string();
    }
}

fn insert_paper(conn: &Connection, paper: &Paper, owner: Option<&str>) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    let arxiv_id = normalize_paper_id(&paper.arxiv_id);
    let added_at = paper.added_at.clone().unwrap_or_else(|| now.clone());
    conn.execute(
        "INSERT INTO papers (arxiv_id, owner, title, authors, abstract, url, source, status, added_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            arxiv_id,
            owner,
            paper.title,
            serde_json::to_string(&paper.authors)?,
            paper.abstract_text,
            paper.url,
            paper.source,
            paper.status.as_str(),
            added_at,
            now,
        ],
    )?;
    write_sync_log(conn, "insert", "paper", &arxiv_id, None)?;
    Ok(())
}

fn apply_merge(conn: &Connection, existing: &Paper, merged: &Paper) -> Result<UpsertOutcome> {
    if existing == merged {
        return Ok(UpsertOutcome::Unchanged);
    }
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE papers SET title = ?1, authors = ?2, abstract = ?3, url = ?4, source = ?5, \
         status = ?6, owner = ?7, updated_at = ?8 WHERE arxiv_id = ?9",
        params![
            merged.title,
            serde_json::to_string(&merged.authors)?,
            merged.abstract_text,
            merged.url,
            merged.source,
            merged.status.as_str(),
            merged.owner,
            now,
            existing.arxiv_id,
        ],
    )?;
    let mut details = serde_json::Map::new();
    if existing.status != merged.status {
        details.insert("status".into(), merged.status.as_str().into());
    }
    if existing.owner != merged.owner {
        details.insert("owner".into(), serde_json::json!(merged.owner));
    }
    write_sync_log(
        conn,
        "update",
        "paper",
        &existing.arxiv_id,
        Some(&serde_json::Value::Object(details)),
    )?;
    Ok(UpsertOutcome::Updated)
}

/// Set a paper's status unconditionally.
pub fn set_status(conn: &Connection, arxiv_id: &str, status: PaperStatus) -> Result<()> {
    let arxiv_id = normalize_paper_id(arxiv_id);
    let rows = conn.execute(
        "UPDATE papers SET status = ?1, updated_at = ?2 WHERE arxiv_id = ?3",
        params![status.as_str(), chrono::Utc::now().to_rfc3339(), arxiv_id],
    )?;
    if rows == 0 {
        bail!("paper not found: {arxiv_id}");
    }
    write_sync_log(
        conn,
        "update",
        "paper",
        &arxiv_id,
        Some(&serde_json::json!({"status": status.as_str()})),
    )?;
    Ok(())
}

/// Move a paper forward to `status` if it is currently earlier in the lifecycle.
///
/// Returns `true` if the row changed.
pub fn advance_status(conn: &Connection, arxiv_id: &str, status: PaperStatus) -> Result<bool> {
    let Some(current) = get_paper(conn, arxiv_id)? else {
        bail!("paper not found: {arxiv_id}");
    };
    if current.status.rank() >= status.rank() {
        return Ok(false);
    }
    conn.execute(
        "UPDATE papers SET status = ?1, updated_at = ?2 WHERE arxiv_id = ?3",
        params![
            status.as_str(),
            chrono::Utc::now().to_rfc3339(),
            current.arxiv_id
        ],
    )?;
    write_sync_log(
        conn,
        "promote",
        "paper",
        &current.arxiv_id,
        Some(&serde_json::json!({"from": current.status.as_str(), "to": status.as_str()})),
    )?;
    Ok(true)
}

/// Permanently delete a paper and its analyses. Linked notes are kept, unlinked.
pub fn purge_paper(conn: &mut Connection, arxiv_id: &str) -> Result<bool> {
    let arxiv_id = normalize_paper_id(arxiv_id);
    let tx = conn.transaction()?;
    let rows = tx.execute("DELETE FROM papers WHERE arxiv_id = ?1", params![arxiv_id])?;
    if rows > 0 {
        write_sync_log(&tx, "purge", "paper", &arxiv_id, None)?;
    }
    tx.commit()?;
    Ok(rows > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn sample(id: &str) -> Paper {
        let mut paper = Paper::new(id, "Attention Is All You Need");
        paper.authors = vec!["Vaswani".into()];
        paper.abstract_text = "Transformers.".into();
        paper.source = "arxiv".into();
        paper
    }

    #[test]
    fn discovery_inserts_then_only_fills_empty_fields() {
        let mut conn = db::open_memory_database().unwrap();
        let mut first = sample("1706.03762");
        first.abstract_text.clear();
        assert_eq!(record_discovery(&mut conn, &first).unwrap(), UpsertOutcome::Inserted);

        let mut again = sample("1706.03762");
        again.title = "A Different Title".into();
        assert_eq!(record_discovery(&mut conn, &again).unwrap(), UpsertOutcome::Updated);

        let stored = get_paper(&conn, "arxiv:1706.03762").unwrap().unwrap();
        assert_eq!(stored.title, "Attention Is All You Need");
        assert_eq!(stored.abstract_text, "Transformers.");
    }

    #[test]
    fn remote_upsert_overwrites_but_never_regresses_status() {
        let mut conn = db::open_memory_database().unwrap();
        let mut paper = sample("2401.00001");
        paper.status = PaperStatus::Analyzed;
        upsert_from_remote(&mut conn, &paper, Some("octo")).unwrap();

        let mut remote = sample("2401.00001");
        remote.title = "Renamed".into();
        remote.status = PaperStatus::Saved;
        assert_eq!(
            upsert_from_remote(&mut conn, &remote, Some("octo")).unwrap(),
            UpsertOutcome::Updated
        );

        let stored = get_paper(&conn, "2401.00001").unwrap().unwrap();
        assert_eq!(stored.title, "Renamed");
        assert_eq!(stored.status, PaperStatus::Analyzed);
        assert_eq!(stored.owner.as_deref(), Some("octo"));
    }

    #[test]
    fn identical_upsert_is_unchanged() {
        let mut conn = db::open_memory_database().unwrap();
        let paper = sample("2401.00002");
        upsert_from_remote(&mut conn, &paper, None).unwrap();
        assert_eq!(
            upsert_from_remote(&mut conn, &paper, None).unwrap(),
            UpsertOutcome::Unchanged
        );
    }

    #[test]
    fn owner_is_backfilled_once() {
        let mut conn = db::open_memory_database().unwrap();
        upsert_from_remote(&mut conn, &sample("2401.00003"), None).unwrap();
        upsert_from_remote(&mut conn, &sample("2401.00003"), Some("alice")).unwrap();
        upsert_from_remote(&mut conn, &sample("2401.00003"), Some("bob")).unwrap();
        let stored = get_paper(&conn, "2401.00003").unwrap().unwrap();
        assert_eq!(stored.owner.as_deref(), Some("alice"));
    }

    #[test]
    fn advance_status_only_moves_forward() {
        let mut conn = db::open_memory_database().unwrap();
        record_discovery(&mut conn, &sample("2401.00004")).unwrap();

        assert!(advance_status(&conn, "2401.00004", PaperStatus::Analyzed).unwrap());
        assert!(!advance_status(&conn, "2401.00004", PaperStatus::Saved).unwrap());

        set_status(&conn, "2401.00004", PaperStatus::Saved).unwrap();
        let stored = get_paper(&conn, "2401.00004").unwrap().unwrap();
        assert_eq!(stored.status, PaperStatus::Saved);
    }

    #[test]
    fn set_status_on_missing_paper_fails() {
        let conn = db::open_memory_database().unwrap();
        let err = set_status(&conn, "2401.99999", PaperStatus::Saved).unwrap_err();
        assert!(err.to_string().contains("paper not found"));
    }

    #[test]
    fn purge_removes_paper() {
        let mut conn = db::open_memory_database().unwrap();
        record_discovery(&mut conn, &sample("2401.00005")).unwrap();
        assert!(purge_paper(&mut conn, "2401.00005").unwrap());
        assert!(!purge_paper(&mut conn, "2401.00005").unwrap());
        assert!(get_paper(&conn, "2401.00005").unwrap().is_none());
    }

    #[test]
    fn invalid_papers_never_reach_the_cache() {
        let mut conn = db::open_memory_database().unwrap();
        let untitled = Paper::new("2401.00008", "");
        let unidentified = Paper::new("", "No id");

        assert!(record_discovery(&mut conn, &untitled).is_err());
        assert!(record_discovery(&mut conn, &unidentified).is_err());
        let err = upsert_from_remote(&mut conn, &untitled, Some("octo")).unwrap_err();
        assert!(err.to_string().contains("title"), "{err}");
        assert!(upsert_from_remote(&mut conn, &unidentified, None).is_err());

        assert!(list_papers(&conn, None).unwrap().is_empty());
    }

    #[test]
    fn list_filters_by_owner() {
        let mut conn = db::open_memory_database().unwrap();
        upsert_from_remote(&mut conn, &sample("2401.00006"), Some("alice")).unwrap();
        upsert_from_remote(&mut conn, &sample("2401.00007"), Some("bob")).unwrap();

        assert_eq!(list_papers(&conn, None).unwrap().len(), 2);
        let alice = list_papers(&conn, Some("alice")).unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].arxiv_id, "arxiv:2401.00006");
    }
}
