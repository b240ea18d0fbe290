use anyhow::{bail, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::json_list;
use super::types::Note;
use super::write_sync_log;
use crate::cache::papers::paper_row_id;

const NOTE_COLUMNS: &str =
    "n.id, n.owner, p.arxiv_id, n.content, n.tags, n.created_at, n.updated_at";

fn row_to_note(row: &Row<'_>) -> rusqlite::Result<Note> {
    let tags: String = row.get(4)?;
    Ok(Note {
        id: Some(row.get(0)?),
        owner: row.get(1)?,
        arxiv_id: row.get(2)?,
        content: row.get(3)?,
        tags: json_list(&tags),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn linked_paper(conn: &Connection, note: &Note) -> Result<Option<i64>> {
    match &note.arxiv_id {
        Some(arxiv_id) => paper_row_id(conn, arxiv_id),
        None => Ok(None),
    }
}

/// Insert a note. Returns the row id, which also names the remote file.
///
/// A note that already has an id (one read back from `note_{id}.md`) keeps it;
/// otherwise SQLite assigns the next one. A link to a paper that is not cached
/// is dropped rather than rejected.
pub fn insert_note(conn: &Connection, note: &Note) -> Result<i64> {
    if note.owner.is_empty() {
        bail!("note must have an owner");
    }
    let paper_id = linked_paper(conn, note)?;
    conn.execute(
        "INSERT INTO notes (id, owner, paper_id, content, tags, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            note.id,
            note.owner,
            paper_id,
            note.content,
            serde_json::to_string(&note.tags)?,
            note.created_at,
            note.updated_at,
        ],
    )?;
    let id = conn.last_insert_rowid();
    write_sync_log(conn, "insert", "note", &id.to_string(), None)?;
    Ok(id)
}

/// Overwrite note `id` with a remote copy. Returns `false` when nothing differed.
pub fn replace_note(conn: &Connection, id: i64, note: &Note) -> Result<bool> {
    let paper_id = linked_paper(conn, note)?;
    let tags = serde_json::to_string(&note.tags)?;
    let rows = conn.execute(
        "UPDATE notes SET content = ?2, tags = ?3, paper_id = ?4, created_at = ?5, updated_at = ?6 \
         WHERE id = ?1 AND NOT (content IS ?2 AND tags IS ?3 AND paper_id IS ?4 AND created_at IS ?5)",
        params![id, note.content, tags, paper_id, note.created_at, note.updated_at],
    )?;
    if rows > 0 {
        write_sync_log(conn, "update", "note", &id.to_string(), None)?;
    }
    Ok(rows > 0)
}

pub fn get_note(conn: &Connection, id: i64) -> Result<Option<Note>> {
    let note = conn
        .query_row(
            &format!(
                "SELECT {NOTE_COLUMNS} FROM notes n LEFT JOIN papers p ON p.id = n.paper_id \
                 WHERE n.id = ?1"
            ),
            params![id],
            row_to_note,
        )
        .optional()?;
    Ok(note)
}

/// Find a note of `owner` whose body is exactly `content`.
///
/// Hydration falls back to this when a remote note's id is not cached yet, so
/// two notes with the same body collapse to one.
pub fn find_note_by_content(conn: &Connection, owner: &str, content: &str) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM notes WHERE owner = ?1 AND content = ?2 ORDER BY id LIMIT 1",
            params![owner, content],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// All notes of an owner, oldest first.
pub fn list_notes(conn: &Connection, owner: &str) -> Result<Vec<Note>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {NOTE_COLUMNS} FROM notes n LEFT JOIN papers p ON p.id = n.paper_id \
         WHERE n.owner = ?1 ORDER BY n.id"
    ))?;
    let notes = stmt
        .query_map(params![owner], row_to_note)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(notes)
}
