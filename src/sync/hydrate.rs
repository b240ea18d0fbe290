//! Hydration: rebuild the cache from the remote store.
//!
//! Best effort. A paper, analysis or note that cannot be fetched or parsed is
//! logged and counted, and the run moves on. Only failing to read the manifest
//! or a top-level directory listing aborts, because then the run would not know
//! what exists.
//!
//! Running hydration twice against an unchanged remote leaves the cache as the
//! first run left it: papers upsert by business key without regressing status,
//! analyses are unique per (paper, provider), notes keep the id of their file.

use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeSet;

use super::SyncEngine;
use crate::cache::types::{Note, Paper, PaperStatus};
use crate::cache::{analyses, notes, papers, write_sync_log};
use crate::codec::{self, DecodedAnalysis};
use crate::db::migrations;
use crate::error::RemoteError;
use crate::layout::{key_from_file_name, note_id_from_file_name, sanitize_key, Layout, CONSENSUS_FILE};
use crate::manifest::{Manifest, Section};
use crate::remote::RemoteEntry;

/// Counters returned by one hydration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HydrationStats {
    /// Root the run read from.
    pub root: String,
    pub papers: usize,
    pub analyses: usize,
    pub notes: usize,
    /// Items already present in the cache.
    pub skipped: usize,
    pub errors: usize,
}

impl HydrationStats {
    fn fail(&mut self, kind: &str, key: &str, error: impl std::fmt::Display) {
        tracing::warn!(kind, key, error = %error, "hydration item failed");
        self.errors += 1;
    }
}

enum Insert {
    New,
    Updated,
    Duplicate,
}

impl SyncEngine {
    /// Rebuild the cache from the remote. Remote wins on divergence.
    pub async fn hydrate(&self) -> Result<HydrationStats, RemoteError> {
        let (layout, manifest) = self.resolve_root().await?;
        let mut stats = HydrationStats {
            root: layout.root().to_string(),
            ..Default::default()
        };
        tracing::info!(remote = %self.remote.describe(), root = layout.root(), "hydration started");

        self.hydrate_papers(&layout, manifest.as_ref(), &mut stats).await?;
        self.hydrate_analyses(&layout, &mut stats).await?;
        self.hydrate_notes(&layout, &mut stats).await?;

        let now = chrono::Utc::now().to_rfc3339();
        let details = serde_json::to_value(&stats).ok();
        let root = stats.root.clone();
        if let Err(e) = self
            .cache
            .call(move |conn| {
                migrations::set_last_hydrated(conn, &now)?;
                write_sync_log(conn, "hydrate", "remote", &root, details.as_ref())
            })
            .await
        {
            tracing::warn!(error = %e, "failed to record hydration time");
        }

        tracing::info!(
            root = %stats.root,
            papers = stats.papers,
            analyses = stats.analyses,
            notes = stats.notes,
            skipped = stats.skipped,
            errors = stats.errors,
            "hydration finished"
        );
        Ok(stats)
    }

    /// Pick the current root if it has a manifest, else the legacy root if that
    /// has one, else the current root with no manifest.
    async fn resolve_root(&self) -> Result<(Layout, Option<Manifest>), RemoteError> {
        for layout in [&self.layout, &self.legacy] {
            let Some(file) = self.remote.get(&layout.manifest()).await? else {
                tracing::debug!(root = layout.root(), "no manifest");
                continue;
            };
            let manifest = match Manifest::parse(&file.content) {
                Ok(m) => Some(m),
                Err(e) => {
                    tracing::warn!(root = layout.root(), error = %e, "manifest unreadable, relying on listings");
                    None
                }
            };
            return Ok((layout.clone(), manifest));
        }
        Ok((self.layout.clone(), None))
    }

    async fn hydrate_papers(
        &self,
        layout: &Layout,
        manifest: Option<&Manifest>,
        stats: &mut HydrationStats,
    ) -> Result<(), RemoteError> {
        // The manifest can lag behind the files; the listing catches what it missed.
        let mut keys: BTreeSet<String> = manifest
            .map(|m| m.keys(Section::Papers).map(sanitize_key).collect())
            .unwrap_or_default();
        for entry in self.remote.list(&layout.papers_dir()).await? {
            if let Some(key) = json_key(&entry) {
                keys.insert(key.to_string());
            }
        }

        for key in keys {
            let path = layout.paper(&key);
            let raw = match self.remote.get(&path).await {
                Ok(Some(file)) => file.content,
                Ok(None) => {
                    stats.fail("paper", &key, format!("{path} listed in manifest but missing"));
                    continue;
                }
                Err(e) => {
                    stats.fail("paper", &key, e);
                    continue;
                }
            };
            let paper = match codec::decode_paper(&raw) {
                Ok(p) => p,
                Err(e) => {
                    stats.fail("paper", &key, e);
                    continue;
                }
            };
            match self.store_paper(paper).await {
                Ok(()) => stats.papers += 1,
                Err(e) => stats.fail("paper", &key, e),
            }
        }
        Ok(())
    }

    /// Upsert a remote paper; presence in the remote papers folder means at least `saved`.
    async fn store_paper(&self, paper: Paper) -> anyhow::Result<()> {
        let owner = self.owner.clone();
        self.cache
            .call(move |conn| {
                papers::upsert_from_remote(conn, &paper, Some(owner.as_str()))?;
                papers::advance_status(conn, &paper.arxiv_id, PaperStatus::Saved)?;
                Ok(())
            })
            .await
    }

    async fn hydrate_analyses(&self, layout: &Layout, stats: &mut HydrationStats) -> Result<(), RemoteError> {
        // Read the folder directly; legacy manifests never indexed analyses.
        for entry in self.remote.list(&layout.analyses_dir()).await? {
            if entry.is_file() {
                let Some(key) = json_key(&entry) else { continue };
                let key = key.to_string();
                self.hydrate_analysis_file(&entry.path, None, &key, stats).await;
                continue;
            }

            let children = match self.remote.list(&entry.path).await {
                Ok(children) => children,
                Err(e) => {
                    stats.fail("analysis", &entry.name, e);
                    continue;
                }
            };
            for child in children {
                if !child.is_file() || child.name == CONSENSUS_FILE {
                    continue;
                }
                let Some(agent) = json_key(&child) else { continue };
                let label = format!("{}/{agent}", entry.name);
                self.hydrate_analysis_file(&child.path, Some(agent), &label, stats)
                    .await;
            }
        }
        Ok(())
    }

    async fn hydrate_analysis_file(
        &self,
        path: &str,
        agent: Option<&str>,
        label: &str,
        stats: &mut HydrationStats,
    ) {
        let raw = match self.remote.get(path).await {
            Ok(Some(file)) => file.content,
            Ok(None) => return stats.fail("analysis", label, format!("{path} vanished")),
            Err(e) => return stats.fail("analysis", label, e),
        };
        let decoded = match codec::decode_analysis(&raw, agent) {
            Ok(d) => d,
            Err(e) => return stats.fail("analysis", label, e),
        };
        match self.store_analysis(decoded).await {
            Ok(Insert::New | Insert::Updated) => stats.analyses += 1,
            Ok(Insert::Duplicate) => stats.skipped += 1,
            Err(e) => stats.fail("analysis", label, e),
        }
    }

    async fn store_analysis(&self, decoded: DecodedAnalysis) -> anyhow::Result<Insert> {
        let owner = self.owner.clone();
        self.cache
            .call(move |conn| {
                let DecodedAnalysis { mut analysis, paper } = decoded;
                if papers::paper_row_id(conn, &analysis.arxiv_id)?.is_none() {
                    match paper {
                        Some(paper) => {
                            papers::upsert_from_remote(conn, &paper, Some(owner.as_str()))?;
                        }
                        None => anyhow::bail!("paper {} is not cached", analysis.arxiv_id),
                    }
                }
                if analyses::analysis_exists(conn, &analysis.arxiv_id, &analysis.provider)? {
                    return Ok(Insert::Duplicate);
                }
                if analysis.owner.is_none() {
                    analysis.owner = Some(owner);
                }
                analyses::insert_analysis(conn, &analysis)?;
                papers::advance_status(conn, &analysis.arxiv_id, PaperStatus::Analyzed)?;
                Ok(Insert::New)
            })
            .await
    }

    async fn hydrate_notes(&self, layout: &Layout, stats: &mut HydrationStats) -> Result<(), RemoteError> {
        for entry in self.remote.list(&layout.notes_dir()).await? {
            if !entry.is_file() || !entry.name.ends_with(".md") {
                continue;
            }
            let raw = match self.remote.get(&entry.path).await {
                Ok(Some(file)) => file.content,
                Ok(None) => {
                    stats.fail("note", &entry.name, "vanished");
                    continue;
                }
                Err(e) => {
                    stats.fail("note", &entry.name, e);
                    continue;
                }
            };
            let mut note = match codec::decode_note(&raw) {
                Ok(decoded) => decoded.into_note(&self.owner),
                Err(e) => {
                    stats.fail("note", &entry.name, e);
                    continue;
                }
            };
            // The file name is what a later save writes to, so it wins over the heading.
            note.id = note_id_from_file_name(&entry.name).or(note.id);
            if note.id.is_none() {
                stats.fail("note", &entry.name, "no note id in file name or heading");
                continue;
            }
            match self.cache.call(move |conn| store_note(conn, &note)).await {
                Ok(Insert::New | Insert::Updated) => stats.notes += 1,
                Ok(Insert::Duplicate) => stats.skipped += 1,
                Err(e) => stats.fail("note", &entry.name, e),
            }
        }
        Ok(())
    }
}

/// Match a remote note by id first, then by (owner, body).
///
/// The cache row id names the remote file, so a hydrated note must land on the
/// id its file carries. A cached row with that id is overwritten by the remote copy.
fn store_note(conn: &Connection, note: &Note) -> anyhow::Result<Insert> {
    let Some(id) = note.id else {
        anyhow::bail!("note has no id");
    };
    if let Some(existing) = notes::get_note(conn, id)? {
        if existing.owner != note.owner {
            anyhow::bail!("cache note {id} belongs to {}", existing.owner);
        }
        return Ok(if notes::replace_note(conn, id, note)? {
            Insert::Updated
        } else {
            Insert::Duplicate
        });
    }
    if notes::find_note_by_content(conn, &note.owner, &note.content)?.is_some() {
        return Ok(Insert::Duplicate);
    }
    notes::insert_note(conn, note)?;
    Ok(Insert::New)
}

fn json_key(entry: &RemoteEntry) -> Option<&str> {
    if entry.is_file() {
        key_from_file_name(&entry.name, ".json")
    } else {
        None
    }
}
