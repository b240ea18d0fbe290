//! Save path: cache entity → remote document → manifest entry.
//!
//! Every attempt re-reads the target's version token immediately before the
//! write. This narrows but does not close the race with other writers; the
//! remote offers no compare-and-swap across a read and a write.
//!
//! The manifest update runs only after the document write succeeded and its
//! failure does not undo that write. A crash in between leaves the document
//! unindexed, which hydration's directory-listing union tolerates.

use serde_json::{json, Value};

use super::{SaveOutcome, SyncEngine};
use crate::cache::types::{Analysis, Consensus, Note, Paper};
use crate::codec;
use crate::error::RemoteError;
use crate::layout::sanitize_key;
use crate::manifest::{Manifest, Section};
use crate::remote::{PutRequest, VersionToken};
use crate::validate::{validator, EntityKind};

const SNIPPET_CHARS: usize = 80;

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn invalid(errors: Vec<String>) -> SaveOutcome {
    SaveOutcome::Invalid { errors }
}

/// Validate a document and render it, or explain why not.
fn checked(kind: EntityKind, doc: &Value) -> Result<String, SaveOutcome> {
    let check = validator().validate(kind, doc);
    if !check.valid {
        return Err(invalid(check.errors));
    }
    serde_json::to_string_pretty(doc).map_err(|e| invalid(vec![e.to_string()]))
}

impl SyncEngine {
    /// Write `content` at `path`, presenting the freshly read version token.
    async fn write_document(&self, path: &str, content: &str, message: &str) -> SaveOutcome {
        let remote = &self.remote;
        let (result, attempts) = self
            .retry
            .run(path, |attempt| async move {
                let current = remote.get(path).await?;
                let version = current.as_ref().map(|file| &file.version);
                tracing::debug!(path, attempt, blind = version.is_none(), "writing document");
                remote
                    .put(PutRequest {
                        path,
                        content,
                        message,
                        version,
                    })
                    .await
            })
            .await;
        let outcome = SaveOutcome::from_attempts(result, attempts);
        if outcome.is_written() {
            tracing::info!(path, attempts, "document saved");
        }
        outcome
    }

    /// Write the document, then index it. The outcome reflects the document only.
    async fn write_and_index(
        &self,
        path: &str,
        content: &str,
        message: &str,
        section: Section,
        key: &str,
        entry: Value,
    ) -> SaveOutcome {
        let outcome = self.write_document(path, content, message).await;
        if outcome.is_written() {
            let indexed = self.update_manifest(section, key, entry).await;
            if !indexed.is_written() {
                tracing::warn!(path, section = %section, key, outcome = ?indexed, "manifest not updated");
            }
        }
        outcome
    }

    pub async fn save_paper(&self, paper: &Paper) -> SaveOutcome {
        let doc = codec::paper_document(paper);
        let content = match checked(EntityKind::Paper, &doc) {
            Ok(c) => c,
            Err(outcome) => return outcome,
        };

        let path = self.layout.paper(&paper.arxiv_id);
        let message = format!("Save paper: {}", truncate_chars(&paper.title, 60));
        let entry = json!({
            "title": paper.title,
            "status": paper.status,
            "updated_at": chrono::Utc::now().to_rfc3339(),
        });
        self.write_and_index(
            &path,
            &content,
            &message,
            Section::Papers,
            &sanitize_key(&paper.arxiv_id),
            entry,
        )
        .await
    }

    /// Write one agent's analysis to `analyses/{key}/{agent}.json`.
    pub async fn save_analysis(&self, analysis: &Analysis) -> SaveOutcome {
        let doc = codec::analysis_document(analysis);
        let content = match checked(EntityKind::Analysis, &doc) {
            Ok(c) => c,
            Err(outcome) => return outcome,
        };

        let path = self.layout.analysis(&analysis.arxiv_id, &analysis.provider);
        let message = format!("Save analysis: {} by {}", analysis.arxiv_id, analysis.provider);
        let entry = json!({
            "providers": [analysis.provider],
            "latest_type": analysis.provenance.analysis_type,
            "updated_at": chrono::Utc::now().to_rfc3339(),
        });
        self.write_and_index(
            &path,
            &content,
            &message,
            Section::Analyses,
            &sanitize_key(&analysis.arxiv_id),
            entry,
        )
        .await
    }

    /// Write a note as Markdown. The note must already have its cache id.
    pub async fn save_note(&self, note: &Note) -> SaveOutcome {
        let Some(id) = note.id else {
            return invalid(vec!["note has no id; insert it into the cache first".into()]);
        };
        if note.content.trim().is_empty() {
            return invalid(vec!["note content is empty".into()]);
        }
        let path = self.layout.note(id);
        let content = codec::encode_note(id, note);
        let entry = json!({
            "snippet": truncate_chars(&note.content, SNIPPET_CHARS),
            "tags": note.tags,
            "paper": note.arxiv_id,
            "updated_at": note.updated_at,
        });
        self.write_and_index(
            &path,
            &content,
            &format!("Save note #{id}"),
            Section::Notes,
            &format!("note_{id}"),
            entry,
        )
        .await
    }

    /// Replace the knowledge graph document. The graph has no manifest section.
    pub async fn save_graph(&self, graph: &Value) -> SaveOutcome {
        let content = match serde_json::to_string_pretty(graph) {
            Ok(c) => c,
            Err(e) => return invalid(vec![e.to_string()]),
        };
        self.write_document(&self.layout.graph(), &content, "Update knowledge graph")
            .await
    }

    /// Validate and write a consensus record, then splice its summary into the
    /// paper's `analyses` manifest entry.
    pub async fn save_consensus(&self, consensus: &Consensus) -> SaveOutcome {
        let doc = match serde_json::to_value(consensus) {
            Ok(v) => v,
            Err(e) => return invalid(vec![e.to_string()]),
        };
        let content = match checked(EntityKind::Consensus, &doc) {
            Ok(c) => c,
            Err(outcome) => return outcome,
        };

        let path = self.layout.consensus(&consensus.arxiv_id);
        let entry = json!({
            "consensus": {
                "agreement_score": consensus.agreement_score,
                "agents_compared": consensus.agents_compared,
                "generated_at": consensus.generated_at,
                "recommended_action": consensus.recommended_action,
            },
            "updated_at": chrono::Utc::now().to_rfc3339(),
        });
        self.write_and_index(
            &path,
            &content,
            &format!("Save consensus: {}", consensus.arxiv_id),
            Section::Analyses,
            &sanitize_key(&consensus.arxiv_id),
            entry,
        )
        .await
    }

    /// Merge one entry into the manifest by read-modify-write.
    ///
    /// A missing manifest is synthesized empty. Writes always go to the current
    /// root, even when the store still has only a legacy layout. Without the
    /// per-store writer lock two concurrent updates can lose one of the entries.
    pub async fn update_manifest(&self, section: Section, key: &str, entry: Value) -> SaveOutcome {
        let _guard = match &self.manifest_lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let path = self.layout.manifest();
        let remote = &self.remote;
        let owner = self.owner.as_str();
        let message = format!("Update manifest: {section}/{key}");
        let (result, attempts) = self
            .retry
            .run(&path, |_| {
                let path = path.as_str();
                let message = message.as_str();
                let entry = entry.clone();
                async move {
                    let current = remote.get(path).await?;
                    let mut manifest = match &current {
                        Some(file) => Manifest::parse(&file.content)?,
                        None => Manifest::empty(Some(owner)),
                    };
                    manifest.merge_entry(section, key, entry);
                    let content = manifest.to_json()?;
                    remote
                        .put(PutRequest {
                            path,
                            content: &content,
                            message,
                            version: current.as_ref().map(|file| &file.version),
                        })
                        .await
                }
            })
            .await;
        let outcome = SaveOutcome::from_attempts(result, attempts);
        if outcome.is_written() {
            tracing::info!(section = %section, key, attempts, "manifest updated");
        }
        outcome
    }

    /// Read and parse the current root's manifest.
    pub async fn fetch_manifest(&self) -> Result<Option<Manifest>, RemoteError> {
        match self.remote.get(&self.layout.manifest()).await? {
            Some(file) => Ok(Some(Manifest::parse(&file.content)?)),
            None => Ok(None),
        }
    }

    /// Create an empty manifest under the current root unless one exists.
    pub async fn init_repository(&self) -> SaveOutcome {
        let path = self.layout.manifest();
        let remote = &self.remote;
        let owner = self.owner.as_str();
        let (result, attempts) = self
            .retry
            .run(&path, |_| {
                let path = path.as_str();
                async move {
                    if remote.get(path).await?.is_some() {
                        return Ok(None);
                    }
                    let content = Manifest::empty(Some(owner)).to_json()?;
                    let version: VersionToken = remote
                        .put(PutRequest {
                            path,
                            content: &content,
                            message: "Initialize research data directory",
                            version: None,
                        })
                        .await?;
                    Ok::<_, RemoteError>(Some(version))
                }
            })
            .await;
        match result {
            Ok(None) => SaveOutcome::Skipped {
                reason: format!("{path} already exists"),
            },
            Ok(Some(version)) => {
                tracing::info!(path = %path, "repository initialized");
                SaveOutcome::Written { attempts, version }
            }
            Err(e) => SaveOutcome::from_attempts(Err(e), attempts),
        }
    }
}
