//! Remote path layout.
//!
//! ```text
//! <root>/
//! ├── manifest.json
//! ├── papers/{key}.json
//! ├── analyses/{key}/{agent}.json      (per-agent, current)
//! ├── analyses/{key}/consensus.json
//! ├── analyses/{key}.json              (single document, legacy)
//! ├── graph/knowledge-graph.json
//! └── notes/note_{id}.md
//! ```
//!
//! The legacy root has the same sub-structure and is only ever read.

use once_cell::sync::Lazy;
use regex::Regex;

/// Root directory for the current schema.
pub const CURRENT_ROOT: &str = ".macp";
/// Root directory written by older clients.
pub const LEGACY_ROOT: &str = ".macp-research";

pub const MANIFEST_FILE: &str = "manifest.json";
pub const CONSENSUS_FILE: &str = "consensus.json";
pub const GRAPH_FILE: &str = "knowledge-graph.json";

static UNSAFE_KEY_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]").expect("valid key regex"));

/// Turn a business key into a file-name-safe key.
///
/// `arxiv:2401.12345` becomes `arxiv_2401.12345`. Leading dots are replaced so a
/// key can never name `.` or `..`.
pub fn sanitize_key(key: &str) -> String {
    let cleaned = UNSAFE_KEY_CHARS.replace_all(key.trim(), "_");
    let rest = cleaned.trim_start_matches('.');
    let mut out = "_".repeat(cleaned.len() - rest.len());
    out.push_str(rest);
    if out.is_empty() {
        out.push('_');
    }
    out
}

/// Paths under one root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: String,
}

impl Layout {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn current() -> Self {
        Self::new(CURRENT_ROOT)
    }

    pub fn legacy() -> Self {
        Self::new(LEGACY_ROOT)
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn manifest(&self) -> String {
        format!("{}/{MANIFEST_FILE}", self.root)
    }

    pub fn papers_dir(&self) -> String {
        format!("{}/papers", self.root)
    }

    pub fn paper(&self, arxiv_id: &str) -> String {
        format!("{}/{}.json", self.papers_dir(), sanitize_key(arxiv_id))
    }

    pub fn analyses_dir(&self) -> String {
        format!("{}/analyses", self.root)
    }

    /// Directory holding the per-agent analyses of one paper.
    pub fn paper_analyses_dir(&self, arxiv_id: &str) -> String {
        format!("{}/{}", self.analyses_dir(), sanitize_key(arxiv_id))
    }

    pub fn analysis(&self, arxiv_id: &str, agent_id: &str) -> String {
        format!(
            "{}/{}.json",
            self.paper_analyses_dir(arxiv_id),
            sanitize_key(agent_id)
        )
    }

    pub fn legacy_analysis(&self, arxiv_id: &str) -> String {
        format!("{}/{}.json", self.analyses_dir(), sanitize_key(arxiv_id))
    }

    pub fn consensus(&self, arxiv_id: &str) -> String {
        format!("{}/{CONSENSUS_FILE}", self.paper_analyses_dir(arxiv_id))
    }

    pub fn notes_dir(&self) -> String {
        format!("{}/notes", self.root)
    }

    pub fn note(&self, note_id: i64) -> String {
        format!("{}/note_{note_id}.md", self.notes_dir())
    }

    pub fn graph(&self) -> String {
        format!("{}/graph/{GRAPH_FILE}", self.root)
    }
}

/// Strip `suffix` from a listed file name, returning the key.
pub fn key_from_file_name<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    name.strip_suffix(suffix).filter(|key| !key.is_empty())
}

/// Parse the note id out of `note_{id}.md`.
pub fn note_id_from_file_name(name: &str) -> Option<i64> {
    key_from_file_name(name, ".md")?
        .strip_prefix("note_")?
        .parse()
        .ok()
}
