//! Core entity definitions.
//!
//! Defines [`PaperStatus`] (the paper lifecycle), [`Paper`], [`Analysis`] with its
//! [`Provenance`], [`Note`], and the [`Consensus`] record produced by comparing
//! analyses from several agents.

use serde::{Deserialize, Serialize};

/// Prefix every cached paper identifier carries.
pub const PAPER_ID_PREFIX: &str = "arxiv:";

/// Normalize an external paper identifier to the `arxiv:` prefix form.
///
/// `2401.12345` and `arxiv:2401.12345` both become `arxiv:2401.12345`.
pub fn normalize_paper_id(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with(PAPER_ID_PREFIX) {
        trimmed.to_string()
    } else {
        format!("{PAPER_ID_PREFIX}{trimmed}")
    }
}

/// Lifecycle of a paper in a principal's library.
///
/// Transitions are expected to move forward (`discovered → saved → analyzed → cited`)
/// but the cache does not forbid moving backwards through [`crate::cache::papers::set_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperStatus {
    #[default]
    Discovered,
    Saved,
    Analyzed,
    /// Full-text analysis completed. Accepted from older documents.
    DeepAnalyzed,
    Cited,
}

impl PaperStatus {
    pub const ALL: [PaperStatus; 5] = [
        Self::Discovered,
        Self::Saved,
        Self::Analyzed,
        Self::DeepAnalyzed,
        Self::Cited,
    ];

    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Saved => "saved",
            Self::Analyzed => "analyzed",
            Self::DeepAnalyzed => "deep_analyzed",
            Self::Cited => "cited",
        }
    }

    /// Position in the lifecycle; higher is later.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Discovered => 0,
            Self::Saved => 1,
            Self::Analyzed => 2,
            Self::DeepAnalyzed => 3,
            Self::Cited => 4,
        }
    }
}

impl std::fmt::Display for PaperStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaperStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discovered" => Ok(Self::Discovered),
            "saved" => Ok(Self::Saved),
            "analyzed" => Ok(Self::Analyzed),
            "deep_analyzed" => Ok(Self::DeepAnalyzed),
            "cited" => Ok(Self::Cited),
            _ => Err(format!("unknown paper status: {s}")),
        }
    }
}

/// A research paper, matching the `papers` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    /// Normalized external identifier (`arxiv:2401.12345`).
    pub arxiv_id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub url: String,
    /// Where the paper was discovered (`arxiv`, `hf`, `hysts`, ...).
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub status: PaperStatus,
    /// Owning principal. `None` for shared/anonymous papers.
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub added_at: Option<String>,
}

fn default_source() -> String {
    "unknown".into()
}

impl Paper {
    pub fn new(arxiv_id: &str, title: &str) -> Self {
        Self {
            arxiv_id: normalize_paper_id(arxiv_id),
            title: title.to_string(),
            authors: Vec::new(),
            abstract_text: String::new(),
            url: String::new(),
            source: default_source(),
            status: PaperStatus::Discovered,
            owner: None,
            added_at: None,
        }
    }
}

/// How deeply a paper was analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    /// Shallow pass over title and abstract.
    #[default]
    Abstract,
    /// Multi-pass over the extracted full text.
    Deep,
    Comparative,
    Methodological,
}

impl AnalysisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Abstract => "abstract",
            Self::Deep => "deep",
            Self::Comparative => "comparative",
            Self::Methodological => "methodological",
        }
    }
}

impl std::str::FromStr for AnalysisType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "abstract" => Ok(Self::Abstract),
            "deep" => Ok(Self::Deep),
            "comparative" => Ok(Self::Comparative),
            "methodological" => Ok(Self::Methodological),
            _ => Err(format!("unknown analysis type: {s}")),
        }
    }
}

/// Who produced an analysis and how.
///
/// Fields this crate does not know about (page counts, sampling parameters) are
/// kept in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(default, alias = "provider")]
    pub agent_id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default, rename = "type")]
    pub analysis_type: AnalysisType,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// An AI-generated analysis, matching the `analyses` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// Cache row id; `None` until inserted.
    #[serde(default)]
    pub id: Option<i64>,
    pub arxiv_id: String,
    /// Generating agent (LLM provider) identifier.
    pub provider: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_findings: Vec<String>,
    #[serde(default)]
    pub methodology: String,
    #[serde(default)]
    pub research_gaps: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub strength_score: f64,
    #[serde(default)]
    pub provenance: Provenance,
    pub analyzed_at: String,
}

/// A research note, matching the `notes` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Cache row id; also names the remote file (`note_{id}.md`).
    #[serde(default)]
    pub id: Option<i64>,
    pub owner: String,
    /// Linked paper, if any.
    #[serde(default)]
    pub arxiv_id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Multi-agent consensus over the analyses of one paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consensus {
    pub arxiv_id: String,
    pub agents_compared: Vec<String>,
    pub generated_at: String,
    pub generated_by: String,
    pub agreement_score: f64,
    pub synthesized_summary: String,
    #[serde(default)]
    pub convergence_points: Vec<String>,
    #[serde(default)]
    pub divergence_points: Vec<String>,
    #[serde(default)]
    pub recommended_action: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
