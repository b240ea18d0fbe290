//! Canonical remote representations of cache entities.
//!
//! Papers and analyses are pretty-printed JSON. Notes are
//! Markdown with a small header block so the file stays readable on GitHub:
//!
//! ```text
//! # Research Note #12
//!
//! **Tags:** transformers, survey
//! **Created:** 2025-01-10T09:00:00+00:00
//! **Paper:** arxiv:1706.03762
//!
//! body...
//! ```
//!
//! Decoders are lenient: they accept the older field names found in legacy
//! documents and ignore fields they do not know.

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::cache::types::{normalize_paper_id, Analysis, Note, Paper, Provenance, PAPER_ID_PREFIX};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document is not a JSON object")]
    NotAnObject,

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("malformed note: {0}")]
    MalformedNote(String),
}

const NOTE_HEADING: &str = "# Research Note #";
const TAGS_LINE: &str = "**Tags:** ";
const CREATED_LINE: &str = "**Created:** ";
const PAPER_LINE: &str = "**Paper:** ";

/// Provider recorded for legacy analyses that never named one.
pub const UNKNOWN_PROVIDER: &str = "unknown";

fn as_object(value: &Value) -> Result<&Map<String, Value>, CodecError> {
    value.as_object().ok_or(CodecError::NotAnObject)
}

fn str_field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
}

fn list_field(obj: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_array))
        .map(|items| {
            items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect()
        })
        .unwrap_or_default()
}

// --- papers ---------------------------------------------------------------

/// The remote JSON document for a paper.
pub fn paper_document(paper: &Paper) -> Value {
    json!({
        "id": document_id(&paper.arxiv_id),
        "title": paper.title,
        "authors": paper.authors,
        "abstract": paper.abstract_text,
        "url": paper.url,
        "status": paper.status,
        "source": paper.source,
        "added_at": paper.added_at,
        "owner": paper.owner,
    })
}

/// Normalized id, or empty when nothing follows the prefix.
fn document_id(raw: &str) -> String {
    let id = normalize_paper_id(raw);
    if id == PAPER_ID_PREFIX {
        String::new()
    } else {
        id
    }
}

pub fn encode_paper(paper: &Paper) -> Result<String, CodecError> {
    Ok(serde_json::to_string_pretty(&paper_document(paper))?)
}

/// Decode a paper document. Accepts `id` or `arxiv_id`, and `discovered_by` for
/// the source. An unknown status decodes as `discovered`.
pub fn decode_paper(raw: &str) -> Result<Paper, CodecError> {
    let value: Value = serde_json::from_str(raw)?;
    paper_from_value(&value)
}

fn paper_from_value(value: &Value) -> Result<Paper, CodecError> {
    let obj = as_object(value)?;
    let id = str_field(obj, &["id", "arxiv_id"]).ok_or(CodecError::MissingField("id"))?;
    let title = str_field(obj, &["title"]).unwrap_or_default();

    let mut paper = Paper::new(id, title);
    paper.authors = list_field(obj, &["authors"]);
    paper.abstract_text = str_field(obj, &["abstract"]).unwrap_or_default().to_string();
    paper.url = str_field(obj, &["url"]).unwrap_or_default().to_string();
    if let Some(source) = str_field(obj, &["discovered_by", "source"]) {
        paper.source = source.to_string();
    }
    paper.status = str_field(obj, &["status"])
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();
    paper.owner = str_field(obj, &["owner"]).map(str::to_string);
    paper.added_at = str_field(obj, &["added_at", "discovered_at"]).map(str::to_string);
    Ok(paper)
}

// --- analyses -------------------------------------------------------------

/// Per-agent analysis document, stored at `analyses/{key}/{agent}.json`.
pub fn analysis_document(analysis: &Analysis) -> Value {
    json!({
        "arxiv_id": normalize_paper_id(&analysis.arxiv_id),
        "agent_id": analysis.provider,
        "model": analysis.provenance.model,
        "type": analysis.provenance.analysis_type,
        "analyzed_at": analysis.analyzed_at,
        "owner": analysis.owner,
        "summary": analysis.summary,
        "key_findings": analysis.key_findings,
        "methodology": analysis.methodology,
        "research_gaps": analysis.research_gaps,
        "tags": analysis.tags,
        "strength_score": analysis.strength_score,
        "provenance": analysis.provenance,
    })
}

pub fn encode_analysis(analysis: &Analysis) -> Result<String, CodecError> {
    Ok(serde_json::to_string_pretty(&analysis_document(analysis))?)
}

/// An analysis read back from the remote, with the paper it embeds when the
/// document is in the legacy `{paper, analysis, saved_at}` shape.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAnalysis {
    pub analysis: Analysis,
    pub paper: Option<Paper>,
}

/// Decode either analysis layout.
///
/// `fallback_provider` names the agent when the document does not, which is the
/// case for per-agent files whose agent lives only in the file name.
pub fn decode_analysis(raw: &str, fallback_provider: Option<&str>) -> Result<DecodedAnalysis, CodecError> {
    let value: Value = serde_json::from_str(raw)?;
    let obj = as_object(&value)?;

    if let Some(body) = obj.get("analysis") {
        let paper = obj.get("paper").map(paper_from_value).transpose()?;
        let arxiv_id = paper.as_ref().map(|p| p.arxiv_id.clone());
        let saved_at = str_field(obj, &["saved_at"]);
        let analysis = analysis_from_value(body, arxiv_id.as_deref(), saved_at, fallback_provider)?;
        return Ok(DecodedAnalysis { analysis, paper });
    }

    let analysis = analysis_from_value(&value, None, None, fallback_provider)?;
    Ok(DecodedAnalysis {
        analysis,
        paper: None,
    })
}

fn analysis_from_value(
    value: &Value,
    arxiv_id: Option<&str>,
    saved_at: Option<&str>,
    fallback_provider: Option<&str>,
) -> Result<Analysis, CodecError> {
    let obj = as_object(value)?;

    let mut provenance = match obj.get("provenance").or_else(|| obj.get("_meta")) {
        Some(Value::Object(meta)) => provenance_from(meta),
        _ => Provenance::default(),
    };

    let arxiv_id = arxiv_id
        .or_else(|| str_field(obj, &["arxiv_id", "paper_id"]))
        .ok_or(CodecError::MissingField("arxiv_id"))?;

    let provider = str_field(obj, &["agent_id", "provider"])
        .or(Some(provenance.agent_id.as_str()).filter(|s| !s.is_empty()))
        .or(fallback_provider)
        .unwrap_or(UNKNOWN_PROVIDER)
        .to_string();

    if provenance.agent_id.is_empty() {
        provenance.agent_id = provider.clone();
    }
    if provenance.model.is_empty() {
        if let Some(model) = str_field(obj, &["model"]) {
            provenance.model = model.to_string();
        }
    }
    if let Some(kind) = str_field(obj, &["type", "analysis_type"]).and_then(|s| s.parse().ok()) {
        provenance.analysis_type = kind;
    }

    let analyzed_at = str_field(obj, &["analyzed_at"])
        .or(saved_at)
        .map(str::to_string)
        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());

    Ok(Analysis {
        id: None,
        arxiv_id: normalize_paper_id(arxiv_id),
        provider,
        owner: str_field(obj, &["owner"]).map(str::to_string),
        summary: str_field(obj, &["summary"]).unwrap_or_default().to_string(),
        key_findings: list_field(obj, &["key_findings", "key_insights", "key_contributions"]),
        methodology: str_field(obj, &["methodology"]).unwrap_or_default().to_string(),
        research_gaps: list_field(obj, &["research_gaps"]),
        tags: list_field(obj, &["tags", "relevance_tags"]),
        strength_score: obj
            .get("strength_score")
            .or_else(|| obj.get("relevance_score"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        provenance,
        analyzed_at,
    })
}

/// Read provenance field by field, so one odd value does not cost the rest.
fn provenance_from(meta: &Map<String, Value>) -> Provenance {
    let mut extra = meta.clone();
    for known in ["agent_id", "provider", "model", "type"] {
        extra.remove(known);
    }
    Provenance {
        agent_id: str_field(meta, &["agent_id", "provider"])
            .unwrap_or_default()
            .to_string(),
        model: str_field(meta, &["model"]).unwrap_or_default().to_string(),
        analysis_type: str_field(meta, &["type"])
            .and_then(|s| s.parse().ok())
            .unwrap_or_default(),
        extra,
    }
}

// --- notes ----------------------------------------------------------------

pub fn encode_note(note_id: i64, note: &Note) -> String {
    let tags = if note.tags.is_empty() {
        "none".to_string()
    } else {
        note.tags.join(", ")
    };
    let created = if note.created_at.is_empty() {
        "unknown"
    } else {
        note.created_at.as_str()
    };
    let mut out = format!("{NOTE_HEADING}{note_id}\n\n{TAGS_LINE}{tags}\n{CREATED_LINE}{created}\n");
    if let Some(arxiv_id) = &note.arxiv_id {
        out.push_str(&format!("{PAPER_LINE}{arxiv_id}\n"));
    }
    out.push('\n');
    out.push_str(&note.content);
    out
}

/// A note parsed from Markdown. The owner is not part of the document.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedNote {
    pub remote_id: Option<i64>,
    pub tags: Vec<String>,
    pub created_at: Option<String>,
    pub arxiv_id: Option<String>,
    pub content: String,
}

impl DecodedNote {
    /// Build a cache note that keeps the remote id. An `unknown` creation time
    /// stays empty so that encoding the note again writes `unknown` back.
    pub fn into_note(self, owner: &str) -> Note {
        let created_at = self.created_at.unwrap_or_default();
        Note {
            id: self.remote_id,
            owner: owner.to_string(),
            arxiv_id: self.arxiv_id,
            content: self.content,
            tags: self.tags,
            updated_at: created_at.clone(),
            created_at,
        }
    }
}

pub fn decode_note(raw: &str) -> Result<DecodedNote, CodecError> {
    let raw = raw.replace("\r\n", "\n");
    let mut lines = raw.split('\n');

    let heading = lines
        .next()
        .ok_or_else(|| CodecError::MalformedNote("empty document".into()))?;
    let remote_id = heading
        .strip_prefix(NOTE_HEADING)
        .ok_or_else(|| CodecError::MalformedNote(format!("unexpected heading: {heading:?}")))?
        .trim()
        .parse()
        .ok();

    let mut tags = None;
    let mut created_at = None;
    let mut arxiv_id = None;
    let mut consumed = heading.len() + 1;
    let mut seen_header = false;

    for line in lines {
        consumed += line.len() + 1;
        if let Some(rest) = line.strip_prefix(TAGS_LINE) {
            tags = Some(parse_tags(rest));
            seen_header = true;
        } else if let Some(rest) = line.strip_prefix(CREATED_LINE) {
            let rest = rest.trim();
            created_at = (rest != "unknown" && !rest.is_empty()).then(|| rest.to_string());
            seen_header = true;
        } else if let Some(rest) = line.strip_prefix(PAPER_LINE) {
            arxiv_id = Some(normalize_paper_id(rest));
            seen_header = true;
        } else if line.trim().is_empty() {
            if seen_header {
                break;
            }
        } else {
            return Err(CodecError::MalformedNote(format!(
                "unexpected header line: {line:?}"
            )));
        }
    }

    let tags = tags.ok_or(CodecError::MissingField("tags"))?;
    let content = raw.get(consumed.min(raw.len())..).unwrap_or_default().to_string();

    Ok(DecodedNote {
        remote_id,
        tags,
        created_at,
        arxiv_id,
        content,
    })
}

fn parse_tags(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "none" {
        return Vec::new();
    }
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::types::{AnalysisType, PaperStatus};

    #[test]
    fn paper_document_uses_id_key() {
        let mut paper = Paper::new("2401.12345", "Title");
        paper.status = PaperStatus::Saved;
        let doc: Value = serde_json::from_str(&encode_paper(&paper).unwrap()).unwrap();
        assert_eq!(doc["id"], "arxiv:2401.12345");
        assert_eq!(doc["status"], "saved");
        assert_eq!(decode_paper(&encode_paper(&paper).unwrap()).unwrap(), paper);
    }

    #[test]
    fn paper_decoder_accepts_legacy_fields() {
        let paper = decode_paper(
            r#"{"arxiv_id": "2401.1", "title": "T", "discovered_by": "gemini",
                "status": "archived", "authors": ["A", null]}"#,
        )
        .unwrap();
        assert_eq!(paper.arxiv_id, "arxiv:2401.1");
        assert_eq!(paper.source, "gemini");
        assert_eq!(paper.status, PaperStatus::Discovered);
        assert_eq!(paper.authors, vec!["A"]);
    }

    #[test]
    fn paper_without_id_is_rejected() {
        assert!(matches!(
            decode_paper(r#"{"title": "T"}"#),
            Err(CodecError::MissingField("id"))
        ));
        assert!(matches!(decode_paper("[1]"), Err(CodecError::NotAnObject)));
    }

    #[test]
    fn legacy_analysis_takes_paper_and_provider_from_embedded_fields() {
        let raw = r#"{
            "paper": {"id": "arxiv:2401.1", "title": "T"},
            "analysis": {
                "summary": "S",
                "key_insights": ["k1", "k2"],
                "relevance_tags": ["nlp"],
                "strength_score": 4,
                "provenance": {"provider": "gemini", "model": "flash", "type": "deep"}
            },
            "saved_at": "2025-01-01T00:00:00+00:00"
        }"#;
        let decoded = decode_analysis(raw, None).unwrap();
        let analysis = decoded.analysis;
        assert_eq!(analysis.arxiv_id, "arxiv:2401.1");
        assert_eq!(analysis.provider, "gemini");
        assert_eq!(analysis.key_findings, vec!["k1", "k2"]);
        assert_eq!(analysis.tags, vec!["nlp"]);
        assert_eq!(analysis.strength_score, 4.0);
        assert_eq!(analysis.provenance.analysis_type, AnalysisType::Deep);
        assert_eq!(analysis.analyzed_at, "2025-01-01T00:00:00+00:00");
        assert_eq!(decoded.paper.unwrap().title, "T");
    }

    #[test]
    fn per_agent_analysis_round_trips() {
        let analysis = Analysis {
            id: None,
            arxiv_id: "arxiv:2401.1".into(),
            provider: "claude".into(),
            owner: Some("octo".into()),
            summary: "S".into(),
            key_findings: vec!["f".into()],
            methodology: "M".into(),
            research_gaps: vec![],
            tags: vec!["t".into()],
            strength_score: 3.5,
            provenance: Provenance {
                agent_id: "claude".into(),
                model: "sonnet".into(),
                analysis_type: AnalysisType::Abstract,
                extra: Map::new(),
            },
            analyzed_at: "2025-02-02T00:00:00+00:00".into(),
        };
        let decoded = decode_analysis(&encode_analysis(&analysis).unwrap(), None).unwrap();
        assert_eq!(decoded.analysis, analysis);
        assert!(decoded.paper.is_none());
    }

    #[test]
    fn analysis_provider_falls_back_to_file_name() {
        let decoded = decode_analysis(r#"{"arxiv_id": "2401.1", "summary": "S"}"#, Some("openai")).unwrap();
        assert_eq!(decoded.analysis.provider, "openai");
        let unnamed = decode_analysis(r#"{"arxiv_id": "2401.1"}"#, None).unwrap();
        assert_eq!(unnamed.analysis.provider, UNKNOWN_PROVIDER);
    }

    #[test]
    fn odd_provenance_type_keeps_provider_and_model() {
        let raw = r#"{
            "paper": {"id": "2401.2", "title": "T"},
            "analysis": {
                "summary": "S",
                "provenance": {"provider": "groq", "model": "llama", "type": "speculative", "run": 3}
            }
        }"#;
        let analysis = decode_analysis(raw, None).unwrap().analysis;
        assert_eq!(analysis.provider, "groq");
        assert_eq!(analysis.provenance.model, "llama");
        assert_eq!(analysis.provenance.analysis_type, AnalysisType::Abstract);
        assert_eq!(analysis.provenance.extra.get("run"), Some(&json!(3)));
    }

    #[test]
    fn legacy_analysis_with_empty_provenance_is_kept() {
        let raw = r#"{"paper": {"id": "2401.3", "title": "T"}, "analysis": {"summary": "S", "provenance": {}}}"#;
        let analysis = decode_analysis(raw, None).unwrap().analysis;
        assert_eq!(analysis.provider, UNKNOWN_PROVIDER);
        assert_eq!(analysis.provenance.agent_id, UNKNOWN_PROVIDER);
    }

    #[test]
    fn note_markdown_round_trip() {
        let note = Note {
            id: Some(7),
            owner: "octo".into(),
            arxiv_id: Some("arxiv:2401.1".into()),
            content: "First line.\n\nSecond paragraph.".into(),
            tags: vec!["a".into(), "b".into()],
            created_at: "2025-01-10T09:00:00+00:00".into(),
            updated_at: "2025-01-10T09:00:00+00:00".into(),
        };
        let markdown = encode_note(7, &note);
        assert!(markdown.starts_with("# Research Note #7\n\n**Tags:** a, b\n"));
        let decoded = decode_note(&markdown).unwrap();
        assert_eq!(decoded.remote_id, Some(7));
        assert_eq!(decoded.tags, vec!["a", "b"]);
        assert_eq!(decoded.arxiv_id.as_deref(), Some("arxiv:2401.1"));
        assert_eq!(decoded.content, note.content);
        let restored = decoded.into_note("octo");
        assert_eq!(restored.id, Some(7));
        assert_eq!(restored.created_at, note.created_at);
    }

    #[test]
    fn unknown_creation_time_survives_a_rewrite() {
        let raw = "# Research Note #4\n\n**Tags:** none\n**Created:** unknown\n\nBody text";
        let note = decode_note(raw).unwrap().into_note("octo");
        assert_eq!(note.id, Some(4));
        assert!(note.created_at.is_empty());
        assert_eq!(encode_note(4, &note), raw);
    }

    #[test]
    fn legacy_note_without_paper_line() {
        let raw = "# Research Note #3\n\n**Tags:** none\n**Created:** unknown\n\nBody text";
        let decoded = decode_note(raw).unwrap();
        assert!(decoded.tags.is_empty());
        assert!(decoded.created_at.is_none());
        assert!(decoded.arxiv_id.is_none());
        assert_eq!(decoded.content, "Body text");
    }

    #[test]
    fn note_with_foreign_heading_is_malformed() {
        assert!(matches!(decode_note("# Shopping list\n\n- eggs"), Err(CodecError::MalformedNote(_))));
        assert!(matches!(
            decode_note("# Research Note #1\n\n**Created:** x\n\nbody"),
            Err(CodecError::MissingField("tags"))
        ));
    }
}
