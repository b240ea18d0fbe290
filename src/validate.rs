//! Schema Validator.
//!
//! Gatekeeper run before an entity reaches the cache or the remote. Only the
//! hard-required fields are enforced so that legacy documents lacking newer
//! optional fields still pass. The enum sets and consensus rules come from the
//! schema document bundled at `schema/macp_v2.json`, parsed once per process.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

const BUNDLED_SCHEMA: &str = include_str!("../schema/macp_v2.json");

static BUNDLED: Lazy<SchemaValidator> = Lazy::new(|| {
    SchemaValidator::from_json(BUNDLED_SCHEMA).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "bundled schema unreadable, using built-in rules");
        SchemaValidator::default()
    })
});

/// The process-wide validator built from the bundled schema.
pub fn validator() -> &'static SchemaValidator {
    &BUNDLED
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Paper,
    Analysis,
    Consensus,
    Agent,
}

impl EntityKind {
    fn definition_key(&self) -> &'static str {
        match self {
            Self::Paper => "paper",
            Self::Analysis => "analysis",
            Self::Consensus => "consensus",
            Self::Agent => "agent",
        }
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paper" => Ok(Self::Paper),
            "analysis" => Ok(Self::Analysis),
            "consensus" => Ok(Self::Consensus),
            "agent" => Ok(Self::Agent),
            _ => Err(format!(
                "unknown entity kind: {s} (expected paper, analysis, consensus or agent)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Agreement scoring weights used when building a consensus record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConsensusWeights {
    pub key_findings_overlap: f64,
    pub relevance_score_alignment: f64,
    pub methodology_consistency: f64,
}

impl Default for ConsensusWeights {
    fn default() -> Self {
        Self {
            key_findings_overlap: 0.4,
            relevance_score_alignment: 0.3,
            methodology_consistency: 0.3,
        }
    }
}

// Shape of the schema document. Only the parts the validator reads.
#[derive(Debug, Default, Deserialize)]
struct SchemaDocument {
    #[serde(default)]
    version: String,
    #[serde(default)]
    definitions: BTreeMap<String, Definition>,
    #[serde(default)]
    consensus_rules: ConsensusRules,
}

#[derive(Debug, Default, Deserialize)]
struct Definition {
    #[serde(default)]
    enums: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ConsensusRules {
    minimum_agents: Option<usize>,
    #[serde(default)]
    agreement_scoring: AgreementScoring,
}

#[derive(Debug, Default, Deserialize)]
struct AgreementScoring {
    key_findings_overlap_weight: Option<f64>,
    relevance_score_alignment_weight: Option<f64>,
    methodology_consistency_weight: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct SchemaValidator {
    version: String,
    enums: BTreeMap<(&'static str, String), Vec<String>>,
    min_agents: usize,
    weights: ConsensusWeights,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        let mut enums = BTreeMap::new();
        enums.insert(
            ("paper", "status".to_string()),
            ["discovered", "saved", "analyzed", "deep_analyzed", "cited"]
                .map(String::from)
                .to_vec(),
        );
        enums.insert(
            ("analysis", "type".to_string()),
            ["abstract", "deep", "comparative", "methodological"]
                .map(String::from)
                .to_vec(),
        );
        enums.insert(
            ("agent", "cost_tier".to_string()),
            ["free", "freemium", "paid", "enterprise"]
                .map(String::from)
                .to_vec(),
        );
        Self {
            version: "builtin".into(),
            enums,
            min_agents: 2,
            weights: ConsensusWeights::default(),
        }
    }
}

impl SchemaValidator {
    /// Build a validator from a schema document. Missing parts fall back to the
    /// built-in rules.
    pub fn from_json(raw: &str) -> Result<Self> {
        let doc: SchemaDocument = serde_json::from_str(raw).context("failed to parse schema document")?;
        let mut validator = Self::default();
        if !doc.version.is_empty() {
            validator.version = doc.version;
        }

        for kind in [
            EntityKind::Paper,
            EntityKind::Analysis,
            EntityKind::Consensus,
            EntityKind::Agent,
        ] {
            let key = kind.definition_key();
            if let Some(def) = doc.definitions.get(key) {
                for (field, values) in &def.enums {
                    validator.enums.insert((key, field.clone()), values.clone());
                }
            }
        }

        let rules = doc.consensus_rules;
        if let Some(min) = rules.minimum_agents {
            validator.min_agents = min.max(1);
        }
        let scoring = rules.agreement_scoring;
        let defaults = ConsensusWeights::default();
        validator.weights = ConsensusWeights {
            key_findings_overlap: scoring
                .key_findings_overlap_weight
                .unwrap_or(defaults.key_findings_overlap),
            relevance_score_alignment: scoring
                .relevance_score_alignment_weight
                .unwrap_or(defaults.relevance_score_alignment),
            methodology_consistency: scoring
                .methodology_consistency_weight
                .unwrap_or(defaults.methodology_consistency),
        };

        tracing::debug!(version = %validator.version, "schema loaded");
        Ok(validator)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn consensus_weights(&self) -> ConsensusWeights {
        self.weights
    }

    pub fn consensus_min_agents(&self) -> usize {
        self.min_agents
    }

    pub fn validate(&self, kind: EntityKind, data: &Value) -> ValidationResult {
        let Some(obj) = data.as_object() else {
            return ValidationResult::from_errors(vec![format!(
                "{} must be a JSON object",
                kind.definition_key()
            )]);
        };
        let errors = match kind {
            EntityKind::Paper => self.paper_errors(obj),
            EntityKind::Analysis => self.analysis_errors(obj),
            EntityKind::Consensus => self.consensus_errors(obj),
            EntityKind::Agent => self.agent_errors(obj),
        };
        ValidationResult::from_errors(errors)
    }

    fn allowed(&self, kind: EntityKind, field: &str) -> Option<&[String]> {
        self.enums
            .get(&(kind.definition_key(), field.to_string()))
            .map(Vec::as_slice)
    }

    fn check_enum(&self, kind: EntityKind, field: &str, value: &str, errors: &mut Vec<String>) {
        if let Some(allowed) = self.allowed(kind, field) {
            if !allowed.iter().any(|a| a == value) {
                errors.push(format!(
                    "invalid {field} '{value}', must be one of: {}",
                    allowed.join(", ")
                ));
            }
        }
    }

    fn paper_errors(&self, obj: &Obj) -> Vec<String> {
        let mut errors = Vec::new();
        if !present(obj, "arxiv_id") && !present(obj, "id") {
            errors.push("missing required field: arxiv_id".into());
        }
        if !present(obj, "title") {
            errors.push("missing required field: title".into());
        }
        match obj.get("status") {
            None | Some(Value::Null) => {}
            Some(Value::String(status)) => {
                self.check_enum(EntityKind::Paper, "status", status, &mut errors)
            }
            Some(_) => errors.push("status must be a string".into()),
        }
        array_or_absent(obj, "authors", &mut errors);
        errors
    }

    fn analysis_errors(&self, obj: &Obj) -> Vec<String> {
        let mut errors = Vec::new();
        if !present(obj, "arxiv_id") && !present(obj, "paper_id") {
            errors.push("missing required field: arxiv_id or paper_id".into());
        }
        if !present(obj, "agent_id") && !present(obj, "provider") {
            errors.push("missing required field: agent_id or provider".into());
        }
        if !present(obj, "summary") {
            errors.push("missing required field: summary".into());
        }
        let analysis_type = obj
            .get("type")
            .or_else(|| obj.get("analysis_type"))
            .and_then(Value::as_str)
            .unwrap_or("abstract");
        self.check_enum(EntityKind::Analysis, "type", analysis_type, &mut errors);

        let findings = ["key_findings", "key_insights", "key_contributions"]
            .iter()
            .find(|k| !matches!(obj.get(**k), None | Some(Value::Null)));
        if let Some(key) = findings {
            if !obj[*key].is_array() {
                errors.push("key_findings must be an array".into());
            }
        }
        errors
    }

    fn consensus_errors(&self, obj: &Obj) -> Vec<String> {
        let mut errors = Vec::new();
        if !present(obj, "arxiv_id") {
            errors.push("missing required field: arxiv_id".into());
        }

        let distinct = obj
            .get("agents_compared")
            .and_then(Value::as_array)
            .map(|agents| {
                agents
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|a| !a.is_empty())
                    .collect::<HashSet<_>>()
                    .len()
            });
        if distinct.map_or(true, |n| n < self.min_agents) {
            errors.push(format!(
                "agents_compared must be an array with at least {} distinct agents",
                self.min_agents
            ));
        }

        for field in ["generated_at", "generated_by"] {
            if !present(obj, field) {
                errors.push(format!("missing required field: {field}"));
            }
        }

        match obj.get("agreement_score") {
            None | Some(Value::Null) => errors.push("missing required field: agreement_score".into()),
            Some(score) => match score.as_f64() {
                Some(s) if (0.0..=1.0).contains(&s) => {}
                _ => errors.push("agreement_score must be a number between 0 and 1".into()),
            },
        }

        if !present(obj, "synthesized_summary") {
            errors.push("missing required field: synthesized_summary".into());
        }
        array_or_absent(obj, "convergence_points", &mut errors);
        array_or_absent(obj, "divergence_points", &mut errors);
        errors
    }

    fn agent_errors(&self, obj: &Obj) -> Vec<String> {
        let mut errors = Vec::new();
        for field in ["agent_id", "name", "model"] {
            if !present(obj, field) {
                errors.push(format!("missing required field: {field}"));
            }
        }
        array_or_absent(obj, "capabilities", &mut errors);
        if let Some(tier) = obj.get("cost_tier").and_then(Value::as_str).filter(|t| !t.is_empty()) {
            self.check_enum(EntityKind::Agent, "cost_tier", tier, &mut errors);
        }
        errors
    }
}

type Obj = serde_json::Map<String, Value>;

/// A field counts as present when it holds something other than null, `""`,
/// `false`, zero, or an empty container.
fn present(obj: &Obj, field: &str) -> bool {
    match obj.get(field) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

fn array_or_absent(obj: &Obj, field: &str, errors: &mut Vec<String>) {
    if let Some(value) = obj.get(field) {
        if !value.is_null() && !value.is_array() {
            errors.push(format!("{field} must be an array"));
        }
    }
}
