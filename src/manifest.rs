//! The manifest: one JSON document per remote store indexing every entity.
//!
//! Sections map a sanitized entity key to a small metadata object. The manifest
//! can lag behind the files it indexes, so hydration never treats it as the only
//! source of keys.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const MANIFEST_VERSION: &str = "2.0";
pub const MANIFEST_SCHEMA: &str = "macp/v2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Papers,
    Analyses,
    Notes,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Papers => "papers",
            Self::Analyses => "analyses",
            Self::Notes => "notes",
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default = "legacy_version")]
    pub version: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub papers: BTreeMap<String, Value>,
    #[serde(default)]
    pub analyses: BTreeMap<String, Value>,
    #[serde(default)]
    pub notes: BTreeMap<String, Value>,
    /// Top-level fields this version does not know about; written back untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn legacy_version() -> String {
    "1.0".into()
}

impl Manifest {
    /// A manifest with empty sections, stamped now.
    pub fn empty(owner: Option<&str>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            version: MANIFEST_VERSION.into(),
            schema: Some(MANIFEST_SCHEMA.into()),
            created_at: Some(now.clone()),
            updated_at: Some(now),
            owner: owner.map(str::to_string),
            papers: BTreeMap::new(),
            analyses: BTreeMap::new(),
            notes: BTreeMap::new(),
            extra: Map::new(),
        }
    }

    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn section(&self, section: Section) -> &BTreeMap<String, Value> {
        match section {
            Section::Papers => &self.papers,
            Section::Analyses => &self.analyses,
            Section::Notes => &self.notes,
        }
    }

    fn section_mut(&mut self, section: Section) -> &mut BTreeMap<String, Value> {
        match section {
            Section::Papers => &mut self.papers,
            Section::Analyses => &mut self.analyses,
            Section::Notes => &mut self.notes,
        }
    }

    pub fn keys(&self, section: Section) -> impl Iterator<Item = &str> {
        self.section(section).keys().map(String::as_str)
    }

    /// Splice `value` into `section[key]` and stamp `updated_at`.
    pub fn merge_entry(&mut self, section: Section, key: &str, value: Value) {
        let slot = self
            .section_mut(section)
            .entry(key.to_string())
            .or_insert(Value::Null);
        merge_value(slot, value);
        self.updated_at = Some(chrono::Utc::now().to_rfc3339());
    }

    /// Entry counts per section, for status reporting.
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        [Section::Papers, Section::Analyses, Section::Notes]
            .into_iter()
            .map(|s| (s.as_str(), self.section(s).len()))
            .collect()
    }
}

/// Shallow merge of two entries. Objects merge key by key, arrays under the same
/// key are unioned in order, anything else is replaced.
fn merge_value(existing: &mut Value, incoming: Value) {
    match (existing, incoming) {
        (Value::Object(current), Value::Object(update)) => {
            for (key, value) in update {
                match (current.get_mut(&key), value) {
                    (Some(Value::Array(items)), Value::Array(new_items)) => {
                        for item in new_items {
                            if !items.contains(&item) {
                                items.push(item);
                            }
                        }
                    }
                    (_, value) => {
                        current.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
