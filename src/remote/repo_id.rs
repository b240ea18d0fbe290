//! Repository identifier validation.
//!
//! A caller-supplied `owner/name` is interpolated into request URLs, so it is
//! checked against a strict allow-list before any client is built.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::error::ConfigError;

static REPO_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._-]+/[A-Za-z0-9._-]+$").expect("valid repository regex")
});

/// A validated `owner/name` repository identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId {
    owner: String,
    name: String,
}

impl RepoId {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidRepository(raw.to_string());
        if !REPO_PATTERN.is_match(raw) {
            return Err(invalid());
        }
        let (owner, name) = raw.split_once('/').ok_or_else(invalid)?;
        // Dot-only segments would resolve as path traversal once in a URL.
        if owner.contains("..") || name.contains("..") || owner == "." || name == "." {
            return Err(invalid());
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl std::str::FromStr for RepoId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
