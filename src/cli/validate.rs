//! CLI `validate` command.

use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;

use macp_sync::validate::{validator, EntityKind};

pub fn validate(kind: &str, file: &Path) -> Result<()> {
    let kind: EntityKind = kind.parse().map_err(|e: String| anyhow!(e))?;
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let data: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("{} is not JSON", file.display()))?;

    let result = validator().validate(kind, &data);
    if result.valid {
        println!("{}: valid", file.display());
        return Ok(());
    }
    println!("{}: invalid", file.display());
    for error in &result.errors {
        println!("  - {error}");
    }
    bail!("{} error(s)", result.errors.len())
}
