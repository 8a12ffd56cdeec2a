//! Export the enabled rule corpus
//!
//! Both exports are all-or-nothing: output goes to a temp file next to the
//! destination and is renamed into place only once everything succeeded.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::engine::{MatchEngine, RuleSource};
use crate::model::Rule;
use crate::store::CatalogStore;

/// Enabled rules of enabled rulesets, in ruleset-then-rule id order
fn enabled_rules(store: &CatalogStore) -> Result<Vec<Rule>> {
    let mut rules = Vec::new();
    for ruleset in store
        .find_enabled_rulesets()
        .context("Failed to list enabled rulesets")?
    {
        let enabled = store
            .find_enabled_rules_for_ruleset(ruleset.id)
            .with_context(|| format!("Failed to list rules of '{}'", ruleset.name))?;
        debug!("Exporting {} rules from '{}'", enabled.len(), ruleset.name);
        rules.extend(enabled);
    }
    Ok(rules)
}

/// Concatenate the raw source of every enabled rule into `output`, each
/// followed by a newline. Returns the number of rules written.
pub fn export_plain(store: &CatalogStore, output: &Path) -> Result<usize> {
    let rules = enabled_rules(store)?;
    let mut file = temp_file_for(output)?;

    for rule in &rules {
        let bytes = std::fs::read(&rule.path).with_context(|| {
            format!("Failed to read rule {} ({})", rule.id, rule.path.display())
        })?;
        file.write_all(&bytes)?;
        file.write_all(b"\n")?;
    }

    persist(file, output)?;
    info!("Exported {} rules to {}", rules.len(), output.display());
    Ok(rules.len())
}

/// Compile every enabled rule in one context and write the serialized
/// artifact to `output`. Returns the number of rules compiled.
pub fn export_compiled(
    store: &CatalogStore,
    engine: &dyn MatchEngine,
    output: &Path,
) -> Result<usize> {
    let rules = enabled_rules(store)?;

    let mut sources = Vec::with_capacity(rules.len());
    for rule in &rules {
        let namespace = rule
            .namespace
            .clone()
            .with_context(|| format!("Rule {} has no namespace; run update first", rule.id))?;
        let source = RuleSource::read(namespace, &rule.path).with_context(|| {
            format!("Failed to read rule {} ({})", rule.id, rule.path.display())
        })?;
        sources.push(source);
    }

    let compiled = engine
        .compile(&sources)
        .context("Failed to compile enabled rules")?;
    let bytes = compiled.serialize()?;

    let mut file = temp_file_for(output)?;
    file.write_all(&bytes)?;
    persist(file, output)?;

    info!(
        "Exported {} compiled rules ({} bytes) to {}",
        rules.len(),
        bytes.len(),
        output.display()
    );
    Ok(rules.len())
}

fn temp_file_for(output: &Path) -> Result<NamedTempFile> {
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))
}

fn persist(file: NamedTempFile, output: &Path) -> Result<()> {
    file.persist(output)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(())
}
