//! Rule discovery
//!
//! Walks each enabled ruleset's working copy, records every rule file in the
//! catalog, gives it a globally unique namespace and validates it by
//! compiling it alone. Anything broken is disabled, never deleted:
//!
//! - ruleset without a working copy → ruleset disabled (quarantined)
//! - rule that does not read or compile → rule disabled
//! - rule whose file is gone from a complete walk → rule disabled

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::engine::{MatchEngine, RuleSource};
use crate::model::{Rule, Ruleset};
use crate::store::CatalogStore;

/// Counters for one discovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoverySummary {
    /// Rulesets visited
    pub rulesets: usize,
    /// Rule files found across all walks
    pub rules_found: usize,
    /// Rules disabled because they failed to read or compile
    pub rules_disabled: usize,
    /// Rules disabled because their file disappeared
    pub rules_pruned: usize,
    /// Rulesets disabled for lack of a working copy
    pub quarantined: Vec<String>,
    /// Rulesets whose walk failed
    pub walk_failures: Vec<String>,
}

/// Discovers and validates rule files for rulesets in the catalog
pub struct RuleDiscovery<'a> {
    store: &'a CatalogStore,
    engine: &'a dyn MatchEngine,
    rulesets_root: &'a Path,
}

impl<'a> RuleDiscovery<'a> {
    pub fn new(
        store: &'a CatalogStore,
        engine: &'a dyn MatchEngine,
        rulesets_root: &'a Path,
    ) -> Self {
        Self {
            store,
            engine,
            rulesets_root,
        }
    }

    /// Discover rules for every enabled ruleset
    pub fn discover_all(&self) -> Result<DiscoverySummary> {
        let rulesets = self
            .store
            .find_enabled_rulesets()
            .context("Failed to list enabled rulesets")?;

        info!("Discovering rules in {} rulesets", rulesets.len());

        let mut summary = DiscoverySummary::default();
        for mut ruleset in rulesets {
            self.discover_into(&mut ruleset, &mut summary)?;
        }

        info!(
            "Discovery complete: {} rules, {} disabled, {} pruned, {} rulesets quarantined",
            summary.rules_found,
            summary.rules_disabled,
            summary.rules_pruned,
            summary.quarantined.len()
        );
        Ok(summary)
    }

    /// Discover rules for a single ruleset
    pub fn discover_ruleset(&self, ruleset: &mut Ruleset) -> Result<DiscoverySummary> {
        let mut summary = DiscoverySummary::default();
        self.discover_into(ruleset, &mut summary)?;
        Ok(summary)
    }

    fn discover_into(&self, ruleset: &mut Ruleset, summary: &mut DiscoverySummary) -> Result<()> {
        summary.rulesets += 1;
        let dir = ruleset.working_copy_dir(self.rulesets_root);

        if !dir.is_dir() {
            warn!(
                "Ruleset '{}' ({}) has no working copy at {}; disabling it",
                ruleset.name,
                ruleset.id,
                dir.display()
            );
            ruleset.enabled = false;
            if let Err(e) = self.store.save_ruleset(ruleset) {
                warn!("Failed to disable ruleset '{}': {}", ruleset.name, e);
            }
            summary.quarantined.push(ruleset.name.clone());
            return Ok(());
        }

        let files = match find_rule_files(&dir) {
            Ok(files) => files,
            Err(e) => {
                warn!("Failed to walk ruleset '{}': {}", ruleset.name, e);
                summary.walk_failures.push(ruleset.name.clone());
                return Ok(());
            }
        };

        debug!("Found {} rule files in '{}'", files.len(), ruleset.name);

        let mut seen = HashSet::with_capacity(files.len());
        for path in files {
            let mut rule = self
                .store
                .upsert_rule_by_path_and_ruleset(&path, ruleset.id)
                .with_context(|| format!("Failed to record rule {}", path.display()))?;
            seen.insert(rule.id);
            summary.rules_found += 1;

            let namespace = rule_namespace(&ruleset.name, &rule.path, rule.id);
            rule.namespace = Some(namespace.clone());

            if rule.enabled {
                if let Err(reason) = self.validate(&namespace, &rule.path) {
                    warn!(
                        "Disabling rule {} ({}): {}",
                        namespace,
                        rule.path.display(),
                        reason
                    );
                    rule.enabled = false;
                    summary.rules_disabled += 1;
                }
            }

            self.persist(&rule);
        }

        let stale: Vec<Rule> = self
            .store
            .find_enabled_rules_for_ruleset(ruleset.id)
            .with_context(|| format!("Failed to list rules of '{}'", ruleset.name))?
            .into_iter()
            .filter(|rule| !seen.contains(&rule.id))
            .collect();

        for mut rule in stale {
            info!(
                "Rule file {} disappeared from '{}'; disabling rule {}",
                rule.path.display(),
                ruleset.name,
                rule.id
            );
            rule.enabled = false;
            summary.rules_pruned += 1;
            self.persist(&rule);
        }

        Ok(())
    }

    /// Compile a rule on its own
    fn validate(&self, namespace: &str, path: &Path) -> Result<(), String> {
        let source =
            RuleSource::read(namespace, path).map_err(|e| format!("unreadable rule file: {e}"))?;
        self.engine
            .compile(std::slice::from_ref(&source))
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    fn persist(&self, rule: &Rule) {
        if let Err(e) = self.store.save_rule(rule) {
            warn!("Failed to save rule {} ({}): {}", rule.id, rule.path.display(), e);
        }
    }
}

/// `<rulesetName>:<fileStem>-<ruleId>`; the id keeps identically named files
/// in different rulesets apart.
pub fn rule_namespace(ruleset_name: &str, path: &Path, rule_id: i64) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{ruleset_name}:{stem}-{rule_id}")
}

/// Whether a file name looks like a YARA rule file (`.yar`, `.yara`, ...)
pub fn is_rule_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase().starts_with("yar"))
        .unwrap_or(false)
}

/// Walk a working copy for rule files, in file-name order. Symlinks are not
/// followed and `.git` is skipped.
pub fn find_rule_files(dir: &Path) -> Result<Vec<PathBuf>, walkdir::Error> {
    let mut files = Vec::new();

    let walker = WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || entry.file_name() != ".git");

    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() && is_rule_file(entry.path()) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}
