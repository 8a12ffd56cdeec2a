//! Scan orchestration
//!
//! Compiles the enabled rules of each enabled ruleset as one unit and runs
//! them over every regular file below the target. Rulesets are compiled and
//! scanned on a bounded pool of blocking workers; their results are merged
//! back in ruleset order so the report does not depend on scheduling.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::engine::{MatchEngine, MatchRecord, RuleSource};
use crate::error::YayaError;
use crate::model::Ruleset;
use crate::store::CatalogStore;

/// Matches per scanned file, keyed by absolute path
///
/// Serializes as `{"<path>": [{"namespace": "...", "rule": "..."}]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanReport {
    pub results: BTreeMap<String, Vec<MatchRecord>>,
}

impl ScanReport {
    /// Total number of matches across all files
    pub fn match_count(&self) -> usize {
        self.results.values().map(Vec::len).sum()
    }

    /// Human readable listing, one block per file
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for (path, matches) in &self.results {
            let _ = writeln!(out, "{path}");
            if matches.is_empty() {
                out.push_str("  - no matches.\n");
            }
            for record in matches {
                let _ = writeln!(out, "  - [{}] {}", record.namespace, record.rule);
            }
        }
        out
    }

    /// Write the report as pretty JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;

        debug!("Wrote scan report to {}", path.display());
        Ok(())
    }
}

/// Counters for one scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub files: usize,
    pub rulesets_scanned: usize,
    pub rulesets_failed: usize,
    pub matches: usize,
}

/// Report plus counters
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub report: ScanReport,
    pub summary: ScanSummary,
}

enum RulesetScan {
    /// Per-file matches, by index into the file list
    Scanned(Vec<(usize, Vec<MatchRecord>)>),
    CompileFailed,
}

/// Runs enabled rules against a filesystem target
pub struct ScanOrchestrator<'a> {
    store: &'a CatalogStore,
    engine: Arc<dyn MatchEngine>,
    concurrency: usize,
}

impl<'a> ScanOrchestrator<'a> {
    pub fn new(
        store: &'a CatalogStore,
        engine: Arc<dyn MatchEngine>,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            engine,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn scan(&self, target: &Path) -> Result<ScanOutcome> {
        let target = target
            .canonicalize()
            .map_err(|_| YayaError::MissingTarget(target.to_path_buf()))?;

        let files = Arc::new(enumerate_files(&target));
        info!("Scanning {} files under {}", files.len(), target.display());

        let keys = report_keys(&files);
        let mut report = ScanReport::default();
        for key in &keys {
            report.results.insert(key.clone(), Vec::new());
        }

        let rulesets = self
            .store
            .find_enabled_rulesets()
            .context("Failed to list enabled rulesets")?;

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (index, ruleset) in rulesets.iter().enumerate() {
            let sources = self.gather_sources(ruleset)?;
            if sources.is_empty() {
                debug!("Ruleset '{}' has no usable rules; skipping", ruleset.name);
                continue;
            }

            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .context("Scan worker pool closed")?;
            let engine = Arc::clone(&self.engine);
            let files = Arc::clone(&files);
            let name = ruleset.name.clone();

            tasks.spawn_blocking(move || {
                let _permit = permit;
                let outcome = scan_with_ruleset(engine.as_ref(), &name, &sources, &files);
                (index, outcome)
            });
        }

        let mut outcomes = Vec::with_capacity(rulesets.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!("Scan worker failed: {}", e),
            }
        }
        outcomes.sort_by_key(|(index, _)| *index);

        let mut summary = ScanSummary {
            files: files.len(),
            ..ScanSummary::default()
        };

        for (_, outcome) in outcomes {
            match outcome {
                RulesetScan::CompileFailed => summary.rulesets_failed += 1,
                RulesetScan::Scanned(per_file) => {
                    summary.rulesets_scanned += 1;
                    for (file_index, records) in per_file {
                        report
                            .results
                            .entry(keys[file_index].clone())
                            .or_default()
                            .extend(records);
                    }
                }
            }
        }
        summary.matches = report.match_count();

        info!(
            "Scan complete: {} files, {} rulesets scanned, {} failed, {} matches",
            summary.files, summary.rulesets_scanned, summary.rulesets_failed, summary.matches
        );

        Ok(ScanOutcome { report, summary })
    }

    /// Read the enabled rules of a ruleset; unreadable or unnamespaced rules
    /// are skipped.
    fn gather_sources(&self, ruleset: &Ruleset) -> Result<Vec<RuleSource>> {
        let rules = self
            .store
            .find_enabled_rules_for_ruleset(ruleset.id)
            .with_context(|| format!("Failed to list rules of '{}'", ruleset.name))?;

        let mut sources = Vec::with_capacity(rules.len());
        for rule in rules {
            let Some(namespace) = rule.namespace.as_deref() else {
                warn!(
                    "Rule {} ({}) in '{}' has no namespace; run update first",
                    rule.id,
                    rule.path.display(),
                    ruleset.name
                );
                continue;
            };

            match RuleSource::read(namespace, &rule.path) {
                Ok(source) => sources.push(source),
                Err(e) => warn!(
                    "Skipping unreadable rule {} ({}): {}",
                    rule.id,
                    rule.path.display(),
                    e
                ),
            }
        }

        Ok(sources)
    }
}

fn scan_with_ruleset(
    engine: &dyn MatchEngine,
    ruleset: &str,
    sources: &[RuleSource],
    files: &[PathBuf],
) -> RulesetScan {
    let compiled = match engine.compile(sources) {
        Ok(compiled) => compiled,
        Err(e) => {
            warn!("Ruleset '{}' failed to compile; skipping: {}", ruleset, e);
            return RulesetScan::CompileFailed;
        }
    };

    debug!(
        "Compiled {} rules from '{}'; scanning {} files",
        sources.len(),
        ruleset,
        files.len()
    );

    let mut per_file = Vec::new();
    for (index, file) in files.iter().enumerate() {
        match compiled.scan_file(file) {
            Ok(records) if !records.is_empty() => per_file.push((index, records)),
            Ok(_) => {}
            Err(e) => warn!("Ruleset '{}': {}", ruleset, e),
        }
    }

    RulesetScan::Scanned(per_file)
}

/// Regular files below `target` (or `target` itself), in path order.
/// Symlinks are not followed; unreadable entries are logged and skipped.
pub fn enumerate_files(target: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(target).follow_links(false).sort_by_file_name() {
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(_) => {}
            Err(e) => warn!(
                "Skipping unreadable entry while walking {}: {}",
                target.display(),
                e
            ),
        }
    }

    files
}

/// Report key of one file. Bytes of the path that are not UTF-8 are written
/// as `\xNN` escapes.
pub fn report_key(path: &Path) -> String {
    if let Some(text) = path.to_str() {
        return text.to_string();
    }

    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;

        let mut key = String::new();
        for chunk in path.as_os_str().as_bytes().utf8_chunks() {
            key.push_str(chunk.valid());
            for byte in chunk.invalid() {
                let _ = write!(key, "\\x{byte:02x}");
            }
        }
        key
    }

    #[cfg(not(unix))]
    {
        path.to_string_lossy().into_owned()
    }
}

/// One distinct key per file, in file order. A key already taken by an
/// earlier file gets a ` (n)` suffix.
fn report_keys(files: &[PathBuf]) -> Vec<String> {
    let mut taken = HashSet::with_capacity(files.len());

    files
        .iter()
        .map(|file| {
            let base = report_key(file);
            let mut key = base.clone();
            let mut n = 1;
            while !taken.insert(key.clone()) {
                n += 1;
                key = format!("{base} ({n})");
            }
            if n > 1 {
                warn!("Report key '{}' is already taken; using '{}'", base, key);
            }
            key
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn record(namespace: &str, rule: &str) -> MatchRecord {
        MatchRecord {
            namespace: namespace.to_string(),
            rule: rule.to_string(),
        }
    }

    #[test]
    fn test_report_json_shape() {
        let mut report = ScanReport::default();
        report
            .results
            .insert("/data/evil.bin".to_string(), vec![record("rs:evil-3", "evil")]);
        report.results.insert("/data/clean.txt".to_string(), Vec::new());

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "/data/clean.txt": [],
                "/data/evil.bin": [{"namespace": "rs:evil-3", "rule": "evil"}],
            })
        );
    }

    #[test]
    fn test_render_text() {
        let mut report = ScanReport::default();
        report.results.insert(
            "/a".to_string(),
            vec![record("rs:evil-3", "evil"), record("rs:evil-3", "worse")],
        );
        report.results.insert("/b".to_string(), Vec::new());

        assert_eq!(
            report.render_text(),
            "/a\n  - [rs:evil-3] evil\n  - [rs:evil-3] worse\n/b\n  - no matches.\n"
        );
        assert_eq!(report.match_count(), 2);
    }

    #[test]
    fn test_write_json_creates_parent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("reports").join("yaya.json");
        let mut report = ScanReport::default();
        report.results.insert("/x".to_string(), Vec::new());

        report.write_json(&path).unwrap();

        let loaded: ScanReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, report);
    }

    #[test]
    fn test_enumerate_single_file_and_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("nested")).unwrap();
        std::fs::write(root.join("b.txt"), "b").unwrap();
        std::fs::write(root.join("nested/a.bin"), "a").unwrap();

        assert_eq!(
            enumerate_files(root),
            vec![root.join("b.txt"), root.join("nested/a.bin")]
        );
        assert_eq!(enumerate_files(&root.join("b.txt")), vec![root.join("b.txt")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_enumerate_does_not_follow_symlinks() {
        use std::os::unix::fs::symlink;

        let temp_dir = TempDir::new().unwrap();
        let outside = temp_dir.path().join("outside");
        let target = temp_dir.path().join("target");
        std::fs::create_dir_all(&outside).unwrap();
        std::fs::create_dir_all(target.join("nested")).unwrap();
        std::fs::write(outside.join("secret.bin"), "s").unwrap();
        std::fs::write(target.join("nested/a.bin"), "a").unwrap();

        symlink(&outside, target.join("to-outside")).unwrap();
        symlink(outside.join("secret.bin"), target.join("secret-link")).unwrap();
        symlink(&target, target.join("nested/loop")).unwrap();

        assert_eq!(enumerate_files(&target), vec![target.join("nested/a.bin")]);
    }

    #[test]
    fn test_report_keys_stay_distinct() {
        let files = vec![PathBuf::from("/t/a"), PathBuf::from("/t/b"), PathBuf::from("/t/a")];
        assert_eq!(report_keys(&files), vec!["/t/a", "/t/b", "/t/a (2)"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_report_key_escapes_non_utf8_bytes() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let ff = Path::new(OsStr::from_bytes(b"/t/a\xff"));
        let fe = Path::new(OsStr::from_bytes(b"/t/a\xfe"));

        assert_eq!(report_key(ff), "/t/a\\xff");
        assert_eq!(report_key(fe), "/t/a\\xfe");
        assert_eq!(report_key(Path::new("/t/caf\u{e9}")), "/t/caf\u{e9}");
    }
}
