//! Top-level operations
//!
//! [`Yaya`] owns the catalog and the two backends and exposes one method per
//! user-facing command. Each operation passes the store and its working set
//! to the component that needs them and returns that component's summary.
//!
//! ```text
//! bootstrap ─► defaults ─┐
//! update ────► fetch index ─► sync enabled ─► discover enabled
//! add ───────► upsert one ──► sync one ─────► discover one
//! scan ──────► ScanOrchestrator
//! edit ──────► CatalogEditor
//! export* ───► export_plain / export_compiled
//! ```

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::catalog::{default_rulesets, SourceCatalogFetcher};
use crate::config::{YayaConfig, YayaPaths};
use crate::discovery::{DiscoverySummary, RuleDiscovery};
use crate::editor::{CatalogEditor, EditCommand, ToggleOutcome};
use crate::engine::{MatchEngine, YaraEngine};
use crate::error::YayaError;
use crate::export;
use crate::model::{Ruleset, RulesetDescriptor};
use crate::scan::{ScanOrchestrator, ScanOutcome};
use crate::store::CatalogStore;
use crate::sync::{RulesetSynchronizer, SyncSummary};
use crate::vcs::{GitClient, VcsClient};

/// Knobs for [`Yaya::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Fetch the source index before synchronizing
    pub fetch_index: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self { fetch_index: true }
    }
}

/// What an update did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Candidates taken from the index, if it was fetched
    pub fetched: Option<usize>,
    pub sync: SyncSummary,
    pub discovery: DiscoverySummary,
}

/// What adding a ruleset did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddSummary {
    pub ruleset: Ruleset,
    pub sync: SyncSummary,
    pub discovery: DiscoverySummary,
}

/// YAYA application handle
pub struct Yaya {
    paths: YayaPaths,
    config: YayaConfig,
    store: CatalogStore,
    vcs: Arc<dyn VcsClient>,
    engine: Arc<dyn MatchEngine>,
}

impl Yaya {
    /// Open with the git and YARA-X backends
    pub fn open(paths: YayaPaths, config: YayaConfig) -> Result<Self> {
        Self::with_backends(
            paths,
            config,
            Arc::new(GitClient::new()),
            Arc::new(YaraEngine::new()),
        )
    }

    /// Open with explicit backends
    pub fn with_backends(
        paths: YayaPaths,
        config: YayaConfig,
        vcs: Arc<dyn VcsClient>,
        engine: Arc<dyn MatchEngine>,
    ) -> Result<Self> {
        paths.ensure()?;
        let store = CatalogStore::open(&paths.database).with_context(|| {
            format!("Failed to open catalog: {}", paths.database.display())
        })?;

        Ok(Self {
            paths,
            config,
            store,
            vcs,
            engine,
        })
    }

    pub fn paths(&self) -> &YayaPaths {
        &self.paths
    }

    pub fn config(&self) -> &YayaConfig {
        &self.config
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    /// A catalog holding at most one ruleset has never been populated
    pub fn is_first_run(&self) -> Result<bool> {
        Ok(self.store.count()? <= 1)
    }

    /// Seed the curated defaults, then run a full update
    pub async fn bootstrap(&self) -> Result<UpdateSummary> {
        info!("Initializing catalog at {}", self.paths.root.display());

        for descriptor in default_rulesets() {
            self.store
                .upsert_ruleset_by_name(&descriptor)
                .with_context(|| format!("Failed to record ruleset '{}'", descriptor.name))?;
        }

        self.update(UpdateOptions::default()).await
    }

    /// Fetch the index (optional), synchronize every enabled ruleset and
    /// rediscover their rules
    pub async fn update(&self, options: UpdateOptions) -> Result<UpdateSummary> {
        let fetched = if options.fetch_index {
            let fetcher = SourceCatalogFetcher::new(&self.config)?;
            let rulesets = fetcher.fetch_and_upsert(&self.store).await?;
            Some(rulesets.len())
        } else {
            None
        };

        let enabled = self
            .store
            .find_enabled_rulesets()
            .context("Failed to list enabled rulesets")?;

        let sync = self.synchronizer().sync(&enabled).await?;
        let discovery = self.discovery().discover_all()?;

        Ok(UpdateSummary {
            fetched,
            sync,
            discovery,
        })
    }

    /// Register a repository (URL or local path ending in `.git`), clone it
    /// and discover its rules. Adding an existing name re-enables it.
    pub async fn add(&self, source: &str) -> Result<AddSummary> {
        let name = ruleset_name_from_source(source)?;
        let source = source.trim();

        let description = match self.store.find_ruleset_by_name(&name)? {
            Some(existing) => existing.description,
            None => format!("Added from {source}"),
        };

        let mut ruleset = self
            .store
            .upsert_ruleset_by_name(&RulesetDescriptor::new(&name, source, description))
            .with_context(|| format!("Failed to record ruleset '{name}'"))?;

        if !ruleset.enabled {
            ruleset.enabled = true;
            self.store.save_ruleset(&ruleset)?;
        }
        info!("Adding ruleset '{}' ({}) from {}", ruleset.name, ruleset.id, source);

        let sync = self
            .synchronizer()
            .sync(std::slice::from_ref(&ruleset))
            .await?;
        if let Some(failure) = sync.failed.first() {
            warn!("Ruleset '{}' could not be fetched: {}", name, failure.error);
        }

        let discovery = self.discovery().discover_ruleset(&mut ruleset)?;

        Ok(AddSummary {
            ruleset,
            sync,
            discovery,
        })
    }

    /// Scan `target` with all enabled rules
    pub async fn scan(&self, target: &Path) -> Result<ScanOutcome> {
        ScanOrchestrator::new(&self.store, Arc::clone(&self.engine), self.config.concurrency)
            .scan(target)
            .await
    }

    pub fn editor(&self) -> CatalogEditor<'_> {
        CatalogEditor::new(&self.store)
    }

    pub fn edit(&self, command: &EditCommand) -> Result<Vec<ToggleOutcome>> {
        self.editor().apply(command)
    }

    pub fn export_plain(&self, output: &Path) -> Result<usize> {
        export::export_plain(&self.store, output)
    }

    pub fn export_compiled(&self, output: &Path) -> Result<usize> {
        export::export_compiled(&self.store, self.engine.as_ref(), output)
    }

    fn synchronizer(&self) -> RulesetSynchronizer {
        RulesetSynchronizer::new(
            Arc::clone(&self.vcs),
            self.paths.rulesets.clone(),
            self.config.concurrency,
        )
    }

    fn discovery(&self) -> RuleDiscovery<'_> {
        RuleDiscovery::new(&self.store, self.engine.as_ref(), &self.paths.rulesets)
    }
}

/// Ruleset name for an `add` source: the last path segment without `.git`.
/// Anything not ending in `.git` is rejected.
pub fn ruleset_name_from_source(source: &str) -> Result<String, YayaError> {
    let trimmed = source.trim().trim_end_matches('/');
    let stem = trimmed
        .strip_suffix(".git")
        .ok_or_else(|| YayaError::InvalidSource(source.to_string()))?;

    let name = stem
        .rsplit(|c| c == '/' || c == '\\' || c == ':')
        .next()
        .unwrap_or_default();

    if name.is_empty() {
        return Err(YayaError::InvalidSource(source.to_string()));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_from_url() {
        assert_eq!(
            ruleset_name_from_source("https://github.com/x/bar.git").unwrap(),
            "bar"
        );
        assert_eq!(
            ruleset_name_from_source("git@github.com:x/baz.git").unwrap(),
            "baz"
        );
        assert_eq!(ruleset_name_from_source("/srv/mirrors/qux.git/").unwrap(), "qux");
    }

    #[test]
    fn test_name_requires_git_suffix() {
        assert!(matches!(
            ruleset_name_from_source("https://github.com/x/bar"),
            Err(YayaError::InvalidSource(_))
        ));
        assert!(matches!(
            ruleset_name_from_source(".git"),
            Err(YayaError::InvalidSource(_))
        ));
        assert!(matches!(
            ruleset_name_from_source("https://github.com/x/.git"),
            Err(YayaError::InvalidSource(_))
        ));
    }
}
