//! Ruleset synchronization
//!
//! Brings each ruleset's working copy up to date: clone when it is missing,
//! pull when it exists. Rulesets are independent, so they run on a bounded
//! pool of blocking workers and one broken upstream never stops the rest.
//! The catalog is not touched here.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::model::Ruleset;
use crate::vcs::VcsClient;

/// What happened to one working copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Cloned,
    Pulled,
}

/// A ruleset whose clone or pull failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    pub ruleset: String,
    pub error: String,
}

/// Outcome of one synchronization pass, in ruleset order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub cloned: Vec<String>,
    pub pulled: Vec<String>,
    pub failed: Vec<SyncFailure>,
}

impl SyncSummary {
    pub fn total(&self) -> usize {
        self.cloned.len() + self.pulled.len() + self.failed.len()
    }
}

/// Drives clone/pull for a set of rulesets
pub struct RulesetSynchronizer {
    vcs: Arc<dyn VcsClient>,
    rulesets_root: PathBuf,
    concurrency: usize,
}

impl RulesetSynchronizer {
    pub fn new(vcs: Arc<dyn VcsClient>, rulesets_root: PathBuf, concurrency: usize) -> Self {
        Self {
            vcs,
            rulesets_root,
            concurrency: concurrency.max(1),
        }
    }

    /// Synchronize every given ruleset. Only failing to create the rulesets
    /// root is an error; per-ruleset failures are logged and reported.
    pub async fn sync(&self, rulesets: &[Ruleset]) -> Result<SyncSummary> {
        std::fs::create_dir_all(&self.rulesets_root).with_context(|| {
            format!(
                "Failed to create rulesets directory: {}",
                self.rulesets_root.display()
            )
        })?;

        info!(
            "Synchronizing {} rulesets ({} workers)",
            rulesets.len(),
            self.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (index, ruleset) in rulesets.iter().enumerate() {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .context("Synchronization worker pool closed")?;

            let vcs = Arc::clone(&self.vcs);
            let dir = ruleset.working_copy_dir(&self.rulesets_root);
            let name = ruleset.name.clone();
            let url = ruleset.url.clone();

            tasks.spawn_blocking(move || {
                let _permit = permit;
                let (action, result) = if dir.exists() {
                    debug!("git pull {} in {}", name, dir.display());
                    (SyncAction::Pulled, vcs.pull(&dir))
                } else {
                    info!("git clone {}", url);
                    (SyncAction::Cloned, vcs.clone_repo(&url, &dir))
                };
                (index, name, action, result)
            });
        }

        let mut outcomes = Vec::with_capacity(rulesets.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!("Synchronization worker failed: {}", e),
            }
        }
        outcomes.sort_by_key(|(index, ..)| *index);

        let mut summary = SyncSummary::default();
        for (_, name, action, result) in outcomes {
            match (action, result) {
                (SyncAction::Cloned, Ok(())) => summary.cloned.push(name),
                (SyncAction::Pulled, Ok(())) => summary.pulled.push(name),
                (_, Err(e)) => {
                    warn!("Failed to synchronize ruleset '{}': {}", name, e);
                    summary.failed.push(SyncFailure {
                        ruleset: name,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Synchronization complete: {} cloned, {} pulled, {} failed",
            summary.cloned.len(),
            summary.pulled.len(),
            summary.failed.len()
        );

        Ok(summary)
    }
}
