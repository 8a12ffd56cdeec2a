//! Catalog editing: list records and toggle their enabled flag

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::YayaError;
use crate::model::{Rule, Ruleset};
use crate::store::CatalogStore;

/// Which kind of record an edit applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EditTarget {
    Rulesets,
    Rules,
}

/// A batch of ids to toggle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditCommand {
    pub target: EditTarget,
    pub ids: Vec<i64>,
    /// When set, rule ids outside this ruleset are refused
    pub ruleset_id: Option<i64>,
}

impl EditCommand {
    pub fn new(target: EditTarget, ids: Vec<i64>) -> Self {
        Self {
            target,
            ids,
            ruleset_id: None,
        }
    }

    /// Only toggle rules that belong to `ruleset_id`
    pub fn within_ruleset(mut self, ruleset_id: i64) -> Self {
        self.ruleset_id = Some(ruleset_id);
        self
    }

    /// Parse whitespace separated ids. One bad id rejects the whole batch.
    pub fn parse(target: EditTarget, input: &str) -> Result<Self, YayaError> {
        let ids = input
            .split_whitespace()
            .map(|token| {
                token
                    .parse::<i64>()
                    .map_err(|_| YayaError::InvalidIdentifier(token.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(target, ids))
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Result of toggling one id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ToggleOutcome {
    Toggled { id: i64, name: String, enabled: bool },
    NotFound { id: i64 },
    /// The rule exists but belongs to another ruleset; left unchanged
    OtherRuleset { id: i64, ruleset_id: i64 },
}

/// Lists and toggles catalog records
pub struct CatalogEditor<'a> {
    store: &'a CatalogStore,
}

impl<'a> CatalogEditor<'a> {
    pub fn new(store: &'a CatalogStore) -> Self {
        Self { store }
    }

    pub fn rulesets(&self) -> Result<Vec<Ruleset>> {
        self.store
            .find_all_rulesets()
            .context("Failed to list rulesets")
    }

    /// Rules of one ruleset; an unknown ruleset id is an error
    pub fn rules(&self, ruleset_id: i64) -> Result<Vec<Rule>> {
        let ruleset = self.store.find_ruleset_by_id(ruleset_id)?;
        self.store
            .find_rules_for_ruleset(ruleset.id)
            .with_context(|| format!("Failed to list rules of '{}'", ruleset.name))
    }

    /// Flip the enabled flag of every id in the batch. Missing ids are
    /// reported and skipped; any other store failure aborts.
    pub fn apply(&self, command: &EditCommand) -> Result<Vec<ToggleOutcome>> {
        let mut outcomes = Vec::with_capacity(command.ids.len());

        for &id in &command.ids {
            let outcome = match command.target {
                EditTarget::Rulesets => self.toggle_ruleset(id)?,
                EditTarget::Rules => self.toggle_rule(id, command.ruleset_id)?,
            };
            debug!("Edit {:?} {}: {:?}", command.target, id, outcome);
            outcomes.push(outcome);
        }

        let toggled = outcomes
            .iter()
            .filter(|o| matches!(o, ToggleOutcome::Toggled { .. }))
            .count();
        info!("Toggled {} of {} {:?}", toggled, command.ids.len(), command.target);

        Ok(outcomes)
    }

    fn toggle_ruleset(&self, id: i64) -> Result<ToggleOutcome> {
        let mut ruleset = match self.store.find_ruleset_by_id(id) {
            Ok(ruleset) => ruleset,
            Err(e) if e.is_not_found() => return Ok(ToggleOutcome::NotFound { id }),
            Err(e) => return Err(e.into()),
        };

        ruleset.enabled = !ruleset.enabled;
        self.store
            .save_ruleset(&ruleset)
            .with_context(|| format!("Failed to save ruleset {id}"))?;

        Ok(ToggleOutcome::Toggled {
            id,
            name: ruleset.name,
            enabled: ruleset.enabled,
        })
    }

    fn toggle_rule(&self, id: i64, scope: Option<i64>) -> Result<ToggleOutcome> {
        let mut rule = match self.store.find_rule_by_id(id) {
            Ok(rule) => rule,
            Err(e) if e.is_not_found() => return Ok(ToggleOutcome::NotFound { id }),
            Err(e) => return Err(e.into()),
        };

        if let Some(expected) = scope.filter(|&expected| expected != rule.ruleset_id) {
            warn!(
                "Rule {} belongs to ruleset {}, not {}; skipping",
                id, rule.ruleset_id, expected
            );
            return Ok(ToggleOutcome::OtherRuleset {
                id,
                ruleset_id: rule.ruleset_id,
            });
        }

        rule.enabled = !rule.enabled;
        self.store
            .save_rule(&rule)
            .with_context(|| format!("Failed to save rule {id}"))?;

        Ok(ToggleOutcome::Toggled {
            id,
            name: rule.path.display().to_string(),
            enabled: rule.enabled,
        })
    }
}
