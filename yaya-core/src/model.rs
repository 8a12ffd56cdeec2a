//! Catalog records: rulesets and the rule files they own

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A candidate ruleset, before it has an id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesetDescriptor {
    pub name: String,
    pub url: String,
    pub description: String,
}

impl RulesetDescriptor {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            description: description.into(),
        }
    }
}

/// A named collection of YARA rules sourced from one repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ruleset {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub description: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ruleset {
    /// Human readable status used in listings
    pub fn status(&self) -> &'static str {
        if self.enabled {
            "enabled"
        } else {
            "disabled"
        }
    }

    /// Location of this ruleset's working copy below `root`
    pub fn working_copy_dir(&self, root: &Path) -> PathBuf {
        root.join(dir_name(&self.name, self.id))
    }
}

/// One rule file inside a ruleset's working copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: i64,
    pub ruleset_id: i64,
    pub path: PathBuf,
    /// Assigned by discovery; unique across the whole catalog
    pub namespace: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    pub fn status(&self) -> &'static str {
        if self.enabled {
            "enabled"
        } else {
            "disabled"
        }
    }
}

/// Directory name for a ruleset.
///
/// Plain names are used as they are. A name with a separator, a NUL or a
/// leading dot is rewritten to `.<id>-<name>` with those characters replaced.
/// Plain names never start with a dot and ids are unique, so no two rulesets
/// share a directory and none escapes the rulesets root.
pub fn dir_name(name: &str, id: i64) -> String {
    let needs_escape =
        name.is_empty() || name.starts_with('.') || name.contains(['/', '\\', '\0']);
    if !needs_escape {
        return name.to_string();
    }

    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    format!(".{id}-{replaced}")
}
