//! Catalog store - typed persistence for rulesets and rules
//!
//! A thin facade over a single SQLite connection. Every call is synchronous
//! and returns `StoreError` on failure; callers decide whether a failed write
//! is fatal or best effort.

mod schema;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::StoreError;
use crate::model::{Rule, Ruleset, RulesetDescriptor};

pub use schema::latest_version;

const RULESET_COLUMNS: &str = "id, name, url, description, enabled, created_at, updated_at";
const RULE_COLUMNS: &str = "id, ruleset_id, path, namespace, enabled, created_at, updated_at";

/// Persistent catalog of rulesets and rules
pub struct CatalogStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl CatalogStore {
    /// Open (or create) the catalog at `path` and run migrations
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        schema::run_migrations(&conn)?;
        debug!("Opened catalog at {}", path.display());

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory catalog (for testing)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        schema::run_migrations(&conn)?;
        Ok(Self { conn, path: None })
    }

    /// Database file path (None for in-memory)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // ------------------------------------------------------------------
    // Rulesets
    // ------------------------------------------------------------------

    /// Insert a ruleset, or overwrite url/description of the one with the
    /// same name. The enabled flag and id of an existing record are kept.
    pub fn upsert_ruleset_by_name(
        &self,
        descriptor: &RulesetDescriptor,
    ) -> Result<Ruleset, StoreError> {
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO rulesets (name, url, description, enabled, created_at, updated_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?4)
             ON CONFLICT(name) DO UPDATE SET
                url = excluded.url,
                description = excluded.description,
                updated_at = excluded.updated_at",
            params![descriptor.name, descriptor.url, descriptor.description, now],
        )?;

        self.find_ruleset_by_name(&descriptor.name)?
            .ok_or(StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    pub fn find_all_rulesets(&self) -> Result<Vec<Ruleset>, StoreError> {
        self.query_rulesets(&format!(
            "SELECT {RULESET_COLUMNS} FROM rulesets ORDER BY id"
        ))
    }

    pub fn find_enabled_rulesets(&self) -> Result<Vec<Ruleset>, StoreError> {
        self.query_rulesets(&format!(
            "SELECT {RULESET_COLUMNS} FROM rulesets WHERE enabled = 1 ORDER BY id"
        ))
    }

    pub fn find_ruleset_by_id(&self, id: i64) -> Result<Ruleset, StoreError> {
        self.conn
            .query_row(
                &format!("SELECT {RULESET_COLUMNS} FROM rulesets WHERE id = ?1"),
                params![id],
                ruleset_from_row,
            )
            .optional()?
            .ok_or(StoreError::RulesetNotFound(id))
    }

    pub fn find_ruleset_by_name(&self, name: &str) -> Result<Option<Ruleset>, StoreError> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {RULESET_COLUMNS} FROM rulesets WHERE name = ?1"),
                params![name],
                ruleset_from_row,
            )
            .optional()?)
    }

    /// Persist every mutable field of a ruleset
    pub fn save_ruleset(&self, ruleset: &Ruleset) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE rulesets SET url = ?1, description = ?2, enabled = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                ruleset.url,
                ruleset.description,
                ruleset.enabled,
                Utc::now(),
                ruleset.id
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::RulesetNotFound(ruleset.id));
        }
        Ok(())
    }

    /// Number of rulesets in the catalog
    pub fn count(&self) -> Result<i64, StoreError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM rulesets", [], |row| row.get(0))?)
    }

    // ------------------------------------------------------------------
    // Rules
    // ------------------------------------------------------------------

    /// Return the rule for `(path, ruleset_id)`, creating it on first sight.
    pub fn upsert_rule_by_path_and_ruleset(
        &self,
        path: &Path,
        ruleset_id: i64,
    ) -> Result<Rule, StoreError> {
        let path_text = path.to_string_lossy().into_owned();
        let now = Utc::now();

        self.conn.execute(
            "INSERT INTO rules (ruleset_id, path, enabled, created_at, updated_at)
             VALUES (?1, ?2, 1, ?3, ?3)
             ON CONFLICT(ruleset_id, path) DO NOTHING",
            params![ruleset_id, path_text, now],
        )?;

        Ok(self.conn.query_row(
            &format!("SELECT {RULE_COLUMNS} FROM rules WHERE ruleset_id = ?1 AND path = ?2"),
            params![ruleset_id, path_text],
            rule_from_row,
        )?)
    }

    /// Persist namespace and enabled flag of a rule
    pub fn save_rule(&self, rule: &Rule) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE rules SET namespace = ?1, enabled = ?2, updated_at = ?3 WHERE id = ?4",
            params![rule.namespace, rule.enabled, Utc::now(), rule.id],
        )?;

        if changed == 0 {
            return Err(StoreError::RuleNotFound(rule.id));
        }
        Ok(())
    }

    pub fn find_rule_by_id(&self, id: i64) -> Result<Rule, StoreError> {
        self.conn
            .query_row(
                &format!("SELECT {RULE_COLUMNS} FROM rules WHERE id = ?1"),
                params![id],
                rule_from_row,
            )
            .optional()?
            .ok_or(StoreError::RuleNotFound(id))
    }

    pub fn find_rules_for_ruleset(&self, ruleset_id: i64) -> Result<Vec<Rule>, StoreError> {
        self.query_rules(
            &format!("SELECT {RULE_COLUMNS} FROM rules WHERE ruleset_id = ?1 ORDER BY id"),
            ruleset_id,
        )
    }

    pub fn find_enabled_rules_for_ruleset(
        &self,
        ruleset_id: i64,
    ) -> Result<Vec<Rule>, StoreError> {
        self.query_rules(
            &format!(
                "SELECT {RULE_COLUMNS} FROM rules
                 WHERE ruleset_id = ?1 AND enabled = 1 ORDER BY id"
            ),
            ruleset_id,
        )
    }

    /// Number of rules across all rulesets
    pub fn count_rules(&self) -> Result<i64, StoreError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM rules", [], |row| row.get(0))?)
    }

    fn query_rulesets(&self, sql: &str) -> Result<Vec<Ruleset>, StoreError> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt.query_map([], ruleset_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn query_rules(&self, sql: &str, ruleset_id: i64) -> Result<Vec<Rule>, StoreError> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params![ruleset_id], rule_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn ruleset_from_row(row: &Row<'_>) -> rusqlite::Result<Ruleset> {
    Ok(Ruleset {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        description: row.get(3)?,
        enabled: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<Rule> {
    let path: String = row.get(2)?;
    Ok(Rule {
        id: row.get(0)?,
        ruleset_id: row.get(1)?,
        path: PathBuf::from(path),
        namespace: row.get(3)?,
        enabled: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}
