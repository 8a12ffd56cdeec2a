//! Catalog schema and migrations, tracked with `PRAGMA user_version`.

use rusqlite::Connection;
use tracing::debug;

use crate::error::StoreError;

/// V001: rulesets and the rule files they own.
///
/// Ids use AUTOINCREMENT so a row id is never handed out twice; rule
/// namespaces embed the id and must stay stable.
pub const V001_INITIAL: &str = r#"
CREATE TABLE IF NOT EXISTS rulesets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    url TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS rules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ruleset_id INTEGER NOT NULL REFERENCES rulesets(id) ON DELETE CASCADE,
    path TEXT NOT NULL,
    namespace TEXT UNIQUE,
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(ruleset_id, path)
);

CREATE INDEX IF NOT EXISTS idx_rules_ruleset ON rules(ruleset_id);
CREATE INDEX IF NOT EXISTS idx_rulesets_enabled ON rulesets(enabled);
"#;

const MIGRATIONS: &[&str] = &[V001_INITIAL];

/// Apply connection pragmas and bring the schema up to date.
pub fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    for (index, sql) in MIGRATIONS.iter().enumerate() {
        let version = index as i64 + 1;
        if version <= current {
            continue;
        }
        debug!("Applying catalog migration v{:03}", version);
        conn.execute_batch(sql)?;
        conn.pragma_update(None, "user_version", version)?;
    }

    Ok(())
}

/// Latest schema version known to this build
pub fn latest_version() -> i64 {
    MIGRATIONS.len() as i64
}
