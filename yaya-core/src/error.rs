//! Error types for the catalog, working copies and the matching engine
//!
//! Typed errors live at the seams (store, VCS, engine). Operation-level code
//! wraps them in `anyhow` with context, the same way the rest of the crate
//! reports failures.

use std::path::PathBuf;
use thiserror::Error;

/// Catalog persistence errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying SQLite failure
    #[error("catalog database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The catalog directory could not be created
    #[error("Failed to create catalog directory: {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No ruleset with the given id
    #[error("Ruleset {0} not found")]
    RulesetNotFound(i64),

    /// No rule with the given id
    #[error("Rule {0} not found")]
    RuleNotFound(i64),
}

impl StoreError {
    /// Whether this error only means "no such record"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::RulesetNotFound(_) | StoreError::RuleNotFound(_)
        )
    }
}

/// Version control failures for a single working copy
#[derive(Error, Debug)]
pub enum VcsError {
    #[error("git clone of {url} failed: {message}")]
    Clone { url: String, message: String },

    #[error("git pull in {path} failed: {message}")]
    Pull { path: PathBuf, message: String },
}

/// Matching engine failures
#[derive(Error, Debug)]
pub enum EngineError {
    /// Rule source did not compile
    #[error("Compilation failed for namespace '{namespace}': {message}")]
    Compile { namespace: String, message: String },

    /// A file could not be scanned
    #[error("Failed to scan {path}: {message}")]
    Scan { path: PathBuf, message: String },

    /// Compiled rules could not be serialized
    #[error("Failed to serialize compiled rules: {0}")]
    Serialize(String),

    /// No backend was compiled into this build
    #[error("Matching engine is not available. Rebuild with --features yara")]
    Unavailable,
}

/// User-facing errors raised by YAYA operations
#[derive(Error, Debug)]
pub enum YayaError {
    /// An edit identifier was not numeric
    #[error("Invalid identifier '{0}': expected a numeric id")]
    InvalidIdentifier(String),

    /// `add` was given something that is not a repository
    #[error("Invalid ruleset source '{0}': expected a git repository ending in .git")]
    InvalidSource(String),

    /// The curated index could not be fetched
    #[error("Failed to fetch source index from {url}: {message}")]
    RemoteFetch { url: String, message: String },

    /// The scan target does not exist
    #[error("Scan target does not exist: {0}")]
    MissingTarget(PathBuf),
}
