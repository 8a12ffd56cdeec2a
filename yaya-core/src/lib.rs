//! YAYA library exports
//!
//! Curation and scan orchestration for open source YARA rulesets: a SQLite
//! catalog of rulesets and rules, git working copies kept in sync with their
//! upstreams, and a compile/scan/aggregate pipeline over the enabled rules.

pub mod app;
pub mod catalog;
pub mod config;
pub mod discovery;
pub mod editor;
pub mod engine;
pub mod error;
pub mod export;
pub mod model;
pub mod scan;
pub mod store;
pub mod sync;
pub mod vcs;

pub use app::{AddSummary, UpdateOptions, UpdateSummary, Yaya};
pub use config::{YayaConfig, YayaPaths};
pub use editor::{EditCommand, EditTarget, ToggleOutcome};
pub use error::YayaError;
pub use scan::{ScanOutcome, ScanReport, ScanSummary};
