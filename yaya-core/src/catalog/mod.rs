//! YAYA Catalog - ruleset sources
//!
//! Where rulesets come from before they land in the catalog store:
//!
//! ```text
//! defaults.rs (maintainer curated)      awesome-yara README (## Rules)
//!            │                                   │
//!            │                         SourceCatalogFetcher
//!            │                                   │
//!            └───────────► CatalogStore ◄────────┘
//!                  (upsert by name, last fetch wins)
//! ```

mod defaults;
mod fetcher;

pub use defaults::{default_rulesets, DEFAULT_DENYLIST};
pub use fetcher::{
    normalize_repository_url, parse_index, SourceCatalogFetcher, RULES_MARKER, TOOLS_MARKER,
};
