//! Source index fetching and parsing
//!
//! The index is a markdown document (awesome-yara's README by default). Only
//! the "Rules" section is read, as a fixed two-line record format: a link line
//! naming the repository, then one line of description.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::YayaConfig;
use crate::error::YayaError;
use crate::model::{Ruleset, RulesetDescriptor};
use crate::store::CatalogStore;

/// Line that opens the section listing rulesets
pub const RULES_MARKER: &str = "## Rules";

/// Line that ends the scan for candidates
pub const TOOLS_MARKER: &str = "## Tools";

static LINK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[(.+?)\]\((https://github\.com/[^)\s]+)\)")
        .expect("link pattern is a valid regex")
});

/// Fetches the curated index and turns it into ruleset candidates
pub struct SourceCatalogFetcher {
    client: reqwest::Client,
    index_url: String,
    denylist: Vec<String>,
}

impl SourceCatalogFetcher {
    pub fn new(config: &YayaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("yaya/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            index_url: config.index_url.clone(),
            denylist: config.denylist.clone(),
        })
    }

    pub fn index_url(&self) -> &str {
        &self.index_url
    }

    /// Fetch and parse the index. Any transport failure or non-success
    /// status is an error: an unreachable index never yields an empty list.
    pub async fn fetch(&self) -> Result<Vec<RulesetDescriptor>> {
        let content = self.fetch_document().await?;
        let candidates = parse_index(&content, &self.denylist);
        info!(
            "Found {} rulesets in index {}",
            candidates.len(),
            self.index_url
        );
        Ok(candidates)
    }

    /// Fetch the index and upsert every candidate into the catalog
    pub async fn fetch_and_upsert(&self, store: &CatalogStore) -> Result<Vec<Ruleset>> {
        let candidates = self.fetch().await?;

        let mut rulesets = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let ruleset = store
                .upsert_ruleset_by_name(candidate)
                .with_context(|| format!("Failed to record ruleset '{}'", candidate.name))?;
            debug!("Recorded ruleset {} ({})", ruleset.name, ruleset.id);
            rulesets.push(ruleset);
        }

        Ok(rulesets)
    }

    async fn fetch_document(&self) -> Result<String> {
        if let Some(path) = self.index_url.strip_prefix("file://") {
            debug!("Reading index from local mirror {}", path);
            return tokio::fs::read_to_string(path).await.map_err(|e| {
                YayaError::RemoteFetch {
                    url: self.index_url.clone(),
                    message: e.to_string(),
                }
                .into()
            });
        }

        let response = self
            .client
            .get(&self.index_url)
            .send()
            .await
            .map_err(|e| YayaError::RemoteFetch {
                url: self.index_url.clone(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(YayaError::RemoteFetch {
                url: self.index_url.clone(),
                message: format!("HTTP {}", response.status()),
            }
            .into());
        }

        response
            .text()
            .await
            .map_err(|e| {
                YayaError::RemoteFetch {
                    url: self.index_url.clone(),
                    message: e.to_string(),
                }
                .into()
            })
    }
}

/// Parse the index document into ruleset candidates.
///
/// Scanning starts at [`RULES_MARKER`] and stops for good at
/// [`TOOLS_MARKER`]. Inside the section, a line containing a GitHub link is a
/// record and the line after it is its description; anything else is prose
/// and skipped. Candidates on the denylist are dropped; a repeated name keeps
/// the last record.
pub fn parse_index(content: &str, denylist: &[String]) -> Vec<RulesetDescriptor> {
    let mut candidates: Vec<RulesetDescriptor> = Vec::new();
    let mut inside = false;
    let mut lines = content.lines();

    while let Some(line) = lines.next() {
        if line == TOOLS_MARKER {
            break;
        }
        if line == RULES_MARKER {
            inside = true;
            continue;
        }
        if !inside {
            continue;
        }

        let Some(captures) = LINK_PATTERN.captures(line) else {
            continue;
        };

        // Fixed record format: the description is always the next line.
        let description = lines.next().unwrap_or_default().trim().to_string();
        let name = captures[1].trim().to_string();
        let url = normalize_repository_url(&captures[2]);

        if denylist.iter().any(|denied| *denied == url) {
            debug!("Skipping denylisted ruleset {} ({})", name, url);
            continue;
        }

        let candidate = RulesetDescriptor {
            name,
            url,
            description,
        };
        match candidates.iter_mut().find(|c| c.name == candidate.name) {
            Some(existing) => *existing = candidate,
            None => candidates.push(candidate),
        }
    }

    candidates
}

/// Turn a repository browse link into a clone URL: drop `/tree/...`,
/// `/blob/...` and fragments, drop trailing slashes, append `.git`.
pub fn normalize_repository_url(url: &str) -> String {
    let mut url = url.trim();

    for marker in ["/tree/", "/blob/", "#"] {
        if let Some(index) = url.find(marker) {
            url = &url[..index];
        }
    }

    let url = url.trim_end_matches('/');
    if url.ends_with(".git") {
        url.to_string()
    } else {
        format!("{url}.git")
    }
}
