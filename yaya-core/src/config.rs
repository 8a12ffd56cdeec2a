//! YAYA home directory discovery and configuration
//!
//! Everything YAYA persists lives under a single per-user home:
//!
//! ```text
//! ~/.yaya/
//!     ├── yaya.db       ← ruleset and rule catalog (SQLite)
//!     ├── config.yaml   ← optional overrides (index URL, denylist, ...)
//!     └── rulesets/     ← one git working copy per ruleset
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding the home directory
pub const HOME_ENV_VAR: &str = "YAYA_HOME";

/// Curated list of YARA resources parsed for new rulesets
pub const DEFAULT_INDEX_URL: &str =
    "https://raw.githubusercontent.com/InQuest/awesome-yara/master/README.md";

/// Report file name placed in the temp directory by default
const REPORT_FILE_NAME: &str = "yaya.json";

const DATABASE_FILE: &str = "yaya.db";
const CONFIG_FILE: &str = "config.yaml";
const RULESETS_DIR: &str = "rulesets";

/// Resolved on-disk locations
#[derive(Debug, Clone)]
pub struct YayaPaths {
    /// Root directory (`~/.yaya` by default)
    pub root: PathBuf,
    /// SQLite catalog file
    pub database: PathBuf,
    /// Directory holding one working copy per ruleset
    pub rulesets: PathBuf,
    /// Optional YAML configuration
    pub config_file: PathBuf,
}

impl YayaPaths {
    /// Discover the home directory
    ///
    /// Resolution order:
    /// 1. CLI override (if provided)
    /// 2. `YAYA_HOME`
    /// 3. `~/.yaya`
    /// 4. Platform config directory (`directories`)
    pub fn discover(cli_override: Option<PathBuf>) -> Result<Self> {
        if let Some(root) = cli_override {
            debug!("Using --home override: {}", root.display());
            return Ok(Self::from_root(root));
        }

        if let Some(root) = std::env::var_os(HOME_ENV_VAR).filter(|v| !v.is_empty()) {
            debug!("Using {} override", HOME_ENV_VAR);
            return Ok(Self::from_root(PathBuf::from(root)));
        }

        let root = dirs::home_dir()
            .map(|home| home.join(".yaya"))
            .or_else(|| {
                directories::ProjectDirs::from("org", "eff", "yaya")
                    .map(|dirs| dirs.config_dir().to_path_buf())
            })
            .context("Could not determine a home directory for YAYA")?;

        Ok(Self::from_root(root))
    }

    /// Lay out all paths below a root directory
    pub fn from_root(root: PathBuf) -> Self {
        Self {
            database: root.join(DATABASE_FILE),
            rulesets: root.join(RULESETS_DIR),
            config_file: root.join(CONFIG_FILE),
            root,
        }
    }

    /// Create the root and rulesets directories
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.rulesets).with_context(|| {
            format!(
                "Failed to create rulesets directory: {}",
                self.rulesets.display()
            )
        })
    }
}

/// User-tunable settings, read from `config.yaml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "snake_case")]
pub struct YayaConfig {
    /// Document listing candidate rulesets (`https://` or `file://`)
    pub index_url: String,

    /// Repository URLs never imported from the index (oversized or duplicates)
    pub denylist: Vec<String>,

    /// Where `scan` writes its JSON report
    pub report_path: PathBuf,

    /// Upper bound on parallel clone/pull and per-ruleset scan workers
    pub concurrency: usize,

    /// Timeout for fetching the index
    pub http_timeout_secs: u64,
}

impl Default for YayaConfig {
    fn default() -> Self {
        Self {
            index_url: DEFAULT_INDEX_URL.to_string(),
            denylist: crate::catalog::DEFAULT_DENYLIST
                .iter()
                .map(|url| url.to_string())
                .collect(),
            report_path: std::env::temp_dir().join(REPORT_FILE_NAME),
            concurrency: default_concurrency(),
            http_timeout_secs: 30,
        }
    }
}

impl YayaConfig {
    /// Load configuration from the home directory, falling back to defaults
    pub fn load(paths: &YayaPaths) -> Result<Self> {
        Self::load_from_path(&paths.config_file)
    }

    /// Load configuration from a specific file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        let mut config: YayaConfig = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;

        if config.concurrency == 0 {
            config.concurrency = 1;
        }

        Ok(config)
    }

    /// Write the configuration back to disk
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_yaml_ng::to_string(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;

        Ok(())
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_from_root() {
        let paths = YayaPaths::from_root(PathBuf::from("/tmp/yaya-home"));
        assert_eq!(paths.database, PathBuf::from("/tmp/yaya-home/yaya.db"));
        assert_eq!(paths.rulesets, PathBuf::from("/tmp/yaya-home/rulesets"));
        assert_eq!(paths.config_file, PathBuf::from("/tmp/yaya-home/config.yaml"));
    }

    #[test]
    fn test_cli_override_wins() {
        let paths = YayaPaths::discover(Some(PathBuf::from("/opt/yaya"))).unwrap();
        assert_eq!(paths.root, PathBuf::from("/opt/yaya"));
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = YayaConfig::load_from_path(&temp_dir.path().join("config.yaml")).unwrap();
        assert_eq!(config, YayaConfig::default());
        assert_eq!(config.index_url, DEFAULT_INDEX_URL);
        assert!(config.concurrency >= 1);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "index_url: file:///srv/mirror/README.md\nconcurrency: 0\n",
        )
        .unwrap();

        let config = YayaConfig::load_from_path(&path).unwrap();
        assert_eq!(config.index_url, "file:///srv/mirror/README.md");
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.http_timeout_secs, 30);
        assert!(!config.denylist.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.yaml");

        let config = YayaConfig {
            denylist: vec!["https://github.com/x/huge.git".to_string()],
            ..YayaConfig::default()
        };
        config.save_to_path(&path).unwrap();

        let loaded = YayaConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.denylist, vec!["https://github.com/x/huge.git"]);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "concurrency: [not, a, number]\n").unwrap();

        let err = YayaConfig::load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }
}
