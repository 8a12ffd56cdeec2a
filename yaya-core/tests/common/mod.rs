//! Test helpers shared by the integration tests
//!
//! Provides a fake matching engine and a fake VCS client so catalog
//! lifecycle tests run without network access or a YARA backend.
//!
//! Fake rule format, one rule per line:
//!
//! ```text
//! rule <identifier> <needle>
//! ```
//!
//! A rule matches a file whose bytes contain `<needle>`. Any other non-blank
//! line, or the word `BROKEN` anywhere, fails compilation. Scanning a file
//! whose name contains `unscannable` fails.

#![allow(dead_code)]

use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once};
use tempfile::TempDir;
use walkdir::WalkDir;

use yaya_core::engine::{CompiledRules, MatchEngine, MatchRecord, RuleSource};
use yaya_core::error::{EngineError, VcsError};
use yaya_core::{Yaya, YayaConfig, YayaPaths};

/// Initialize logging for tests (only once per test run)
static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_level(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

// ----------------------------------------------------------------------
// Fake matching engine
// ----------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeEngine;

struct FakeRule {
    namespace: String,
    identifier: String,
    needle: Vec<u8>,
}

struct FakeCompiled {
    rules: Vec<FakeRule>,
}

impl MatchEngine for FakeEngine {
    fn compile(&self, sources: &[RuleSource]) -> Result<Box<dyn CompiledRules>, EngineError> {
        let mut rules = Vec::new();

        for source in sources {
            let compile_error = |message: &str| EngineError::Compile {
                namespace: source.namespace.clone(),
                message: message.to_string(),
            };

            if source.source.contains("BROKEN") {
                return Err(compile_error("syntax error"));
            }

            for line in source.source.lines().map(str::trim).filter(|l| !l.is_empty()) {
                let parts: Vec<&str> = line.split_whitespace().collect();
                match parts.as_slice() {
                    ["rule", identifier, needle] => rules.push(FakeRule {
                        namespace: source.namespace.clone(),
                        identifier: identifier.to_string(),
                        needle: needle.as_bytes().to_vec(),
                    }),
                    _ => return Err(compile_error(&format!("unexpected line: {line}"))),
                }
            }
        }

        Ok(Box::new(FakeCompiled { rules }))
    }
}

impl CompiledRules for FakeCompiled {
    fn scan_file(&self, path: &Path) -> Result<Vec<MatchRecord>, EngineError> {
        let unscannable = path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().contains("unscannable"));
        if unscannable {
            return Err(EngineError::Scan {
                path: path.to_path_buf(),
                message: "could not open file".to_string(),
            });
        }

        let bytes = std::fs::read(path).map_err(|e| EngineError::Scan {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok(self
            .rules
            .iter()
            .filter(|rule| bytes.windows(rule.needle.len()).any(|w| w == rule.needle))
            .map(|rule| MatchRecord {
                namespace: rule.namespace.clone(),
                rule: rule.identifier.clone(),
            })
            .collect())
    }

    fn serialize(&self) -> Result<Vec<u8>, EngineError> {
        Ok(self
            .rules
            .iter()
            .map(|r| format!("{}:{}\n", r.namespace, r.identifier))
            .collect::<String>()
            .into_bytes())
    }
}

// ----------------------------------------------------------------------
// Fake VCS client
// ----------------------------------------------------------------------

/// Clones by copying a registered upstream directory. Unknown URLs fail.
#[derive(Default)]
pub struct FakeVcs {
    upstreams: Mutex<HashMap<String, PathBuf>>,
    clones: Mutex<HashMap<PathBuf, String>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeVcs {
    pub fn register(&self, url: &str, upstream: &Path) {
        self.upstreams
            .lock()
            .unwrap()
            .insert(url.to_string(), upstream.to_path_buf());
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl yaya_core::vcs::VcsClient for FakeVcs {
    fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), VcsError> {
        self.calls.lock().unwrap().push(format!("clone {url}"));
        let upstream = self.upstreams.lock().unwrap().get(url).cloned();
        let Some(upstream) = upstream.filter(|dir| dir.is_dir()) else {
            return Err(VcsError::Clone {
                url: url.to_string(),
                message: "repository not found".to_string(),
            });
        };

        copy_tree(&upstream, dest);
        self.clones
            .lock()
            .unwrap()
            .insert(dest.to_path_buf(), url.to_string());
        Ok(())
    }

    fn pull(&self, dir: &Path) -> Result<(), VcsError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("pull {}", dir.display()));

        let url = self.clones.lock().unwrap().get(dir).cloned();
        let upstream = url.and_then(|url| self.upstreams.lock().unwrap().get(&url).cloned());
        if let Some(upstream) = upstream.filter(|path| path.is_dir()) {
            copy_tree(&upstream, dir);
        }
        Ok(())
    }
}

fn copy_tree(from: &Path, to: &Path) {
    for entry in WalkDir::new(from) {
        let entry = entry.unwrap();
        let target = to.join(entry.path().strip_prefix(from).unwrap());
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).unwrap();
        } else {
            std::fs::copy(entry.path(), &target).unwrap();
        }
    }
}

// ----------------------------------------------------------------------
// Fixtures
// ----------------------------------------------------------------------

/// Write an upstream repository fixture
pub fn write_upstream(root: &Path, name: &str, files: &[(&str, &str)]) -> PathBuf {
    let dir = root.join("upstreams").join(name);
    std::fs::create_dir_all(&dir).unwrap();
    for (relative, content) in files {
        let path = dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
    dir
}

/// A YAYA home in a temp dir wired to the fake backends
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub vcs: Arc<FakeVcs>,
    pub yaya: Yaya,
}

impl TestEnv {
    pub fn new() -> Result<Self> {
        Self::with_index("## Rules\n## Tools\n")
    }

    /// Home whose source index is a local file with `index` as content
    pub fn with_index(index: &str) -> Result<Self> {
        init_test_logging();

        let temp_dir = TempDir::new()?;
        let index_path = temp_dir.path().join("README.md");
        std::fs::write(&index_path, index)?;

        let config = YayaConfig {
            index_url: format!("file://{}", index_path.display()),
            report_path: temp_dir.path().join("report.json"),
            concurrency: 2,
            ..YayaConfig::default()
        };

        let paths = YayaPaths::from_root(temp_dir.path().join("home"));
        let vcs = Arc::new(FakeVcs::default());
        let yaya = Yaya::with_backends(paths, config, vcs.clone(), Arc::new(FakeEngine))?;

        Ok(Self {
            temp_dir,
            vcs,
            yaya,
        })
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Register a fake upstream and add it to the catalog as enabled
    pub async fn add_upstream(&self, name: &str, files: &[(&str, &str)]) -> Result<i64> {
        let upstream = write_upstream(self.root(), name, files);
        let url = format!("https://github.com/test/{name}.git");
        self.vcs.register(&url, &upstream);
        let summary = self.yaya.add(&url).await?;
        Ok(summary.ruleset.id)
    }

    /// Directory of files to scan
    pub fn scan_target(&self, files: &[(&str, &str)]) -> PathBuf {
        let dir = self.root().join("target");
        std::fs::create_dir_all(&dir).unwrap();
        for (name, content) in files {
            std::fs::write(dir.join(name), content).unwrap();
        }
        dir.canonicalize().unwrap()
    }
}
