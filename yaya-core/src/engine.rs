//! Matching engine seam
//!
//! YAYA never interprets rule text itself. It hands namespaced sources to a
//! [`MatchEngine`], gets back [`CompiledRules`], and asks those to scan files.
//! The production backend is YARA-X (`yara` feature).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::EngineError;

/// One rule file's source, registered under its catalog namespace
#[derive(Debug, Clone)]
pub struct RuleSource {
    pub namespace: String,
    pub source: String,
    /// File the source was read from. Relative includes resolve against it.
    pub origin: PathBuf,
}

impl RuleSource {
    /// Read a rule file from disk. A file that is not valid UTF-8 is an
    /// `InvalidData` error.
    pub fn read(namespace: impl Into<String>, path: &Path) -> std::io::Result<Self> {
        let source = String::from_utf8(std::fs::read(path)?)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(Self {
            namespace: namespace.into(),
            source,
            origin: path.to_path_buf(),
        })
    }
}

/// A single rule hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Namespace the matching rule was registered under
    pub namespace: String,
    /// Rule identifier inside the source
    pub rule: String,
}

/// Compiles rule sources into an executable matcher
pub trait MatchEngine: Send + Sync {
    /// Compile all `sources` into one context, each under its own namespace.
    /// Any failing source fails the whole compilation.
    fn compile(&self, sources: &[RuleSource]) -> Result<Box<dyn CompiledRules>, EngineError>;
}

/// The output of [`MatchEngine::compile`]
pub trait CompiledRules: Send + Sync {
    /// Scan one file and return every matching rule
    fn scan_file(&self, path: &Path) -> Result<Vec<MatchRecord>, EngineError>;

    /// Serialize to the backend's precompiled artifact format
    fn serialize(&self) -> Result<Vec<u8>, EngineError>;
}

#[cfg(feature = "yara")]
mod yara {
    use super::*;

    /// YARA-X backend
    #[derive(Debug, Default, Clone)]
    pub struct YaraEngine;

    impl YaraEngine {
        pub fn new() -> Self {
            Self
        }
    }

    impl MatchEngine for YaraEngine {
        fn compile(
            &self,
            sources: &[RuleSource],
        ) -> Result<Box<dyn CompiledRules>, EngineError> {
            let mut compiler = yara_x::Compiler::new();

            for source in sources {
                let origin = source.origin.to_string_lossy();
                let code =
                    yara_x::SourceCode::from(source.source.as_str()).with_origin(origin.as_ref());

                compiler.new_namespace(&source.namespace);
                compiler
                    .add_source(code)
                    .map_err(|e| EngineError::Compile {
                        namespace: source.namespace.clone(),
                        message: e.to_string(),
                    })?;
            }

            Ok(Box::new(YaraRules {
                rules: compiler.build(),
            }))
        }
    }

    struct YaraRules {
        rules: yara_x::Rules,
    }

    impl CompiledRules for YaraRules {
        fn scan_file(&self, path: &Path) -> Result<Vec<MatchRecord>, EngineError> {
            let mut scanner = yara_x::Scanner::new(&self.rules);
            let results = scanner.scan_file(path).map_err(|e| EngineError::Scan {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

            Ok(results
                .matching_rules()
                .map(|rule| MatchRecord {
                    namespace: rule.namespace().to_string(),
                    rule: rule.identifier().to_string(),
                })
                .collect())
        }

        fn serialize(&self) -> Result<Vec<u8>, EngineError> {
            self.rules
                .serialize()
                .map_err(|e| EngineError::Serialize(e.to_string()))
        }
    }
}

#[cfg(not(feature = "yara"))]
mod yara {
    use super::*;

    /// Stub for when the yara feature is disabled
    #[derive(Debug, Default, Clone)]
    pub struct YaraEngine;

    impl YaraEngine {
        pub fn new() -> Self {
            Self
        }
    }

    impl MatchEngine for YaraEngine {
        fn compile(
            &self,
            _sources: &[RuleSource],
        ) -> Result<Box<dyn CompiledRules>, EngineError> {
            Err(EngineError::Unavailable)
        }
    }
}

pub use yara::YaraEngine;
