//! Maintainer-curated rulesets installed on first run, and sources that are
//! never imported from the index.

use crate::model::RulesetDescriptor;

/// (name, url, description)
const DEFAULT_RULESETS: &[(&str, &str, &str)] = &[
    (
        "Yara-Rules",
        "https://github.com/Yara-Rules/rules.git",
        "Community maintained repository of YARA signatures",
    ),
    (
        "signature-base",
        "https://github.com/Neo23x0/signature-base.git",
        "Signature base for LOKI and THOR scanners by Florian Roth",
    ),
    (
        "reversinglabs-yara-rules",
        "https://github.com/reversinglabs/reversinglabs-yara-rules.git",
        "ReversingLabs YARA rules for malware families",
    ),
    (
        "eset-malware-ioc",
        "https://github.com/eset/malware-ioc.git",
        "Indicators of compromise and YARA rules from ESET research",
    ),
    (
        "stalkerware-indicators",
        "https://github.com/AssoEchap/stalkerware-indicators.git",
        "Indicators of stalkerware apps, maintained with EFF",
    ),
];

/// Index entries dropped by exact URL: aggregates of other repositories, or
/// repositories already covered by the defaults.
pub const DEFAULT_DENYLIST: &[&str] = &[
    "https://github.com/mikesxrs/Open-Source-YARA-rules.git",
    "https://github.com/Neo23x0/signature-base.git",
    "https://github.com/Yara-Rules/rules.git",
];

/// Rulesets every fresh install starts with
pub fn default_rulesets() -> Vec<RulesetDescriptor> {
    DEFAULT_RULESETS
        .iter()
        .map(|(name, url, description)| RulesetDescriptor::new(*name, *url, *description))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_names_are_unique_git_urls() {
        let defaults = default_rulesets();
        let names: HashSet<_> = defaults.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names.len(), defaults.len());
        assert!(defaults.iter().all(|d| d.url.ends_with(".git")));
    }
}
