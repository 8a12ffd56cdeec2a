//! `add` and `update` against real local git repositories

mod common;

use anyhow::Result;
use common::FakeEngine;
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use yaya_core::vcs::GitClient;
use yaya_core::{UpdateOptions, Yaya, YayaConfig, YayaPaths};

fn commit_files(repo: &git2::Repository, files: &[(&str, &str)]) {
    let workdir = repo.workdir().unwrap().to_path_buf();
    let mut index = repo.index().unwrap();
    for (name, content) in files {
        let path = workdir.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        index.add_path(Path::new(name)).unwrap();
    }
    index.write().unwrap();

    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = git2::Signature::now("yaya", "yaya@localhost").unwrap();
    let parent = repo.head().ok().map(|h| h.peel_to_commit().unwrap());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, "rules", &tree, &parents)
        .unwrap();
}

#[tokio::test]
async fn test_add_local_repository_then_update_pulls_new_rules() -> Result<()> {
    common::init_test_logging();
    let temp_dir = TempDir::new()?;

    let upstream_dir = temp_dir.path().join("bar.git");
    let upstream = git2::Repository::init(&upstream_dir)?;
    commit_files(
        &upstream,
        &[
            ("rules/one.yar", "rule one ONE"),
            ("rules/broken.yar", "BROKEN"),
        ],
    );

    let config = YayaConfig {
        concurrency: 1,
        ..YayaConfig::default()
    };
    let yaya = Yaya::with_backends(
        YayaPaths::from_root(temp_dir.path().join("home")),
        config,
        Arc::new(GitClient::new()),
        Arc::new(FakeEngine),
    )?;

    let source = upstream_dir.display().to_string();
    let added = yaya.add(&source).await?;

    assert_eq!(added.ruleset.name, "bar");
    assert_eq!(added.sync.cloned, vec!["bar"]);
    assert_eq!(added.discovery.rules_found, 2);
    assert_eq!(added.discovery.rules_disabled, 1);
    assert!(yaya.paths().rulesets.join("bar").join(".git").is_dir());

    commit_files(&upstream, &[("rules/two.yar", "rule two TWO")]);
    let updated = yaya.update(UpdateOptions { fetch_index: false }).await?;

    assert_eq!(updated.sync.pulled, vec!["bar"]);
    assert_eq!(updated.discovery.rules_found, 3);

    let enabled: Vec<String> = yaya
        .store()
        .find_enabled_rules_for_ruleset(added.ruleset.id)?
        .iter()
        .map(|r| r.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(enabled, vec!["one.yar", "two.yar"]);
    Ok(())
}
