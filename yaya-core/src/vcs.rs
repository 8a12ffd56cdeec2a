//! Version control seam for ruleset working copies
//!
//! The synchronizer only needs two verbs, clone and pull. [`GitClient`] backs
//! them with libgit2; tests substitute their own [`VcsClient`].

use std::path::Path;
use tracing::debug;

use crate::error::VcsError;

/// Clone/pull operations on a working copy
pub trait VcsClient: Send + Sync {
    /// Clone `url` into `dest`, which must not exist yet
    fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), VcsError>;

    /// Bring the working copy in `dir` up to date with its default remote
    fn pull(&self, dir: &Path) -> Result<(), VcsError>;
}

/// libgit2-backed client
#[derive(Debug, Default, Clone)]
pub struct GitClient;

impl GitClient {
    pub fn new() -> Self {
        Self
    }

    fn fast_forward(dir: &Path) -> Result<(), git2::Error> {
        let repo = git2::Repository::open(dir)?;

        let mut remote = repo.find_remote("origin")?;
        remote.fetch(&[] as &[&str], None, None)?;

        let fetch_head = repo.find_reference("FETCH_HEAD")?;
        let fetch_commit = repo.reference_to_annotated_commit(&fetch_head)?;
        let (analysis, _) = repo.merge_analysis(&[&fetch_commit])?;

        if analysis.is_up_to_date() {
            debug!("{} is up to date", dir.display());
            return Ok(());
        }

        if !analysis.is_fast_forward() {
            return Err(git2::Error::from_str(
                "local history diverged from origin; refusing to merge",
            ));
        }

        let head = repo.head()?;
        let refname = head
            .name()
            .ok_or_else(|| git2::Error::from_str("HEAD is not a valid UTF-8 reference"))?
            .to_string();

        let mut reference = repo.find_reference(&refname)?;
        reference.set_target(fetch_commit.id(), "yaya: fast-forward")?;
        repo.set_head(&refname)?;
        repo.checkout_head(Some(git2::build::CheckoutBuilder::default().force()))?;

        debug!("Fast-forwarded {} to {}", dir.display(), fetch_commit.id());
        Ok(())
    }
}

impl VcsClient for GitClient {
    fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), VcsError> {
        match git2::Repository::clone(url, dest) {
            Ok(_) => Ok(()),
            Err(e) => {
                // A half-written clone would be mistaken for a working copy
                // on the next run.
                if dest.exists() {
                    let _ = std::fs::remove_dir_all(dest);
                }
                Err(VcsError::Clone {
                    url: url.to_string(),
                    message: e.message().to_string(),
                })
            }
        }
    }

    fn pull(&self, dir: &Path) -> Result<(), VcsError> {
        Self::fast_forward(dir).map_err(|e| VcsError::Pull {
            path: dir.to_path_buf(),
            message: e.message().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn commit_file(repo: &git2::Repository, name: &str, content: &str) {
        let workdir = repo.workdir().unwrap().to_path_buf();
        std::fs::write(workdir.join(name), content).unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("yaya", "yaya@localhost").unwrap();

        let parents: Vec<git2::Commit> = match repo.head() {
            Ok(head) => vec![head.peel_to_commit().unwrap()],
            Err(_) => Vec::new(),
        };
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, "update", &tree, &parent_refs)
            .unwrap();
    }

    #[test]
    fn test_clone_then_pull_picks_up_new_files() {
        let temp_dir = TempDir::new().unwrap();
        let upstream_dir = temp_dir.path().join("upstream");
        let upstream = git2::Repository::init(&upstream_dir).unwrap();
        commit_file(&upstream, "first.yar", "rule first { condition: true }");

        let client = GitClient::new();
        let working_copy = temp_dir.path().join("rulesets").join("upstream");
        client
            .clone_repo(upstream_dir.to_str().unwrap(), &working_copy)
            .unwrap();
        assert!(working_copy.join("first.yar").exists());

        commit_file(&upstream, "second.yar", "rule second { condition: true }");
        client.pull(&working_copy).unwrap();
        assert!(working_copy.join("second.yar").exists());

        // Nothing new upstream
        client.pull(&working_copy).unwrap();
    }

    #[test]
    fn test_failed_clone_leaves_no_directory() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("missing");

        let err = GitClient::new()
            .clone_repo(
                temp_dir.path().join("no-such-repo").to_str().unwrap(),
                &dest,
            )
            .unwrap_err();

        assert!(matches!(err, VcsError::Clone { .. }));
        assert!(!dest.exists());
    }

    #[test]
    fn test_pull_outside_repository_fails() {
        let temp_dir = TempDir::new().unwrap();
        let err = GitClient::new().pull(temp_dir.path()).unwrap_err();
        assert!(matches!(err, VcsError::Pull { .. }));
    }
}
