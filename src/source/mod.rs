use anyhow::{anyhow, Context, Result};
use git2::Repository;
use std::path::Path;

/// Abbreviated id of the commit checked out in the tree at `path`.
pub fn short_revision(path: &Path) -> Result<String> {
    let repo = Repository::open(path)
        .with_context(|| format!("source tree not found: {}", path.display()))?;

    let commit = repo.head()?.peel_to_commit()?;
    let short_id = commit.as_object().short_id()?;

    short_id
        .as_str()
        .map(|id| id.to_string())
        .ok_or_else(|| anyhow!("invalid revision in {}", path.display()))
}

/// Name of the branch checked out at `path`, `None` when detached or not a
/// repository.
pub fn current_branch(path: &Path) -> Option<String> {
    let repo = Repository::open(path).ok()?;
    let head = repo.head().ok()?;

    if !head.is_branch() {
        return None;
    }

    head.shorthand().map(|name| name.to_string())
}

#[cfg(test)]
pub mod testing {
    use git2::{Repository, Signature};
    use std::path::Path;

    /// Creates a repository at `path` with one commit on `branch`, returning
    /// the full commit id.
    pub fn init_repo(path: &Path, branch: &str) -> String {
        let repo = Repository::init(path).unwrap();
        let signature = Signature::now("Builder", "builder@example.com").unwrap();

        std::fs::write(path.join("README"), "toolchain\n").unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(Path::new("README")).unwrap();
        index.write().unwrap();

        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();

        let reference = format!("refs/heads/{}", branch);

        let commit = repo
            .commit(
                Some(&reference),
                &signature,
                &signature,
                "initial",
                &tree,
                &[],
            )
            .unwrap();

        repo.set_head(&reference).unwrap();

        commit.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::init_repo;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn short_revision_prefixes_head() {
        let tmp = TempDir::new().unwrap();
        let full = init_repo(tmp.path(), "main");

        let short = short_revision(tmp.path()).unwrap();

        assert!(short.len() >= 7);
        assert!(full.starts_with(&short));
    }

    #[test]
    fn short_revision_requires_repository() {
        let tmp = TempDir::new().unwrap();

        assert!(short_revision(tmp.path()).is_err());
    }

    #[test]
    fn branch_lookup() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path(), "release/18");

        assert_eq!(current_branch(tmp.path()), Some("release/18".to_string()));
        assert_eq!(current_branch(&tmp.path().join("missing")), None);
    }
}
