use crate::command::{CommandError, CommandSpec, Runner};
use crate::config::Config;
use crate::package::naming::Identity;
use crate::platform::{Family, Platform};
use crate::source;
use crate::store::paths::get_file_paths;
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{info, warn};

/// `gh release view` diagnostic for a tag without a release.
pub const RELEASE_NOT_FOUND: &str = "release not found";

/// Reference new releases point at when nothing else is known.
pub const DEFAULT_TARGET_REF: &str = "main";

#[derive(thiserror::Error, Debug)]
pub enum ReleaseError {
    #[error("no release artifact matching `{pattern}` in {}", .dir.display())]
    NoArtifact { dir: PathBuf, pattern: &'static str },

    #[error("no remote repository configured (set GITHUB_REPOSITORY or --repository)")]
    MissingRepository,
}

/// Glob-style description of the artifact each family publishes.
pub fn artifact_pattern(family: Family) -> &'static str {
    match family {
        Family::Rpm => "*.rpm",
        Family::Deb => "*-clang_*.tar.xz",
    }
}

fn is_candidate(path: &Path, family: Family) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };

    match family {
        Family::Rpm => name.ends_with(".rpm"),
        Family::Deb => name.ends_with(".tar.xz") && name.contains("-clang_"),
    }
}

/// Picks the artifact to publish from `dist`. The newest file wins, ties are
/// broken by name.
pub fn find_artifact(dist: &Path, family: Family) -> Result<PathBuf, ReleaseError> {
    let no_artifact = || ReleaseError::NoArtifact {
        dir: dist.to_path_buf(),
        pattern: artifact_pattern(family),
    };

    let files = get_file_paths(dist, Some(1)).map_err(|_| no_artifact())?;

    let mut candidates: Vec<(SystemTime, PathBuf)> = files
        .into_iter()
        .filter(|path| is_candidate(path, family))
        .map(|path| {
            let modified = path
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);

            (modified, path)
        })
        .collect();

    candidates.sort();

    let Some((_, chosen)) = candidates.pop() else {
        return Err(no_artifact());
    };

    if !candidates.is_empty() {
        let others: Vec<String> = candidates
            .iter()
            .map(|(_, path)| path.display().to_string())
            .collect();

        warn!(
            "release: several artifacts in {}, using {} (ignoring {})",
            dist.display(),
            chosen.display(),
            others.join(", ")
        );
    }

    Ok(chosen)
}

/// Metadata of a release to create.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Release {
    pub tag: String,
    pub target: String,
    pub title: String,
    pub notes: String,
}

impl Release {
    pub fn new(identity: &Identity, target: impl Into<String>) -> Self {
        Self {
            tag: identity.tag(),
            target: target.into(),
            title: identity.title(),
            notes: identity.title(),
        }
    }
}

/// Remote collection of tagged releases with attached files.
#[async_trait]
pub trait ReleaseStore: Send + Sync {
    async fn exists(&self, tag: &str) -> Result<bool>;

    /// Creates `release` with `asset` attached.
    async fn create(&self, release: &Release, asset: &Path) -> Result<()>;

    /// Attaches `asset` to an existing release, replacing a same-named file.
    async fn upload(&self, tag: &str, asset: &Path) -> Result<()>;
}

/// Release store backed by the `gh` command line client.
pub struct GhReleaseStore<'a> {
    runner: &'a dyn Runner,
    repository: String,
}

impl<'a> GhReleaseStore<'a> {
    pub fn new(runner: &'a dyn Runner, repository: impl Into<String>) -> Self {
        Self {
            runner,
            repository: repository.into(),
        }
    }

    fn gh(&self, subcommand: &str, tag: &str) -> CommandSpec {
        CommandSpec::new("gh")
            .args(["release", subcommand, tag])
            .arg("--repo")
            .arg(&self.repository)
    }
}

#[async_trait]
impl ReleaseStore for GhReleaseStore<'_> {
    async fn exists(&self, tag: &str) -> Result<bool> {
        let spec = self.gh("view", tag).args(["--json", "tagName"]).capture();
        let output = self.runner.run(&spec).await?;

        if output.success() {
            return Ok(true);
        }

        if output.stderr.contains(RELEASE_NOT_FOUND) {
            return Ok(false);
        }

        let err = CommandError {
            program: spec.name(),
            code: output.code,
        };

        Err(anyhow::Error::new(err).context(format!(
            "failed to look up release {}: {}",
            tag,
            output.stderr.trim()
        )))
    }

    async fn create(&self, release: &Release, asset: &Path) -> Result<()> {
        let spec = self
            .gh("create", &release.tag)
            .arg("--target")
            .arg(&release.target)
            .arg("--title")
            .arg(&release.title)
            .arg("--notes")
            .arg(&release.notes)
            .arg(asset);

        self.runner.run_checked(&spec).await?;

        Ok(())
    }

    async fn upload(&self, tag: &str, asset: &Path) -> Result<()> {
        let spec = self.gh("upload", tag).arg("--clobber").arg(asset);

        self.runner.run_checked(&spec).await?;

        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
}

pub fn target_ref(config: &Config) -> String {
    config
        .target_ref
        .clone()
        .or_else(|| source::current_branch(config.layout.root()))
        .unwrap_or_else(|| DEFAULT_TARGET_REF.to_string())
}

/// Publishes the artifact in `dist/` under the tag derived from the installed
/// toolchain, creating the release when the tag is new.
pub async fn publish(
    config: &Config,
    platform: &Platform,
    runner: &dyn Runner,
    store: Option<&dyn ReleaseStore>,
) -> Result<Outcome> {
    let artifact = find_artifact(&config.layout.dist_path(), platform.family)?;

    let store = store.ok_or(ReleaseError::MissingRepository)?;

    let identity = Identity::resolve(config, runner).await?;
    let release = Release::new(&identity, target_ref(config));

    if store.exists(&release.tag).await? {
        info!("release: {} exists, uploading {}", release.tag, artifact.display());

        store.upload(&release.tag, &artifact).await?;

        return Ok(Outcome::Updated);
    }

    info!(
        "release: creating {} on {} with {}",
        release.tag,
        release.target,
        artifact.display()
    );

    store.create(&release, &artifact).await?;

    Ok(Outcome::Created)
}
