use crate::command::{CommandSpec, Runner};
use crate::config::Config;
use crate::store::Layout;
use anyhow::{Context, Result};
use git2::Repository;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::{create_dir_all, write};
use tracing::info;

pub const KERNEL_UPSTREAM: &str =
    "https://git.kernel.org/pub/scm/linux/kernel/git/stable/linux.git";

pub const KERNEL_BRANCH: &str = "linux-6.6.y";

pub const KERNEL_BUILDER: &str = "build-kernel.py";

/// Mirror of one upstream branch. Never carries more than the branch tip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KernelSource {
    pub upstream: String,
    pub branch: String,
    pub path: PathBuf,
}

impl KernelSource {
    pub fn new(layout: &Layout) -> Self {
        Self {
            upstream: KERNEL_UPSTREAM.to_string(),
            branch: KERNEL_BRANCH.to_string(),
            path: layout.source_path().join(KERNEL_BRANCH),
        }
    }

    pub fn exists(&self) -> bool {
        Repository::open(&self.path).is_ok()
    }

    /// Git invocations that bring the tree to the branch tip.
    pub fn sync_commands(&self) -> Vec<CommandSpec> {
        if self.exists() {
            vec![
                CommandSpec::new("git")
                    .arg("-C")
                    .arg(&self.path)
                    .args(["fetch", "--depth=1", "origin", self.branch.as_str()]),
                CommandSpec::new("git")
                    .arg("-C")
                    .arg(&self.path)
                    .args(["reset", "--hard", "FETCH_HEAD"]),
            ]
        } else {
            vec![CommandSpec::new("git")
                .args(["clone", "--depth=1", "--single-branch", "--branch"])
                .arg(&self.branch)
                .arg(&self.upstream)
                .arg(&self.path)]
        }
    }

    pub async fn sync(&self, runner: &dyn Runner) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            create_dir_all(parent).await?;
        }

        info!("kernel: syncing {} into {}", self.branch, self.path.display());

        for command in self.sync_commands() {
            runner.run_checked(&command).await?;
        }

        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct KernelMatrix {
    pub configs: Vec<String>,
    pub targets: Vec<String>,
}

/// Handoff document read by the external kernel builder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct KernelBuildRequest {
    pub build_folder: PathBuf,
    pub source_folder: PathBuf,
    pub matrix: KernelMatrix,
    pub toolchain_prefix: PathBuf,
}

impl KernelBuildRequest {
    pub fn new(layout: &Layout, source: &KernelSource) -> Self {
        Self {
            build_folder: layout.build_path().join("linux"),
            source_folder: source.path.clone(),
            matrix: KernelMatrix {
                configs: vec!["defconfig".to_string()],
                targets: vec!["X86".to_string()],
            },
            toolchain_prefix: layout.install_path(),
        }
    }
}

pub fn request_path(layout: &Layout) -> PathBuf {
    layout.build_path().join("kernel-build.json")
}

pub fn build_command(layout: &Layout, request_file: &Path) -> CommandSpec {
    CommandSpec::new(layout.builders_path().join(KERNEL_BUILDER))
        .current_dir(layout.root())
        .arg("--config")
        .arg(request_file)
}

/// Syncs the kernel tree and builds it with the installed toolchain.
pub async fn build(config: &Config, runner: &dyn Runner) -> Result<()> {
    let layout = &config.layout;
    let source = KernelSource::new(layout);

    source.sync(runner).await?;

    let request = KernelBuildRequest::new(layout, &source);
    let request_file = request_path(layout);

    if let Some(parent) = request_file.parent() {
        create_dir_all(parent).await?;
    }

    let request_data = serde_json::to_vec_pretty(&request)?;

    write(&request_file, request_data)
        .await
        .with_context(|| format!("failed to write {}", request_file.display()))?;

    info!("kernel: building with {}", request_file.display());

    runner
        .run_checked(&build_command(layout, &request_file))
        .await?;

    Ok(())
}
