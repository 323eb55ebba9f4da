use crate::command::{CommandSpec, Runner};
use crate::config::Config;
use crate::platform::{Family, Platform};
use crate::store::{archives::compress_tar_xz, paths::get_file_paths, Layout};
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use tokio::fs::{remove_dir_all, remove_file};
use tracing::{info, warn};

pub mod inspect;
pub mod naming;
pub mod rpm;
pub mod upload;

use naming::{ArtifactName, Identity, OsRelease};

/// Extensions of static and libtool archives dropped from `lib/`.
pub const PRUNED_EXTENSIONS: &[&str] = &["a", "la"];

/// Deepest level below the install tree that gets an rpath.
pub const RPATH_MAX_DEPTH: usize = 3;

/// Removes headers and the top-level static archives of `lib/`. Archives
/// further down, like the compiler-rt runtimes, are linked by clang itself.
pub async fn prune(layout: &Layout) -> Result<()> {
    let include = layout.install_path().join("include");

    if include.is_dir() {
        info!("prune: {}", include.display());
        remove_dir_all(&include).await?;
    }

    let lib = layout.install_lib_path();

    if !lib.is_dir() {
        return Ok(());
    }

    let mut removed = 0;

    for path in get_file_paths(&lib, Some(1))? {
        let pruned = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| PRUNED_EXTENSIONS.contains(&ext));

        if pruned {
            remove_file(&path).await?;
            removed += 1;
        }
    }

    info!("prune: removed {} archives from {}", removed, lib.display());

    Ok(())
}

/// Strips every ELF file still carrying symbols. Failures are logged and
/// skipped.
pub async fn strip(install: &Path, runner: &dyn Runner) -> Result<()> {
    let mut stripped = 0;

    for path in get_file_paths(install, None)? {
        if !inspect::is_elf(&path) {
            continue;
        }

        let info = match inspect::describe(runner, &path).await {
            Ok(info) => info,
            Err(err) => {
                warn!("strip: {:#}", err);
                continue;
            }
        };

        if !info.has_debug_symbols() {
            continue;
        }

        let output = runner
            .run(&CommandSpec::new("strip").arg("-s").arg(&path))
            .await;

        match output {
            Ok(output) if output.success() => stripped += 1,
            Ok(output) => warn!("strip: {} exited with {:?}", path.display(), output.code),
            Err(err) => warn!("strip: {}: {:#}", path.display(), err),
        }
    }

    info!("strip: {} files", stripped);

    Ok(())
}

/// `$ORIGIN`-relative path from `relative`'s directory to `lib/`.
pub fn rpath_for(relative: &Path) -> String {
    let depth = relative.components().count().saturating_sub(1);

    format!("$ORIGIN/{}lib", "../".repeat(depth))
}

/// Points dynamically linked executables at the bundled `lib/`.
pub async fn patch_rpath(install: &Path, runner: &dyn Runner) -> Result<()> {
    for path in get_file_paths(install, Some(RPATH_MAX_DEPTH))? {
        if !inspect::is_elf(&path) {
            continue;
        }

        if !inspect::describe(runner, &path).await?.has_interpreter() {
            continue;
        }

        let relative = path.strip_prefix(install)?;
        let rpath = rpath_for(relative);

        info!("rpath: {} -> {}", relative.display(), rpath);

        runner
            .run_checked(
                &CommandSpec::new("patchelf")
                    .arg("--set-rpath")
                    .arg(&rpath)
                    .arg(&path),
            )
            .await?;
    }

    Ok(())
}

/// Prunes, strips and names the install tree, then produces the native
/// artifact in `dist/` and mirrors it to the upload endpoint.
pub async fn compress(config: &Config, platform: &Platform, runner: &dyn Runner) -> Result<PathBuf> {
    let layout = &config.layout;
    let install = layout.install_path();

    if !install.is_dir() {
        bail!("install tree not found: {}", install.display());
    }

    prune(layout).await?;
    strip(&install, runner).await?;

    if platform.family == Family::Deb {
        patch_rpath(&install, runner).await?;
    }

    let identity = Identity::resolve(config, runner).await?;
    let release = OsRelease::load(config.os_release.as_deref())?;
    let distro = naming::distro(release.as_ref(), platform.family);
    let name = ArtifactName::new(identity, distro, &platform.arch);

    let dist = layout.dist_path();

    let artifact = match platform.family {
        Family::Deb => {
            let artifact = dist.join(name.archive_file_name());

            info!("compress: {}", artifact.display());

            compress_tar_xz(&install, Path::new(&name.stem()), &artifact).await?;

            artifact
        }
        Family::Rpm => rpm::build(runner, &install, &dist, &name).await?,
    };

    match &config.upload_url {
        Some(url) => upload::mirror(url, std::slice::from_ref(&artifact)).await,
        None => info!("upload: skipped"),
    }

    Ok(artifact)
}
