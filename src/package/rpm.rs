use crate::command::{CommandSpec, Runner};
use crate::package::naming::ArtifactName;
use crate::store::{archives::compress_tar_gz, paths::get_file_paths, temps};
use anyhow::{bail, Context as _, Result};
use std::path::{Path, PathBuf};
use tera::{Context, Tera};
use tokio::fs::{copy, create_dir_all, remove_dir_all, remove_file, write};
use tracing::{info, warn};

/// Subdirectories of an rpmbuild `_topdir`.
pub const WORK_AREA_DIRS: &[&str] = &["BUILD", "BUILDROOT", "RPMS", "SOURCES", "SPECS", "SRPMS"];

/// Names other packages may depend on instead of the vendor package name.
pub const PROVIDES: &[&str] = &["clang", "lld", "llvm", "compiler-rt", "binutils"];

/// Auxiliary files installed with a spurious executable bit.
pub const NON_EXECUTABLE: &[&str] = &[
    "share/clang/bash-autocomplete.sh",
    "share/opt-viewer/style.css",
];

pub const INSTALL_ROOT: &str = "/opt";

const SPEC_TEMPLATE: &str = r#"%global debug_package %{nil}
%global _build_id_links none

Name:           {{ name }}
Version:        {{ version }}
Release:        {{ release }}
Summary:        {{ vendor }} Clang/LLVM toolchain
License:        Apache-2.0 WITH LLVM-exception
Source0:        {{ source }}
{% for component in provides %}Provides:       {{ component }}
{% endfor %}
%description
{{ title }}, with lld and binutils, installed under {{ prefix }}.

%prep
%setup -q -n {{ stem }}

%install
mkdir -p %{buildroot}{{ prefix }}
cp -a . %{buildroot}{{ prefix }}/
grep -rlZ --binary-files=without-match -e '^#!/usr/bin/env python$' %{buildroot}{{ prefix }} \
    | xargs -0 -r sed -i '1s|^#!/usr/bin/env python$|#!/usr/bin/python3|'
{% for file in non_executable %}if [ -f %{buildroot}{{ prefix }}/{{ file }} ]; then chmod a-x %{buildroot}{{ prefix }}/{{ file }}; fi
{% endfor %}
%files
{{ prefix }}
"#;

/// Install prefix of the packaged tree.
pub fn prefix(name: &ArtifactName) -> String {
    format!("{}/{}", INSTALL_ROOT, name.identity.package_name())
}

pub fn render_spec(name: &ArtifactName, source: &str) -> Result<String> {
    let mut context = Context::new();

    context.insert("name", &name.identity.package_name());
    context.insert("version", &name.identity.rpm_version());
    context.insert("release", &name.rpm_release());
    context.insert("vendor", &name.identity.vendor);
    context.insert("title", &name.identity.title());
    context.insert("source", source);
    context.insert("stem", &name.stem());
    context.insert("prefix", &prefix(name));
    context.insert("provides", PROVIDES);
    context.insert("non_executable", NON_EXECUTABLE);

    Tera::one_off(SPEC_TEMPLATE, &context, false).context("failed to render rpm spec")
}

pub fn rpmbuild_command(topdir: &Path, spec_path: &Path) -> CommandSpec {
    CommandSpec::new("rpmbuild")
        .arg("--define")
        .arg(format!("_topdir {}", topdir.display()))
        .arg("-bb")
        .arg(spec_path)
}

/// The single `.rpm` under `RPMS/`.
pub fn find_output(topdir: &Path) -> Result<PathBuf> {
    let outputs: Vec<PathBuf> = get_file_paths(topdir.join("RPMS"), None)?
        .into_iter()
        .filter(|path| path.extension().is_some_and(|ext| ext == "rpm"))
        .collect();

    match outputs.as_slice() {
        [output] => Ok(output.clone()),
        [] => bail!("rpmbuild produced no package"),
        _ => bail!("rpmbuild produced {} packages, expected one", outputs.len()),
    }
}

async fn move_file(from: &Path, to: &Path) -> Result<()> {
    // the work area usually lives on another filesystem
    copy(from, to)
        .await
        .with_context(|| format!("failed to copy {} to {}", from.display(), to.display()))?;

    remove_file(from).await?;

    Ok(())
}

/// Builds a native package of `install` and moves it into `dist`.
pub async fn build(
    runner: &dyn Runner,
    install: &Path,
    dist: &Path,
    name: &ArtifactName,
) -> Result<PathBuf> {
    let topdir = temps::create_dir().await?;

    for dir in WORK_AREA_DIRS {
        create_dir_all(topdir.join(dir)).await?;
    }

    let source_name = format!("{}.tar.gz", name.stem());
    let source_path = topdir.join("SOURCES").join(&source_name);

    info!("rpm: source tarball {}", source_path.display());

    compress_tar_gz(install, Path::new(&name.stem()), &source_path).await?;

    let spec_path = topdir
        .join("SPECS")
        .join(format!("{}.spec", name.identity.package_name()));

    write(&spec_path, render_spec(name, &source_name)?).await?;

    runner
        .run_checked(&rpmbuild_command(&topdir, &spec_path))
        .await?;

    let output = find_output(&topdir)?;

    let file_name = output
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(name.rpm_file_name()));

    let artifact = dist.join(file_name);

    move_file(&output, &artifact).await?;

    if let Err(err) = remove_dir_all(&topdir).await {
        warn!("rpm: failed to remove {}: {}", topdir.display(), err);
    }

    info!("rpm: {}", artifact.display());

    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::RecordingRunner;
    use crate::command::CommandOutput;
    use crate::package::naming::Identity;
    use tempfile::TempDir;

    fn name() -> ArtifactName {
        ArtifactName::new(
            Identity {
                vendor: "acme".to_string(),
                version: "18.0.0".to_string(),
                revision: "abc1234".to_string(),
            },
            "fedora39",
            "x86_64",
        )
    }

    #[test]
    fn spec_disables_debug_packages() {
        let spec = render_spec(&name(), "src.tar.gz").unwrap();

        assert!(spec.starts_with("%global debug_package %{nil}\n%global _build_id_links none\n"));
        assert!(spec.contains("Name:           acme-clang\n"));
        assert!(spec.contains("Release:        abc1234.fedora39\n"));
        assert!(spec.contains("Source0:        src.tar.gz\n"));
        assert!(spec.contains("%setup -q -n acme-clang_18.0.0-fedora39-x86_64-abc1234\n"));
    }

    #[test]
    fn spec_version_accepts_prerelease() {
        let mut name = name();
        name.identity.version = "19.1.0-rc1".to_string();

        let spec = render_spec(&name, "src.tar.gz").unwrap();

        assert!(spec.contains("Version:        19.1.0~rc1\n"));
        assert!(spec.contains("%setup -q -n acme-clang_19.1.0-rc1-fedora39-x86_64-abc1234\n"));
    }

    #[test]
    fn spec_provides_components() {
        let spec = render_spec(&name(), "src.tar.gz").unwrap();

        for component in PROVIDES {
            assert!(spec.contains(&format!("Provides:       {}\n", component)));
        }
    }

    #[test]
    fn spec_installs_under_prefix() {
        let spec = render_spec(&name(), "src.tar.gz").unwrap();

        assert!(spec.contains("cp -a . %{buildroot}/opt/acme-clang/\n"));
        assert!(spec.contains("#!/usr/bin/python3"));
        assert!(spec.contains("chmod a-x %{buildroot}/opt/acme-clang/share/clang/bash-autocomplete.sh"));
        assert!(spec.contains("chmod a-x %{buildroot}/opt/acme-clang/share/opt-viewer/style.css"));
        assert!(spec.trim_end().ends_with("%files\n/opt/acme-clang"));
    }

    #[test]
    fn output_must_be_unique() {
        let tmp = TempDir::new().unwrap();
        let rpms = tmp.path().join("RPMS/x86_64");
        std::fs::create_dir_all(&rpms).unwrap();

        assert!(find_output(tmp.path()).is_err());

        std::fs::write(rpms.join("a.rpm"), b"").unwrap();
        assert_eq!(find_output(tmp.path()).unwrap(), rpms.join("a.rpm"));

        std::fs::write(rpms.join("b.rpm"), b"").unwrap();
        assert!(find_output(tmp.path()).is_err());
    }

    #[tokio::test]
    async fn build_moves_package_into_dist() {
        let tmp = TempDir::new().unwrap();
        let install = tmp.path().join("install");
        let dist = tmp.path().join("dist");

        std::fs::create_dir_all(install.join("bin")).unwrap();
        std::fs::create_dir_all(&dist).unwrap();
        std::fs::write(install.join("bin/clang"), b"clang").unwrap();

        // stand in for rpmbuild by dropping its output into the work area
        let runner = RecordingRunner::new().respond(|spec| {
            if spec.name() != "rpmbuild" {
                return None;
            }

            let define = spec.args_lossy()[1].clone();
            let topdir = PathBuf::from(define.trim_start_matches("_topdir "));
            let arch_dir = topdir.join("RPMS/x86_64");

            std::fs::create_dir_all(&arch_dir).unwrap();
            std::fs::write(
                arch_dir.join("acme-clang-18.0.0-abc1234.fedora39.x86_64.rpm"),
                b"rpm",
            )
            .unwrap();

            Some(CommandOutput {
                code: Some(0),
                ..Default::default()
            })
        });

        let artifact = build(&runner, &install, &dist, &name()).await.unwrap();

        assert_eq!(artifact, dist.join(name().rpm_file_name()));
        assert!(artifact.is_file());

        let spec_path = PathBuf::from(runner.calls()[0].args_lossy()[3].clone());
        assert!(!spec_path.exists(), "work area is removed");
    }
}
