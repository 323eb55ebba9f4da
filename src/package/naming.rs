use crate::command::Runner;
use crate::config::Config;
use crate::platform::Family;
use crate::source;
use crate::toolchain;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Label used when no OS-release descriptor exists.
pub const GENERIC_DISTRO: &str = "linux";

pub const OS_RELEASE_PATHS: &[&str] = &["/etc/os-release", "/usr/lib/os-release"];

/// Fields of an os-release(5) descriptor used for naming.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OsRelease {
    pub id: Option<String>,
    pub version_id: Option<String>,
    pub codename: Option<String>,
}

impl OsRelease {
    pub fn parse(content: &str) -> Self {
        let mut fields = HashMap::new();

        for line in content.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };

            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');

            if !value.is_empty() {
                fields.insert(key.trim().to_string(), value.to_string());
            }
        }

        Self {
            id: fields.remove("ID"),
            version_id: fields.remove("VERSION_ID"),
            codename: fields.remove("VERSION_CODENAME"),
        }
    }

    /// Reads the descriptor at `explicit`, or the first standard location
    /// that exists. `Ok(None)` when there is no descriptor at all.
    pub fn load(explicit: Option<&Path>) -> Result<Option<Self>> {
        let candidates: Vec<PathBuf> = match explicit {
            Some(path) => vec![path.to_path_buf()],
            None => OS_RELEASE_PATHS.iter().map(PathBuf::from).collect(),
        };

        for candidate in candidates {
            if !candidate.is_file() && explicit.is_none() {
                continue;
            }

            let content = std::fs::read_to_string(&candidate)
                .with_context(|| format!("failed to read {}", candidate.display()))?;

            return Ok(Some(Self::parse(&content)));
        }

        Ok(None)
    }

    /// Distro label: the codename when set, otherwise the id. Rpm hosts get
    /// the numeric version appended to the id.
    pub fn distro(&self, family: Family) -> String {
        if let Some(codename) = &self.codename {
            return codename.clone();
        }

        let Some(id) = &self.id else {
            return GENERIC_DISTRO.to_string();
        };

        match (family, &self.version_id) {
            (Family::Rpm, Some(version)) => {
                let numeric: String = version
                    .chars()
                    .filter(|c| c.is_ascii_digit() || *c == '.')
                    .collect();

                format!("{}{}", id, numeric)
            }
            _ => id.clone(),
        }
    }
}

pub fn distro(release: Option<&OsRelease>, family: Family) -> String {
    release
        .map(|r| r.distro(family))
        .unwrap_or_else(|| GENERIC_DISTRO.to_string())
}

/// Vendor, compiler version and source revision of one toolchain build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub vendor: String,
    pub version: String,
    pub revision: String,
}

impl Identity {
    /// Queries the installed compiler and the toolchain source tree.
    pub async fn resolve(config: &Config, runner: &dyn Runner) -> Result<Self> {
        let layout = &config.layout;

        let revision = source::short_revision(&layout.llvm_source_path())?;
        let version = toolchain::installed_version(layout, runner).await?;

        Ok(Self {
            vendor: config.vendor.clone(),
            version,
            revision,
        })
    }

    pub fn tag(&self) -> String {
        format!("{}-{}", self.version, self.revision)
    }

    pub fn title(&self) -> String {
        format!("{} Clang {} ({})", self.vendor, self.version, self.revision)
    }

    pub fn package_name(&self) -> String {
        format!("{}-clang", self.vendor)
    }

    /// Version as rpm accepts it: `-` is reserved, a prerelease suffix sorts
    /// before the final release with `~`.
    pub fn rpm_version(&self) -> String {
        self.version.replace('-', "~")
    }
}

/// Name of one artifact. Fully determined by its fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactName {
    pub identity: Identity,
    pub distro: String,
    pub arch: String,
}

impl ArtifactName {
    pub fn new(identity: Identity, distro: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            identity,
            distro: distro.into(),
            arch: arch.into(),
        }
    }

    /// `<vendor>-clang_<version>-<distro>-<arch>-<revision>`
    pub fn stem(&self) -> String {
        format!(
            "{}_{}-{}-{}-{}",
            self.identity.package_name(),
            self.identity.version,
            self.distro,
            self.arch,
            self.identity.revision
        )
    }

    pub fn archive_file_name(&self) -> String {
        format!("{}.tar.xz", self.stem())
    }

    /// Value of the rpm `Release:` field.
    pub fn rpm_release(&self) -> String {
        format!("{}.{}", self.identity.revision, self.distro)
    }

    pub fn rpm_file_name(&self) -> String {
        format!(
            "{}-{}-{}.{}.rpm",
            self.identity.package_name(),
            self.identity.rpm_version(),
            self.rpm_release(),
            self.arch
        )
    }
}
