use crate::command::{CommandSpec, Runner};
use crate::config::Config;
use crate::platform::Platform;
use crate::store::Layout;
use anyhow::{anyhow, Result};
use std::thread::available_parallelism;
use tracing::info;

pub const LLVM_BUILDER: &str = "build-llvm.py";

pub const BINUTILS_BUILDER: &str = "build-binutils.py";

pub const LLVM_PROJECTS: &[&str] = &["clang", "lld", "compiler-rt"];

pub const LTO_MODE: &str = "thin";

/// Release flags: full optimization, no debug info.
pub const RELEASE_CFLAGS: &str = "-O3 -g0";

/// Ordered set of architecture names for one builder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetSet(Vec<String>);

impl TargetSet {
    fn with_native(baseline: &[&str], native: &str, platform: &Platform) -> Self {
        let mut set = Self(vec![]);

        for target in baseline {
            set.insert(target);
        }

        if platform.is_x86_64() {
            set.insert(native);
        }

        set
    }

    /// Spelling used by the LLVM build.
    pub fn llvm(platform: &Platform) -> Self {
        Self::with_native(&["AArch64", "ARM"], "X86", platform)
    }

    /// Spelling used by the binutils build.
    pub fn binutils(platform: &Platform) -> Self {
        Self::with_native(&["aarch64", "arm"], "x86_64", platform)
    }

    pub fn insert(&mut self, target: &str) {
        if !self.contains(target) {
            self.0.push(target.to_string());
        }
    }

    pub fn contains(&self, target: &str) -> bool {
        self.0.iter().any(|t| t == target)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// Job hint for compile and link steps: visible CPUs plus one.
pub fn jobs() -> usize {
    available_parallelism().map(|n| n.get()).unwrap_or(1) + 1
}

pub fn llvm_command(config: &Config, platform: &Platform, jobs: usize) -> CommandSpec {
    let layout = &config.layout;
    let targets = TargetSet::llvm(platform);

    let cache = if config.ci { "OFF" } else { "ON" };

    CommandSpec::new(layout.builders_path().join(LLVM_BUILDER))
        .current_dir(layout.root())
        .arg("--projects")
        .args(LLVM_PROJECTS)
        .arg("--targets")
        .args(targets.as_slice())
        .arg("--vendor-string")
        .arg(&config.vendor)
        .arg("--lto")
        .arg(LTO_MODE)
        .arg("--llvm-folder")
        .arg(layout.llvm_source_path())
        .arg("--build-folder")
        .arg(layout.build_path().join("llvm"))
        .arg("--install-folder")
        .arg(layout.install_path())
        .arg("--defines")
        .arg(format!("LLVM_PARALLEL_COMPILE_JOBS={}", jobs))
        .arg(format!("LLVM_PARALLEL_LINK_JOBS={}", jobs))
        .arg(format!("CMAKE_C_FLAGS={}", RELEASE_CFLAGS))
        .arg(format!("CMAKE_CXX_FLAGS={}", RELEASE_CFLAGS))
        .arg(format!("LLVM_CCACHE_BUILD={}", cache))
}

pub fn binutils_command(config: &Config, platform: &Platform) -> CommandSpec {
    let layout = &config.layout;
    let targets = TargetSet::binutils(platform);

    CommandSpec::new(layout.builders_path().join(BINUTILS_BUILDER))
        .current_dir(layout.root())
        .arg("--targets")
        .args(targets.as_slice())
        .arg("--install-folder")
        .arg(layout.install_path())
}

pub async fn build_llvm(config: &Config, platform: &Platform, runner: &dyn Runner) -> Result<()> {
    let jobs = jobs();

    info!(
        "llvm: targets {:?}, {} jobs",
        TargetSet::llvm(platform).as_slice(),
        jobs
    );

    runner
        .run_checked(&llvm_command(config, platform, jobs))
        .await?;

    Ok(())
}

pub async fn build_binutils(
    config: &Config,
    platform: &Platform,
    runner: &dyn Runner,
) -> Result<()> {
    info!(
        "binutils: targets {:?}",
        TargetSet::binutils(platform).as_slice()
    );

    runner.run_checked(&binutils_command(config, platform)).await?;

    Ok(())
}

/// Pulls the version out of `clang --version` output, e.g.
/// `acme clang version 18.0.0 (https://... abc1234)` yields `18.0.0`.
pub fn parse_version(output: &str) -> Option<String> {
    let first = output.lines().next()?;
    let mut words = first.split_whitespace();

    words.find(|w| *w == "version")?;

    words.next().map(|v| v.to_string())
}

/// Version reported by the installed compiler.
pub async fn installed_version(layout: &Layout, runner: &dyn Runner) -> Result<String> {
    let clang = layout.install_bin_path().join("clang");

    let output = runner
        .run_checked(&CommandSpec::new(&clang).arg("--version").capture())
        .await?;

    parse_version(&output.stdout)
        .ok_or_else(|| anyhow!("no version in `{} --version` output", clang.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::RecordingRunner;
    use crate::config::ConfigInputs;
    use crate::platform::Family;

    fn config(ci: bool) -> Config {
        Config::new(ConfigInputs {
            root: "/work".into(),
            ci,
            vendor: Some("acme".to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn x86_64_adds_native_target() {
        let platform = Platform::new(Family::Deb, "x86_64");

        assert_eq!(TargetSet::llvm(&platform).as_slice(), ["AArch64", "ARM", "X86"]);
        assert_eq!(
            TargetSet::binutils(&platform).as_slice(),
            ["aarch64", "arm", "x86_64"]
        );
    }

    #[test]
    fn other_arches_keep_baseline() {
        for arch in ["aarch64", "armv7l", "ppc64le", "i686"] {
            let platform = Platform::new(Family::Rpm, arch);

            assert_eq!(TargetSet::llvm(&platform).as_slice(), ["AArch64", "ARM"]);
            assert!(!TargetSet::binutils(&platform).contains("x86_64"));
        }
    }

    #[test]
    fn target_set_deduplicates() {
        let mut set = TargetSet::llvm(&Platform::new(Family::Deb, "aarch64"));
        set.insert("ARM");
        set.insert("RISCV");

        assert_eq!(set.as_slice(), ["AArch64", "ARM", "RISCV"]);
    }

    #[test]
    fn jobs_exceed_cpu_count() {
        assert!(jobs() >= 2);
    }

    #[test]
    fn llvm_arguments() {
        let platform = Platform::new(Family::Deb, "x86_64");
        let args = llvm_command(&config(false), &platform, 9).args_lossy();

        assert!(args.windows(2).any(|w| w == ["--vendor-string", "acme"]));
        assert!(args.windows(2).any(|w| w == ["--lto", "thin"]));
        assert!(args.contains(&"LLVM_PARALLEL_COMPILE_JOBS=9".to_string()));
        assert!(args.contains(&"LLVM_PARALLEL_LINK_JOBS=9".to_string()));
        assert!(args.contains(&"CMAKE_C_FLAGS=-O3 -g0".to_string()));
        assert!(args.contains(&"LLVM_CCACHE_BUILD=ON".to_string()));
        assert!(args.contains(&"X86".to_string()));
    }

    #[test]
    fn ci_disables_build_cache() {
        let platform = Platform::new(Family::Deb, "aarch64");
        let args = llvm_command(&config(true), &platform, 3).args_lossy();

        assert!(args.contains(&"LLVM_CCACHE_BUILD=OFF".to_string()));
        assert!(!args.contains(&"X86".to_string()));
    }

    #[test]
    fn binutils_arguments() {
        let platform = Platform::new(Family::Deb, "x86_64");
        let spec = binutils_command(&config(false), &platform);

        assert_eq!(spec.name(), BINUTILS_BUILDER);
        assert_eq!(
            spec.args_lossy(),
            [
                "--targets",
                "aarch64",
                "arm",
                "x86_64",
                "--install-folder",
                "/work/install"
            ]
        );
    }

    #[test]
    fn version_parsing() {
        assert_eq!(
            parse_version("acme clang version 18.0.0 (https://github.com/llvm/llvm-project abc1234)\nTarget: x86_64"),
            Some("18.0.0".to_string())
        );
        assert_eq!(
            parse_version("clang version 17.0.6git\n"),
            Some("17.0.6git".to_string())
        );
        assert_eq!(parse_version("garbage"), None);
        assert_eq!(parse_version(""), None);
    }

    #[tokio::test]
    async fn installed_version_queries_install_tree() {
        let runner = RecordingRunner::new().on("clang", 0, "clang version 18.0.0 (abc)\n");
        let layout = Layout::new("/work");

        let version = installed_version(&layout, &runner).await.unwrap();

        assert_eq!(version, "18.0.0");
        assert_eq!(
            runner.calls()[0].program,
            std::ffi::OsString::from("/work/install/bin/clang")
        );
        assert!(runner.calls()[0].capture);
    }

    #[tokio::test]
    async fn builder_failure_propagates() {
        let runner = RecordingRunner::new().on(LLVM_BUILDER, 1, "");
        let platform = Platform::new(Family::Deb, "x86_64");

        assert!(build_llvm(&config(false), &platform, &runner).await.is_err());
    }
}
