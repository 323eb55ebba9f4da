use crate::command::{CommandSpec, Runner};
use crate::config::Config;
use crate::platform::{Family, Platform};
use anyhow::Result;
use tracing::info;

const DEB_PACKAGES: &[&str] = &[
    "bc",
    "binutils",
    "bison",
    "ca-certificates",
    "ccache",
    "clang",
    "cmake",
    "cpio",
    "curl",
    "file",
    "flex",
    "g++",
    "gcc",
    "gh",
    "git",
    "libelf-dev",
    "libssl-dev",
    "libzstd-dev",
    "lld",
    "make",
    "ninja-build",
    "patchelf",
    "python3",
    "texinfo",
    "u-boot-tools",
    "xz-utils",
    "zlib1g-dev",
];

const RPM_PACKAGES: &[&str] = &[
    "bc",
    "binutils",
    "bison",
    "ca-certificates",
    "ccache",
    "clang",
    "cmake",
    "cpio",
    "curl",
    "elfutils-libelf-devel",
    "file",
    "flex",
    "gcc",
    "gcc-c++",
    "gh",
    "git",
    "libzstd-devel",
    "lld",
    "make",
    "ninja-build",
    "openssl-devel",
    "patchelf",
    "python3",
    "rpm-build",
    "texinfo",
    "uboot-tools",
    "xz",
    "zlib-devel",
];

pub fn packages(family: Family) -> &'static [&'static str] {
    match family {
        Family::Deb => DEB_PACKAGES,
        Family::Rpm => RPM_PACKAGES,
    }
}

/// Keeps `apt-get` from prompting. Passed as an assignment on the `sudo`
/// command line since `sudo` resets the environment.
pub const DEBIAN_FRONTEND: (&str, &str) = ("DEBIAN_FRONTEND", "noninteractive");

/// Package manager invocations for `family`, in order.
pub fn commands(family: Family, escalate: bool) -> Vec<CommandSpec> {
    let with_privileges = |program: &str, env: &[(&str, &str)]| {
        if escalate {
            CommandSpec::new("sudo")
                .args(env.iter().map(|(key, value)| format!("{}={}", key, value)))
                .arg(program)
        } else {
            env.iter()
                .fold(CommandSpec::new(program), |spec, (key, value)| spec.env(key, value))
        }
    };

    match family {
        Family::Deb => vec![
            with_privileges("apt-get", &[]).arg("update"),
            with_privileges("apt-get", &[DEBIAN_FRONTEND])
                .args(["install", "-y", "--no-install-recommends"])
                .args(packages(family)),
        ],
        Family::Rpm => vec![with_privileges("dnf", &[])
            .args(["install", "-y"])
            .args(packages(family))],
    }
}

/// Installs host packages. Only acts inside an automated build.
pub async fn install(config: &Config, platform: &Platform, runner: &dyn Runner) -> Result<()> {
    if !config.ci {
        info!("deps: not an automated build, skipping");
        return Ok(());
    }

    let escalate = !nix::unistd::geteuid().is_root();

    info!("deps: installing {} packages", platform.family);

    for command in commands(platform.family, escalate) {
        runner.run_checked(&command).await?;
    }

    Ok(())
}
