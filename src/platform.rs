use nix::sys::utsname::uname;
use std::env::consts::ARCH;
use std::ffi::OsStr;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Executable whose presence selects the rpm family.
pub const RPM_PROBE: &str = "dnf";

/// Host package-manager family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Family {
    /// `dnf` / rpm based hosts
    Rpm,
    /// `apt` / deb based hosts
    Deb,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::Rpm => write!(f, "rpm"),
            Family::Deb => write!(f, "deb"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Platform {
    pub family: Family,
    pub arch: String,
}

impl Platform {
    pub fn new(family: Family, arch: impl Into<String>) -> Self {
        Self {
            family,
            arch: arch.into(),
        }
    }

    /// Detects the host platform. Probes `path` for the rpm package manager and
    /// reads the machine hardware name; never fails.
    pub fn detect(path: &OsStr, cwd: &Path) -> Self {
        let family = match which::which_in(RPM_PROBE, Some(path), cwd) {
            Ok(probe) => {
                debug!("package manager: {}", probe.display());
                Family::Rpm
            }
            Err(_) => Family::Deb,
        };

        let arch = match uname() {
            Ok(info) => info.machine().to_string_lossy().into_owned(),
            Err(err) => {
                debug!("uname failed, using build arch: {:?}", err);
                ARCH.to_string()
            }
        };

        Self { family, arch }
    }

    pub fn is_x86_64(&self) -> bool {
        self.arch == "x86_64"
    }
}
