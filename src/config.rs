use crate::command::prepend_path;
use crate::store::Layout;
use anyhow::Result;
use std::ffi::OsString;
use std::path::PathBuf;
use url::Url;

pub const DEFAULT_VENDOR: &str = "crossforge";

pub const DEFAULT_UPLOAD_URL: &str = "https://temp.sh/upload";

/// Values gathered from the command line and environment at start-up.
#[derive(Clone, Debug, Default)]
pub struct ConfigInputs {
    pub root: PathBuf,
    pub ci: bool,
    pub vendor: Option<String>,
    pub repository: Option<String>,
    pub target_ref: Option<String>,
    pub upload_url: Option<String>,
    pub skip_upload: bool,
    pub os_release: Option<PathBuf>,
    pub path: Option<OsString>,
}

/// Run configuration. Built once in `main` and only read afterwards.
#[derive(Clone, Debug)]
pub struct Config {
    pub layout: Layout,
    /// Running inside an automated build.
    pub ci: bool,
    pub vendor: String,
    /// Remote repository (`owner/name`) releases are published to.
    pub repository: Option<String>,
    pub target_ref: Option<String>,
    /// `None` disables the temporary-hosting mirror.
    pub upload_url: Option<Url>,
    pub os_release: Option<PathBuf>,
    /// `PATH` as seen by the process at start-up.
    pub host_path: OsString,
    /// `PATH` handed to every child, with the toolchain override in front.
    pub search_path: OsString,
}

impl Config {
    pub fn new(inputs: ConfigInputs) -> Result<Self> {
        let layout = Layout::new(inputs.root);

        let vendor = inputs
            .vendor
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_VENDOR.to_string());

        let upload_url = if inputs.skip_upload {
            None
        } else {
            let raw = inputs
                .upload_url
                .unwrap_or_else(|| DEFAULT_UPLOAD_URL.to_string());

            Some(Url::parse(&raw)?)
        };

        let host_path = inputs.path.unwrap_or_default();
        let search_path = prepend_path(&layout.override_bin_path(), &host_path)?;

        Ok(Self {
            layout,
            ci: inputs.ci,
            vendor,
            repository: inputs.repository.filter(|r| !r.is_empty()),
            target_ref: inputs.target_ref.filter(|r| !r.is_empty()),
            upload_url,
            os_release: inputs.os_release,
            host_path,
            search_path,
        })
    }
}
