use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use walkdir::WalkDir;

/// Fixed directory layout of a checkout, relative to its root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn install_path(&self) -> PathBuf {
        self.root.join("install")
    }

    pub fn install_bin_path(&self) -> PathBuf {
        self.install_path().join("bin")
    }

    pub fn install_lib_path(&self) -> PathBuf {
        self.install_path().join("lib")
    }

    pub fn source_path(&self) -> PathBuf {
        self.root.join("src")
    }

    pub fn llvm_source_path(&self) -> PathBuf {
        self.source_path().join("llvm-project")
    }

    pub fn dist_path(&self) -> PathBuf {
        self.root.join("dist")
    }

    pub fn build_path(&self) -> PathBuf {
        self.root.join("build")
    }

    /// Directory holding the external builder programs.
    pub fn builders_path(&self) -> PathBuf {
        self.root.join("tc-build")
    }

    /// Local toolchain override, prepended to `PATH` of every child process.
    pub fn override_bin_path(&self) -> PathBuf {
        self.root.join("toolchain").join("bin")
    }
}

pub fn get_temp() -> PathBuf {
    env::temp_dir().join(format!("crossforge-{}", Uuid::now_v7()))
}

/// Regular files below `source`, at most `max_depth` levels deep, sorted.
pub fn get_file_paths<P: AsRef<Path>>(source: P, max_depth: Option<usize>) -> Result<Vec<PathBuf>> {
    let mut walker = WalkDir::new(&source).follow_links(false);

    if let Some(depth) = max_depth {
        walker = walker.max_depth(depth);
    }

    let mut files = vec![];

    for entry in walker {
        let entry = entry?;

        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    files.sort();

    Ok(files)
}
