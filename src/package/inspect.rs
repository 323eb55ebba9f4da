use crate::command::{CommandSpec, Runner};
use anyhow::{bail, Result};
use std::path::Path;

/// Cheap header check so `file` only runs on ELF objects.
pub fn is_elf(path: &Path) -> bool {
    matches!(infer::get_from_path(path), Ok(Some(kind)) if kind.extension() == "elf")
}

/// Output of `file -b` for one path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo(String);

impl FileInfo {
    pub fn new(description: impl Into<String>) -> Self {
        Self(description.into())
    }

    pub fn description(&self) -> &str {
        &self.0
    }

    pub fn has_debug_symbols(&self) -> bool {
        self.0.contains("with debug_info") || self.0.contains("not stripped")
    }

    /// Dynamically linked ELF executable.
    pub fn has_interpreter(&self) -> bool {
        self.0.starts_with("ELF") && self.0.contains("interpreter")
    }
}

pub async fn describe(runner: &dyn Runner, path: &Path) -> Result<FileInfo> {
    let output = runner
        .run(&CommandSpec::new("file").arg("-b").arg(path).capture())
        .await?;

    if !output.success() {
        bail!("failed to inspect {}", path.display());
    }

    Ok(FileInfo::new(output.stdout.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::RecordingRunner;
    use tempfile::TempDir;

    const CLANG: &str = "ELF 64-bit LSB pie executable, x86-64, version 1 (SYSV), dynamically linked, interpreter /lib64/ld-linux-x86-64.so.2, BuildID[sha1]=1f0c, for GNU/Linux 3.2.0, with debug_info, not stripped";

    const LIBLTO: &str = "ELF 64-bit LSB shared object, x86-64, version 1 (SYSV), dynamically linked, BuildID[sha1]=77aa, stripped";

    #[test]
    fn executable_with_symbols() {
        let info = FileInfo::new(CLANG);

        assert!(info.has_debug_symbols());
        assert!(info.has_interpreter());
    }

    #[test]
    fn stripped_shared_object() {
        let info = FileInfo::new(LIBLTO);

        assert!(!info.has_debug_symbols());
        assert!(!info.has_interpreter());
    }

    #[test]
    fn scripts_are_not_executables() {
        let info = FileInfo::new("Python script, ASCII text executable");

        assert!(!info.has_interpreter());
        assert!(!info.has_debug_symbols());
    }

    #[test]
    fn elf_header_detection() {
        let tmp = TempDir::new().unwrap();
        let elf = tmp.path().join("clang");
        let script = tmp.path().join("scan-build");

        let mut header = vec![0x7f, b'E', b'L', b'F', 2, 1, 1, 0];
        header.resize(64, 0);

        std::fs::write(&elf, &header).unwrap();
        std::fs::write(&script, "#!/usr/bin/env perl\n").unwrap();

        assert!(is_elf(&elf));
        assert!(!is_elf(&script));
        assert!(!is_elf(&tmp.path().join("missing")));
    }

    #[tokio::test]
    async fn describe_trims_output() {
        let runner = RecordingRunner::new().on("file", 0, "ELF 64-bit LSB executable\n");

        let info = describe(&runner, Path::new("/work/install/bin/lld"))
            .await
            .unwrap();

        assert_eq!(info.description(), "ELF 64-bit LSB executable");
        assert_eq!(
            runner.calls()[0].args_lossy(),
            ["-b", "/work/install/bin/lld"]
        );
    }
}
