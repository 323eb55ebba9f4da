use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_stream::{wrappers::SplitStream, StreamExt};
use tracing::{debug, info};

/// A delegated program exited unsuccessfully.
#[derive(thiserror::Error, Debug)]
#[error("`{program}` failed with {}", describe_code(.code))]
pub struct CommandError {
    pub program: String,
    pub code: Option<i32>,
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {}", code),
        None => "a signal".to_string(),
    }
}

/// One external invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(OsString, OsString)>,
    /// Capture stdout instead of streaming it to the log.
    pub capture: bool,
}

impl CommandSpec {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.env
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    pub fn capture(mut self) -> Self {
        self.capture = true;
        self
    }

    /// File name of the program, used as log prefix.
    pub fn name(&self) -> String {
        Path::new(&self.program)
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;

        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the child was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    /// Only collected for capturing specs.
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[async_trait]
pub trait Runner: Send + Sync {
    /// Runs `spec` to completion. A non-zero exit is reported in the output,
    /// not as an error.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Runs `spec` and fails with [`CommandError`] on a non-zero exit.
    async fn run_checked(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let output = self.run(spec).await?;

        if !output.success() {
            return Err(CommandError {
                program: spec.name(),
                code: output.code,
            }
            .into());
        }

        Ok(output)
    }
}

/// Spawns real processes on the host.
#[derive(Clone, Debug)]
pub struct SystemRunner {
    path: OsString,
}

impl SystemRunner {
    /// `search_path` is used verbatim as `PATH` of every child.
    pub fn new(search_path: OsString) -> Self {
        Self { path: search_path }
    }
}

#[async_trait]
impl Runner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let name = spec.name();

        debug!("run: {}", spec);

        let mut command = Command::new(&spec.program);

        command.args(&spec.args);
        command.env("PATH", &self.path);

        for (key, value) in &spec.env {
            command.env(key, value);
        }

        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| anyhow!("failed to spawn `{}`: {}", name, err))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("failed to capture stdout of `{}`", name))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("failed to capture stderr of `{}`", name))?;

        let mut captured = String::new();
        let mut diagnostics = String::new();

        if spec.capture {
            let read_stdout = async {
                let mut buffer = vec![];
                BufReader::new(stdout).read_to_end(&mut buffer).await?;
                Ok::<Vec<u8>, std::io::Error>(buffer)
            };

            let read_stderr = async {
                let mut stderr = SplitStream::new(BufReader::new(stderr).split(b'\n'));
                let mut lines = vec![];

                while let Some(line) = stderr.next().await {
                    let line = String::from_utf8_lossy(&line?).into_owned();
                    debug!("{} |> {}", name, line);
                    lines.push(line);
                }

                Ok::<String, std::io::Error>(lines.join("\n"))
            };

            let (read, drained) = tokio::join!(read_stdout, read_stderr);

            let read = read.map_err(|err| anyhow!("failed to read output of `{}`: {}", name, err))?;
            captured = String::from_utf8_lossy(&read).into_owned();
            diagnostics =
                drained.map_err(|err| anyhow!("failed to read output of `{}`: {}", name, err))?;
        } else {
            let stdout = SplitStream::new(BufReader::new(stdout).split(b'\n'));
            let stderr = SplitStream::new(BufReader::new(stderr).split(b'\n'));

            let mut stdio_merged = StreamExt::merge(stdout, stderr);

            while let Some(line) = stdio_merged.next().await {
                let line =
                    line.map_err(|err| anyhow!("failed to read output of `{}`: {}", name, err))?;

                // compilers print in the host locale, not necessarily UTF-8
                info!("{} |> {}", name, String::from_utf8_lossy(&line));
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|err| anyhow!("failed to wait for `{}`: {}", name, err))?;

        Ok(CommandOutput {
            code: status.code(),
            stdout: captured,
            stderr: diagnostics,
        })
    }
}

/// Builds a `PATH` value with `dir` in front of `path`.
pub fn prepend_path(dir: &Path, path: &OsStr) -> Result<OsString> {
    let mut paths = vec![dir.to_path_buf()];
    paths.extend(std::env::split_paths(path).filter(|p| !p.as_os_str().is_empty()));

    Ok(std::env::join_paths(paths)?)
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    type Script = Box<dyn Fn(&CommandSpec) -> Option<CommandOutput> + Send + Sync>;

    /// Records every spec and answers from scripted responses, defaulting to
    /// a successful, silent exit.
    #[derive(Default)]
    pub struct RecordingRunner {
        calls: Mutex<Vec<CommandSpec>>,
        scripts: Vec<Script>,
    }

    impl RecordingRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond<F>(mut self, script: F) -> Self
        where
            F: Fn(&CommandSpec) -> Option<CommandOutput> + Send + Sync + 'static,
        {
            self.scripts.push(Box::new(script));
            self
        }

        /// Answers `program`'s invocations with `stdout` and exit code `code`.
        pub fn on(self, program: &'static str, code: i32, stdout: &'static str) -> Self {
            self.respond(move |spec| {
                (spec.name() == program).then(|| CommandOutput {
                    code: Some(code),
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                })
            })
        }

        /// Fails `program`'s invocations with exit code `code` and `stderr`.
        pub fn fail(self, program: &'static str, code: i32, stderr: &'static str) -> Self {
            self.respond(move |spec| {
                (spec.name() == program).then(|| CommandOutput {
                    code: Some(code),
                    stdout: String::new(),
                    stderr: stderr.to_string(),
                })
            })
        }

        pub fn calls(&self) -> Vec<CommandSpec> {
            self.calls.lock().unwrap().clone()
        }

        pub fn programs(&self) -> Vec<String> {
            self.calls().iter().map(|c| c.name()).collect()
        }
    }

    #[async_trait]
    impl Runner for RecordingRunner {
        async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            self.calls.lock().unwrap().push(spec.clone());

            for script in &self.scripts {
                if let Some(output) = script(spec) {
                    return Ok(output);
                }
            }

            Ok(CommandOutput {
                code: Some(0),
                ..Default::default()
            })
        }
    }
}
