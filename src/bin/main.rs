use anyhow::Result;
use clap::builder::FalseyValueParser;
use clap::{ArgAction, Parser};
use crossforge::action::{Action, UsageError, USAGE_EXIT_CODE};
use crossforge::command::SystemRunner;
use crossforge::config::{Config, ConfigInputs};
use crossforge::pipeline::{self, Context};
use crossforge::platform::Platform;
use crossforge::release::{GhReleaseStore, ReleaseStore};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::exit;
use tracing::{error, Level};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::FmtSubscriber;

/// Builds, packages and publishes a cross-compiling Clang/LLVM toolchain.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// One of: all, binutils, deps, kernel, llvm, compress, release
    #[arg(value_name = "ACTION")]
    actions: Vec<String>,

    #[arg(default_value_t = Level::INFO, long)]
    level: Level,

    /// Workspace holding install/, src/, dist/, build/ and tc-build/
    #[arg(long)]
    root: Option<PathBuf>,

    #[arg(long, env = "CI", action = ArgAction::SetTrue, value_parser = FalseyValueParser::new())]
    ci: bool,

    #[arg(long, env = "VENDOR")]
    vendor: Option<String>,

    /// Remote repository (`owner/name`) releases are published to
    #[arg(long, env = "GITHUB_REPOSITORY")]
    repository: Option<String>,

    /// Reference new releases point at
    #[arg(long = "ref", env = "GITHUB_REF_NAME")]
    target_ref: Option<String>,

    #[arg(long, env = "CROSSFORGE_UPLOAD_URL")]
    upload_url: Option<String>,

    /// Do not mirror artifacts to the temporary-hosting endpoint
    #[arg(default_value_t = false, long)]
    skip_upload: bool,

    /// OS-release descriptor used for artifact naming
    #[arg(long)]
    os_release: Option<PathBuf>,
}

fn init_logging(level: Level) -> Result<()> {
    let stderr_writer = std::io::stderr.with_max_level(level);

    let mut subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(stderr_writer)
        .without_time();

    if [Level::DEBUG, Level::TRACE].contains(&level) {
        subscriber = subscriber.with_file(true).with_line_number(true);
    }

    tracing::subscriber::set_global_default(subscriber.finish())?;

    Ok(())
}

async fn start(cli: Cli, action: Action) -> Result<()> {
    let cwd = std::env::current_dir()?;

    let root = match cli.root {
        Some(root) if root.is_relative() => cwd.join(root),
        Some(root) => root,
        None => cwd,
    };

    let config = Config::new(ConfigInputs {
        root,
        ci: cli.ci,
        vendor: cli.vendor,
        repository: cli.repository,
        target_ref: cli.target_ref,
        upload_url: cli.upload_url,
        skip_upload: cli.skip_upload,
        os_release: cli.os_release,
        path: std::env::var_os("PATH"),
    })?;

    let platform = Platform::detect(&config.host_path, config.layout.root());
    let runner = SystemRunner::new(config.search_path.clone());

    let gh_store = config
        .repository
        .as_deref()
        .map(|repository| GhReleaseStore::new(&runner, repository));

    let ctx = Context {
        config: &config,
        platform: &platform,
        runner: &runner,
        store: gh_store.as_ref().map(|store| store as &dyn ReleaseStore),
    };

    pipeline::run(action, &ctx).await
}

/// Why the command line was not accepted.
#[derive(Debug)]
enum Rejected {
    Flags(clap::Error),
    Action(UsageError),
}

impl Rejected {
    /// Help and version requests are not errors.
    fn exit_code(&self) -> i32 {
        match self {
            Rejected::Flags(err) if !err.use_stderr() => 0,
            _ => USAGE_EXIT_CODE,
        }
    }

    fn report(self) -> ! {
        let code = self.exit_code();

        match self {
            Rejected::Flags(err) if code == 0 => err.exit(),
            Rejected::Flags(err) => {
                let _ = err.print();
            }
            Rejected::Action(err) => eprintln!("error: {}", err),
        }

        exit(code)
    }
}

fn parse_args<I, T>(args: I) -> Result<(Cli, Action), Rejected>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::try_parse_from(args).map_err(Rejected::Flags)?;
    let action = Action::parse_args(&cli.actions).map_err(Rejected::Action)?;

    Ok((cli, action))
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let (cli, action) = match parse_args(std::env::args_os()) {
        Ok(parsed) => parsed,
        Err(rejected) => rejected.report(),
    };

    if let Err(err) = init_logging(cli.level) {
        eprintln!("error: {}", err);
        exit(1);
    }

    if let Err(err) = start(cli, action).await {
        error!("{:#}", err);
        exit(pipeline::exit_code(&err));
    }
}
