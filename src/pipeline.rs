use crate::action::{Action, UsageError, USAGE_EXIT_CODE};
use crate::command::{CommandError, Runner};
use crate::config::Config;
use crate::platform::Platform;
use crate::release::{self, ReleaseStore};
use crate::{deps, kernel, package, store, toolchain};
use anyhow::Result;
use tracing::info;

/// Everything a pipeline step reads.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub config: &'a Config,
    pub platform: &'a Platform,
    pub runner: &'a dyn Runner,
    /// `None` when no remote repository is configured.
    pub store: Option<&'a dyn ReleaseStore>,
}

async fn build_kernel(ctx: &Context<'_>) -> Result<()> {
    if !ctx.platform.is_x86_64() {
        info!("kernel: skipped on {}", ctx.platform.arch);
        return Ok(());
    }

    kernel::build(ctx.config, ctx.runner).await
}

/// Runs one action to completion. Steps run strictly in order and the first
/// failure aborts the run.
pub async fn run(action: Action, ctx: &Context<'_>) -> Result<()> {
    info!(
        "action: {} ({} on {})",
        action, ctx.platform.family, ctx.platform.arch
    );

    store::check(&ctx.config.layout).await?;

    match action {
        Action::All => {
            deps::install(ctx.config, ctx.platform, ctx.runner).await?;
            toolchain::build_llvm(ctx.config, ctx.platform, ctx.runner).await?;
            toolchain::build_binutils(ctx.config, ctx.platform, ctx.runner).await?;
            build_kernel(ctx).await?;
        }
        Action::Binutils => {
            toolchain::build_binutils(ctx.config, ctx.platform, ctx.runner).await?
        }
        Action::Deps => deps::install(ctx.config, ctx.platform, ctx.runner).await?,
        Action::Kernel => build_kernel(ctx).await?,
        Action::Llvm => toolchain::build_llvm(ctx.config, ctx.platform, ctx.runner).await?,
        Action::Compress => {
            let artifact = package::compress(ctx.config, ctx.platform, ctx.runner).await?;
            info!("artifact: {}", artifact.display());
        }
        Action::Release => {
            let outcome =
                release::publish(ctx.config, ctx.platform, ctx.runner, ctx.store).await?;
            info!("release: {:?}", outcome);
        }
    }

    Ok(())
}

/// Process exit status for a failed run. A failing child's own status is
/// passed through, except when it would read as a usage error.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if cause.downcast_ref::<UsageError>().is_some() {
            return USAGE_EXIT_CODE;
        }

        if let Some(command) = cause.downcast_ref::<CommandError>() {
            return match command.code {
                Some(code) if code != 0 && code != USAGE_EXIT_CODE => code,
                _ => 1,
            };
        }
    }

    1
}
