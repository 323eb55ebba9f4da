use anyhow::Result;
use tokio::fs;
use tracing::debug;

pub mod archives;
pub mod paths;
pub mod temps;

pub use paths::Layout;

/// Creates the output directories a pipeline run writes into.
pub async fn check(layout: &Layout) -> Result<(), anyhow::Error> {
    for dir in [layout.dist_path(), layout.build_path(), layout.source_path()] {
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
        }

        debug!("directory: {:?}", dir);
    }

    Ok(())
}
