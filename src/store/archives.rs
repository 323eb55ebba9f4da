use anyhow::Result;
use async_compression::tokio::write::{GzipEncoder, XzEncoder};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_tar::Builder;

async fn compress_tar<W>(writer: W, source: &Path, prefix: &Path) -> Result<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut tar_builder = Builder::new(writer);

    // toolchains ship `clang++ -> clang` style links, keep them as links
    tar_builder.follow_symlinks(false);

    tar_builder.append_dir_all(prefix, source).await?;

    let mut output = tar_builder.into_inner().await?;
    output.shutdown().await?;

    Ok(output)
}

/// Writes `source` into an xz compressed tarball rooted at `prefix`.
pub async fn compress_tar_xz(source: &Path, prefix: &Path, output_path: &Path) -> Result<()> {
    let tar = File::create(output_path).await?;

    compress_tar(XzEncoder::new(tar), source, prefix).await?;

    Ok(())
}

/// Writes `source` into a gzip compressed tarball rooted at `prefix`.
pub async fn compress_tar_gz(source: &Path, prefix: &Path, output_path: &Path) -> Result<()> {
    let tar = File::create(output_path).await?;

    compress_tar(GzipEncoder::new(tar), source, prefix).await?;

    Ok(())
}
