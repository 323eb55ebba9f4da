use anyhow::{anyhow, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tracing::{info, warn};
use url::Url;

/// Multipart form field carrying the file.
pub const FORM_FIELD: &str = "file";

/// Posts `path` to the temporary-hosting endpoint. The response body is not
/// interpreted.
pub async fn upload(client: &Client, url: &Url, path: &Path) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("invalid artifact path: {}", path.display()))?;

    let file = File::open(path).await?;
    let length = file.metadata().await?.len();

    let part = Part::stream_with_length(Body::from(file), length).file_name(file_name);
    let form = Form::new().part(FORM_FIELD, part);

    let response = client.post(url.clone()).multipart(form).send().await?;

    info!("upload: {} -> {}", path.display(), response.status());

    Ok(())
}

/// Mirrors every artifact. Failures are logged, never returned.
pub async fn mirror(url: &Url, artifacts: &[PathBuf]) {
    let client = Client::new();

    for artifact in artifacts {
        if let Err(err) = upload(&client, url, artifact).await {
            warn!("upload: {} failed: {:#}", artifact.display(), err);
        }
    }
}
