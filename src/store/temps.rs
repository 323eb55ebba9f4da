use crate::store::paths;
use anyhow::Result;
use std::path::PathBuf;
use tokio::fs;

pub async fn create_dir() -> Result<PathBuf> {
    let temp_dir = paths::get_temp();
    fs::create_dir_all(&temp_dir).await?;
    Ok(temp_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn temp_dirs_are_unique() {
        let first = create_dir().await.unwrap();
        let second = create_dir().await.unwrap();

        assert_ne!(first, second);
        assert!(first.is_dir());

        fs::remove_dir_all(first).await.unwrap();
        fs::remove_dir_all(second).await.unwrap();
    }
}
