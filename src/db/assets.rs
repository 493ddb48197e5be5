use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use crate::db::{AssetStore, StoreError};

/// Filesystem-backed [`AssetStore`]. Stands in for the external object store
/// holding QR-code images; keys map to files under one directory and the
/// public URL is whatever the deployment serves that directory as.
pub struct FsAssetStore {
    base_dir: PathBuf,
    public_base_url: String,
}

impl FsAssetStore {
    pub fn new(base_dir: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        let public_base_url = public_base_url.into().trim_end_matches('/').to_string();
        Self {
            base_dir: base_dir.into(),
            public_base_url,
        }
    }
}

#[async_trait]
impl AssetStore for FsAssetStore {
    async fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        fs::write(self.base_dir.join(key), bytes)
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.base_dir.join(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::Unavailable(err.to_string())),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}
