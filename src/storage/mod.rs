//! Blob storage for uploaded images, tutorial videos and documents.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use strum::{Display, EnumString};
use thiserror::Error;
use tracing::{debug, info};
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Invalid object key: {0}")]
    InvalidKey(String),
}

impl From<StorageError> for crate::errors::ServiceError {
    fn from(err: StorageError) -> Self {
        use crate::errors::ServiceError;
        match err {
            StorageError::NotFound(key) => ServiceError::NotFound(format!("File {} not found", key)),
            StorageError::InvalidKey(key) => ServiceError::InvalidInput(format!("Invalid file key {}", key)),
            other => ServiceError::StorageError(other.to_string()),
        }
    }
}

/// Storage buckets, one directory each
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Bucket {
    Images,
    Videos,
    Documents,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::Images, Bucket::Videos, Bucket::Documents];

    pub fn parse(value: &str) -> Option<Bucket> {
        Bucket::from_str(value.trim()).ok()
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, bucket: Bucket, key: &str, data: Bytes) -> Result<(), StorageError>;
    async fn get(&self, bucket: Bucket, key: &str) -> Result<Bytes, StorageError>;
    async fn delete(&self, bucket: Bucket, key: &str) -> Result<(), StorageError>;
}

/// Reduces an uploaded file name to `[A-Za-z0-9._-]`, keeping at most 100 characters
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    let trimmed: String = trimmed.chars().take(100).collect();
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed
    }
}

/// Local directory tree: `{root}/{bucket}/{key}`
#[derive(Debug, Clone)]
pub struct LocalDiskStore {
    root: PathBuf,
}

impl LocalDiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the bucket directories
    pub async fn init(&self) -> Result<(), StorageError> {
        for bucket in Bucket::ALL {
            tokio::fs::create_dir_all(self.root.join(bucket.to_string())).await?;
        }
        info!(root = %self.root.display(), "Blob storage ready");
        Ok(())
    }

    fn path_for(&self, bucket: Bucket, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(bucket.to_string()).join(key))
    }
}

#[async_trait]
impl BlobStore for LocalDiskStore {
    async fn put(&self, bucket: Bucket, key: &str, data: Bytes) -> Result<(), StorageError> {
        let path = self.path_for(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;
        debug!(%bucket, key, size = data.len(), "Stored object");
        Ok(())
    }

    async fn get(&self, bucket: Bucket, key: &str) -> Result<Bytes, StorageError> {
        let path = self.path_for(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, bucket: Bucket, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(bucket, key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            // already gone
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_sanitised() {
        assert_eq!(sanitize_file_name("Spring Catalogue (v2).pdf"), "Spring_Catalogue__v2_.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\tmp\\cut-sheet.csv"), "cut-sheet.csv");
        assert_eq!(sanitize_file_name("..."), "file");
    }

    #[test]
    fn bucket_parsing_is_case_insensitive() {
        assert_eq!(Bucket::parse("Videos"), Some(Bucket::Videos));
        assert_eq!(Bucket::parse("archive"), None);
        assert_eq!(Bucket::Documents.to_string(), "documents");
    }

    #[tokio::test]
    async fn local_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDiskStore::new(dir.path());
        store.init().await.unwrap();

        store
            .put(Bucket::Images, "abc-front.png", Bytes::from_static(b"png"))
            .await
            .unwrap();
        assert_eq!(
            store.get(Bucket::Images, "abc-front.png").await.unwrap(),
            Bytes::from_static(b"png")
        );

        store.delete(Bucket::Images, "abc-front.png").await.unwrap();
        assert!(matches!(
            store.get(Bucket::Images, "abc-front.png").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            store.put(Bucket::Images, "../escape", Bytes::new()).await,
            Err(StorageError::InvalidKey(_))
        ));
    }
}
