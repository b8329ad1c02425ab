use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::{BlobError, BlobStore, validate_id};

/// Stores blobs as plain files under `<data_dir>/blobs`, fanned out by the
/// first two characters of the file id.
pub struct FsBlobStore {
    base_path: PathBuf,
}

impl FsBlobStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            base_path: data_dir.join("blobs"),
        }
    }

    fn object_path(&self, file_id: &str) -> PathBuf {
        self.base_path.join(&file_id[0..2]).join(file_id)
    }

    fn temp_path(&self) -> PathBuf {
        self.base_path.join("tmp").join(Uuid::new_v4().to_string())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, file_id: &str, data: Bytes) -> Result<(), BlobError> {
        validate_id(file_id)?;

        let temp_path = self.temp_path();
        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut temp_file = File::create(&temp_path).await?;
        temp_file.write_all(&data).await?;
        temp_file.sync_all().await?;

        let final_path = self.object_path(file_id);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::rename(&temp_path, &final_path).await?;
        tracing::debug!(file_id, size = data.len(), "stored blob");

        Ok(())
    }

    async fn get(&self, file_id: &str) -> Result<Bytes, BlobError> {
        validate_id(file_id)?;
        let data = fs::read(self.object_path(file_id))
            .await
            .map_err(BlobError::from_io)?;
        Ok(Bytes::from(data))
    }

    async fn delete(&self, file_id: &str) -> Result<bool, BlobError> {
        validate_id(file_id)?;

        match fs::remove_file(self.object_path(file_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BlobError::Io(e)),
        }
    }
}
