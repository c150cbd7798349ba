use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use super::traits::validate_key;
use super::{Storage, StorageError, StorageResult};
use crate::config::VersaConfig;

/// Local filesystem storage implementation
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    /// Create LocalStorage from VersaConfig
    pub fn from_config(config: &VersaConfig) -> Self {
        Self::new(&config.data_dir)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get full path by joining base path with a validated key
    fn full_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.part", name, Uuid::new_v4()))
}

async fn copy_chunked(
    path: &Path,
    reader: &mut (dyn AsyncRead + Send + Unpin),
    chunk_size: usize,
) -> StorageResult<u64> {
    let mut file = fs::File::create(path).await?;
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut written = 0u64;

    loop {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        file.write_all(&buffer[..read]).await?;
        written += read as u64;
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

async fn ensure_parent(path: &Path) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    Ok(())
}

#[async_trait]
impl Storage for LocalStorage {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let full_path = self.full_path(key)?;
        Ok(fs::try_exists(&full_path).await?)
    }

    async fn read(&self, key: &str) -> StorageResult<Vec<u8>> {
        let full_path = self.full_path(key)?;
        let mut file = fs::File::open(&full_path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(key.to_string()),
            _ => StorageError::IoError(e),
        })?;
        let mut content = Vec::new();
        file.read_to_end(&mut content).await?;
        Ok(content)
    }

    async fn write_stream(
        &self,
        key: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        chunk_size: usize,
    ) -> StorageResult<u64> {
        let full_path = self.full_path(key)?;
        ensure_parent(&full_path).await?;

        // Written under a private name and renamed over the key; the last rename wins
        let partial = partial_path(&full_path);
        let result = copy_chunked(&partial, reader, chunk_size).await;
        let written = match result {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&partial, &full_path).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e.into());
        }
        Ok(written)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let full_path = self.full_path(key)?;
        if full_path.is_dir() {
            fs::remove_dir_all(&full_path).await?;
        } else {
            fs::remove_file(&full_path).await?;
        }
        Ok(())
    }

    async fn rename(&self, source: &str, destination: &str) -> StorageResult<()> {
        let source_path = self.full_path(source)?;
        let dest_path = self.full_path(destination)?;
        ensure_parent(&dest_path).await?;

        fs::rename(&source_path, &dest_path).await?;
        Ok(())
    }

    fn resolve(&self, key: &str) -> StorageResult<PathBuf> {
        self.full_path(key)
    }
}
