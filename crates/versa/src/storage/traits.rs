use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncRead;

use super::{StorageError, StorageResult};

/// Key-addressed artifact store.
///
/// Keys are relative, `/`-separated paths. Same-key writes are last-writer-wins.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Check if a key exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Read file contents
    async fn read(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Copy `reader` to `key` in chunks of `chunk_size` bytes, returning the byte count.
    ///
    /// The data is flushed and synced before this returns.
    async fn write_stream(
        &self,
        key: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        chunk_size: usize,
    ) -> StorageResult<u64>;

    /// Delete a file or a whole directory
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Move a file or directory from source to destination
    async fn rename(&self, source: &str, destination: &str) -> StorageResult<()>;

    /// Local filesystem path backing a key, for collaborators that need real files
    fn resolve(&self, key: &str) -> StorageResult<PathBuf>;
}

/// Reject keys that are empty, absolute or climb out of the store
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidPath("empty key".to_string()));
    }

    for component in Path::new(key).components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(StorageError::InvalidPath(key.to_string())),
        }
    }
    Ok(())
}
