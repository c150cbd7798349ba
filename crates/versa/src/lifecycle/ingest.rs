//! Receiving uploads into the artifact store

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncRead;

use crate::error::{Result, VersaError};
use crate::storage::{Storage, extract_archive};
use versa_core::IdGenerator;

/// Storage prefix for raw uploads
pub const UPLOADS_DIR: &str = "uploads";

/// Storage prefix for extracted datasets
pub const DATASETS_DIR: &str = "datasets";

/// A client file: its name as sent and a stream of its bytes
pub struct Upload<'a> {
    pub file_name: String,
    pub body: Box<dyn AsyncRead + Send + Unpin + 'a>,
}

impl<'a> Upload<'a> {
    pub fn new(file_name: impl Into<String>, body: impl AsyncRead + Send + Unpin + 'a) -> Self {
        Self {
            file_name: file_name.into(),
            body: Box::new(body),
        }
    }
}

impl Upload<'static> {
    /// In-memory upload
    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            body: Box::new(std::io::Cursor::new(bytes)),
        }
    }
}

/// An upload written to the store
#[derive(Debug, Clone)]
pub struct IngestedFile {
    /// Storage key; also recorded as the outcome's input reference
    pub key: String,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Reduce a client file name to its final component.
///
/// Hidden names (leading `.`) are refused; the store keeps its own bookkeeping
/// under such names.
pub fn sanitize_file_name(name: &str) -> Result<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();

    if base.is_empty() || base.starts_with('.') {
        return Err(VersaError::InvalidInput(format!(
            "invalid file name '{}'",
            name
        )));
    }
    Ok(base.to_string())
}

/// Key of the directory an uploaded archive is extracted into
fn dataset_key(upload_key: &str) -> String {
    let path = Path::new(upload_key);
    let mut name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    if path.extension().is_none() {
        name.push_str("_extracted");
    }
    format!("{}/{}", DATASETS_DIR, name)
}

/// Writes uploads into the artifact store and unpacks dataset archives
#[derive(Clone)]
pub struct Ingestor {
    storage: Arc<dyn Storage>,
    ids: Arc<dyn IdGenerator>,
    chunk_size: usize,
    key_by_id: bool,
}

impl Ingestor {
    pub fn new(
        storage: Arc<dyn Storage>,
        ids: Arc<dyn IdGenerator>,
        chunk_size: usize,
        key_by_id: bool,
    ) -> Self {
        Self {
            storage,
            ids,
            chunk_size,
            key_by_id,
        }
    }

    fn upload_key(&self, file_name: &str) -> String {
        if self.key_by_id {
            format!("{}/{}_{}", UPLOADS_DIR, self.ids.generate(), file_name)
        } else {
            format!("{}/{}", UPLOADS_DIR, file_name)
        }
    }

    /// Stream an upload into the store
    pub async fn ingest(&self, upload: Upload<'_>) -> Result<IngestedFile> {
        let file_name = sanitize_file_name(&upload.file_name)?;
        let key = self.upload_key(&file_name);
        let mut body = upload.body;

        let bytes = self
            .storage
            .write_stream(&key, &mut *body, self.chunk_size)
            .await
            .map_err(|e| VersaError::Upload(e.to_string()))?;
        let path = self.storage.resolve(&key)?;

        tracing::debug!(key = %key, bytes, "upload stored");
        Ok(IngestedFile { key, path, bytes })
    }

    /// Unpack an ingested archive and return the dataset root
    pub async fn extract(&self, file: &IngestedFile) -> Result<PathBuf> {
        let target = self.storage.resolve(&dataset_key(&file.key))?;
        let root = extract_archive(&file.path, &target)
            .await
            .map_err(|e| VersaError::Extraction(format!("{}: {}", file.key, e)))?;

        tracing::debug!(key = %file.key, dataset = %root.display(), "archive extracted");
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStorage;
    use std::path::Path;
    use versa_core::SequentialIds;

    fn ingestor(dir: &Path, key_by_id: bool) -> Ingestor {
        Ingestor::new(
            Arc::new(LocalStorage::new(dir)),
            Arc::new(SequentialIds::new()),
            4,
            key_by_id,
        )
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("cats.zip").unwrap(), "cats.zip");
        assert_eq!(sanitize_file_name("../../etc/cats.zip").unwrap(), "cats.zip");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\cat.png").unwrap(), "cat.png");
        assert!(sanitize_file_name("").is_err());
        assert!(sanitize_file_name("..").is_err());
        assert!(sanitize_file_name("dir/").is_err());
        assert!(sanitize_file_name(".staging.zip").is_err());
        assert!(sanitize_file_name("uploads/.hidden").is_err());
    }

    #[tokio::test]
    async fn test_ingest_prefixes_key_with_upload_id() {
        let tmp = tempfile::tempdir().unwrap();
        let file = ingestor(tmp.path(), true)
            .ingest(Upload::from_bytes("cat.png", b"0123456789".to_vec()))
            .await
            .unwrap();

        assert_eq!(file.key, format!("uploads/{}_cat.png", SequentialIds::nth(1)));
        assert_eq!(file.bytes, 10);
        assert_eq!(std::fs::read(&file.path).unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn test_ingest_by_name_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let ingestor = ingestor(tmp.path(), false);

        ingestor
            .ingest(Upload::from_bytes("cat.png", b"first".to_vec()))
            .await
            .unwrap();
        let second = ingestor
            .ingest(Upload::from_bytes("cat.png", b"second".to_vec()))
            .await
            .unwrap();

        assert_eq!(second.key, "uploads/cat.png");
        assert_eq!(std::fs::read(&second.path).unwrap(), b"second");
    }

    #[test]
    fn test_dataset_key() {
        assert_eq!(dataset_key("uploads/u1_cats.zip"), "datasets/u1_cats");
        assert_eq!(dataset_key("uploads/cats"), "datasets/cats_extracted");
    }

    #[tokio::test]
    async fn test_extract_stays_inside_datasets() {
        let tmp = tempfile::tempdir().unwrap();
        let model_dir = tmp.path().join("cats");
        std::fs::create_dir_all(&model_dir).unwrap();
        std::fs::write(model_dir.join("weights.bin"), b"keep").unwrap();

        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        writer
            .start_file("cat/1.png", zip::write::SimpleFileOptions::default())
            .unwrap();
        std::io::Write::write_all(&mut writer, b"pixels").unwrap();
        let archive = writer.finish().unwrap().into_inner();

        let ingestor = ingestor(tmp.path(), false);
        let file = ingestor
            .ingest(Upload::from_bytes("cats.zip", archive))
            .await
            .unwrap();
        let root = ingestor.extract(&file).await.unwrap();

        assert!(root.starts_with(tmp.path().join("datasets")));
        assert_eq!(std::fs::read(model_dir.join("weights.bin")).unwrap(), b"keep");
    }

    #[tokio::test]
    async fn test_extract_rejects_non_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let ingestor = ingestor(tmp.path(), false);
        let file = ingestor
            .ingest(Upload::from_bytes("data.zip", b"plain text".to_vec()))
            .await
            .unwrap();

        let result = ingestor.extract(&file).await;
        assert!(matches!(result, Err(VersaError::Extraction(_))));
    }
}
