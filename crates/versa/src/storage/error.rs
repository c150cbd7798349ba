use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Storage error: {0}")]
    Other(String),
}

impl From<zip::result::ZipError> for StorageError {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(io) => StorageError::IoError(io),
            other => StorageError::Archive(other.to_string()),
        }
    }
}
