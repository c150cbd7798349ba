pub mod archive;
pub mod error;
pub mod local;
pub mod traits;

pub use archive::extract_archive;
pub use error::{StorageError, StorageResult};
pub use local::LocalStorage;
pub use traits::{Storage, validate_key};
