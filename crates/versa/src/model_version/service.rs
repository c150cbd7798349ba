use std::sync::Arc;

use super::{ModelVersion, ModelVersionId};
use crate::error::{Result, VersaError};
use crate::record::{RecordStore, RecordTransaction};
use versa_core::ClassIndexMap;

/// Owns model version records: one record per distinct version name
#[derive(Clone)]
pub struct ModelRegistry {
    store: Arc<dyn RecordStore>,
}

impl ModelRegistry {
    /// Create a new ModelRegistry
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Return the record named `version`, creating it with `id` and `class_map` if absent.
    ///
    /// On a hit the stored record is returned unchanged and the arguments are ignored.
    pub async fn create_or_get(
        &self,
        tx: &mut dyn RecordTransaction,
        id: ModelVersionId,
        version: &str,
        class_map: ClassIndexMap,
    ) -> Result<ModelVersion> {
        let version = validate_version(version)?;
        let record = tx
            .create_or_get_model_version(ModelVersion::new(id, version, class_map))
            .await?;

        if record.id != id {
            tracing::info!(
                version,
                existing_id = %record.id,
                discarded_id = %id,
                "model version already registered, keeping the first record"
            );
        }
        Ok(record)
    }

    /// Get a model version by its version name
    pub async fn get_by_version(&self, version: &str) -> Result<Option<ModelVersion>> {
        let version = validate_version(version)?;
        Ok(self.store.model_version_by_name(version).await?)
    }

    /// Get a model version by ID
    pub async fn get(&self, id: &ModelVersionId) -> Result<ModelVersion> {
        self.store
            .model_version_by_id(id)
            .await?
            .ok_or_else(|| VersaError::NotFound(format!("model version {}", id)))
    }

    /// Class index map stored with a model version
    pub async fn get_class_index_map(&self, id: &ModelVersionId) -> Result<ClassIndexMap> {
        Ok(self.get(id).await?.class_map)
    }

    /// List all model versions in creation order
    pub async fn list_all(&self) -> Result<Vec<ModelVersion>> {
        Ok(self.store.list_model_versions().await?)
    }
}

/// Trimmed, non-empty version name
pub fn validate_version(version: &str) -> Result<&str> {
    let trimmed = version.trim();
    if trimmed.is_empty() {
        return Err(VersaError::InvalidInput(
            "model version cannot be empty".to_string(),
        ));
    }
    Ok(trimmed)
}
