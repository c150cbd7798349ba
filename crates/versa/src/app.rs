//! Wiring for a complete lifecycle service
//!
//! [`VersaAppBuilder`] assembles storage, record store, ingestion and a classifier
//! into a [`LifecycleService`] from a [`VersaConfig`].

use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

use crate::config::VersaConfig;
use crate::error::{Result, VersaError};
use crate::lifecycle::{Ingestor, LifecycleService};
use crate::record::{InMemoryRecordStore, PostgresRecordStore, RecordError, RecordStore};
use crate::storage::{LocalStorage, Storage};
use versa_core::{Classifier, IdGenerator, RandomIds};

/// Open the record store named by the configuration.
///
/// With a `database_url` the PostgreSQL store is used and migrated; without one
/// the in-memory store is used and nothing survives a restart.
pub async fn connect_record_store(config: &VersaConfig) -> Result<Arc<dyn RecordStore>> {
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await
                .map_err(|e| VersaError::Record(RecordError::Database(e.to_string())))?;

            let store = PostgresRecordStore::new(pool);
            store.migrate().await?;
            tracing::info!("using PostgreSQL record store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("no database_url configured, records are kept in memory only");
            Ok(Arc::new(InMemoryRecordStore::new()))
        }
    }
}

/// Builder for [`LifecycleService`]
pub struct VersaAppBuilder<C: Classifier> {
    config: VersaConfig,
    classifier: Option<Arc<C>>,
    storage: Option<Arc<dyn Storage>>,
    record_store: Option<Arc<dyn RecordStore>>,
    ids: Arc<dyn IdGenerator>,
    upload_ids: Arc<dyn IdGenerator>,
}

impl<C: Classifier> VersaAppBuilder<C> {
    /// Create a new builder
    pub fn new(config: VersaConfig) -> Self {
        Self {
            config,
            classifier: None,
            storage: None,
            record_store: None,
            ids: Arc::new(RandomIds),
            upload_ids: Arc::new(RandomIds),
        }
    }

    /// Set the classifier backend
    pub fn classifier(mut self, classifier: C) -> Self {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    /// Use a storage other than `LocalStorage` at `data_dir`
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Set the record store (in-memory when unset)
    pub fn record_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.record_store = Some(store);
        self
    }

    /// Set the generator for model version ids
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Set the generator for upload key prefixes
    pub fn upload_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.upload_ids = ids;
        self
    }

    /// Build the service
    pub fn build(self) -> Result<LifecycleService<C>> {
        let classifier = self
            .classifier
            .ok_or_else(|| VersaError::InvalidInput("No classifier configured".to_string()))?;
        if self.config.upload_chunk_size == 0 {
            return Err(VersaError::InvalidInput(
                "upload_chunk_size must be positive".to_string(),
            ));
        }

        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(LocalStorage::from_config(&self.config)));
        let record_store = self
            .record_store
            .unwrap_or_else(|| Arc::new(InMemoryRecordStore::new()));
        let backend = classifier.metadata();
        tracing::info!(
            backend = backend.name.as_deref().unwrap_or("unnamed"),
            data_dir = %self.config.data_dir,
            "lifecycle service configured"
        );

        let ingestor = Ingestor::new(
            storage.clone(),
            self.upload_ids,
            self.config.upload_chunk_size,
            self.config.key_uploads_by_id,
        );

        Ok(LifecycleService::new(
            classifier,
            storage,
            record_store,
            ingestor,
            self.ids,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use versa_core::StubClassifier;

    #[test]
    fn test_build_requires_classifier() {
        let result = VersaAppBuilder::<StubClassifier>::new(VersaConfig::default()).build();
        assert!(matches!(result, Err(VersaError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_connect_without_database_url_uses_memory() {
        let store = connect_record_store(&VersaConfig::default()).await.unwrap();
        assert!(store.list_model_versions().await.unwrap().is_empty());
    }
}
