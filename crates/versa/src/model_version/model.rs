use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use versa_core::ClassIndexMap;

/// NewType pattern for model version ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelVersionId(Uuid);

impl ModelVersionId {
    /// Create a new random ModelVersionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Storage key of the promoted artifact
    pub fn artifact_key(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ModelVersionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ModelVersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A trained model registered under a unique version name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub id: ModelVersionId,
    pub version: String,
    pub class_map: ClassIndexMap,
    pub created_at: DateTime<Utc>,
}

impl ModelVersion {
    pub fn new(id: ModelVersionId, version: impl Into<String>, class_map: ClassIndexMap) -> Self {
        Self {
            id,
            version: version.into(),
            class_map,
            created_at: Utc::now(),
        }
    }
}

/// Listing view of a model version, without its class map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersionSummary {
    pub id: ModelVersionId,
    pub version: String,
    pub created_at: DateTime<Utc>,
}

impl From<&ModelVersion> for ModelVersionSummary {
    fn from(model: &ModelVersion) -> Self {
        Self {
            id: model.id,
            version: model.version.clone(),
            created_at: model.created_at,
        }
    }
}
