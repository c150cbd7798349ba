use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display, EnumString};
use uuid::Uuid;

use crate::model_version::ModelVersionId;

/// NewType pattern for operation ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of lifecycle operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Train,
    Evaluate,
    Predict,
}

/// One invocation of train, evaluate or predict against a model version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub time: DateTime<Utc>,
    pub model_version_id: ModelVersionId,
}

impl Operation {
    pub fn new(kind: OperationKind, model_version_id: ModelVersionId) -> Self {
        Self {
            id: OperationId::new(),
            kind,
            time: Utc::now(),
            model_version_id,
        }
    }
}

/// Result of an evaluate operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluateOutcome {
    pub id: Uuid,
    pub operation_id: OperationId,
    pub input_ref: String,
    pub loss: f64,
    pub accuracy: f64,
}

/// Result of a predict operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictOutcome {
    pub id: Uuid,
    pub operation_id: OperationId,
    pub input_ref: String,
    pub label: String,
}

/// Output column of a history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HistoryOutput {
    Evaluation { loss: f64, accuracy: f64 },
    Prediction { label: String },
}

/// An evaluate or predict operation joined with its outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub kind: OperationKind,
    pub time: DateTime<Utc>,
    pub model_version_id: ModelVersionId,
    pub input_ref: String,
    pub output: HistoryOutput,
}
