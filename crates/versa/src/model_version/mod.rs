pub mod model;
pub mod service;

pub use model::{ModelVersion, ModelVersionId, ModelVersionSummary};
pub use service::ModelRegistry;
