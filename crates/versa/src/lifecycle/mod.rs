//! Lifecycle orchestration: ingest, extract, invoke the classifier, persist

pub mod ingest;
pub mod service;
pub mod state;

pub use ingest::{DATASETS_DIR, IngestedFile, Ingestor, UPLOADS_DIR, Upload, sanitize_file_name};
pub use service::{
    EvaluationReport, Lifecycle, LifecycleService, PredictionReport, STAGING_DIR, TrainingReceipt,
};
pub use state::{Flow, LifecycleState};
