//! Transactional relational store behind the registry, ledger and outcome store

pub mod error;
pub mod in_memory_store;
pub mod postgres_store;
pub mod store;

pub use error::{RecordError, Result};
pub use in_memory_store::InMemoryRecordStore;
pub use postgres_store::PostgresRecordStore;
pub use store::{RecordStore, RecordTransaction};
