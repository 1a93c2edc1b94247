pub mod models;
pub mod store;

pub use models::{Job, JobStatus, ProcessingOptions, ResponseData, UsageMetadata};
pub use store::{InMemoryJobStore, JobStore, JobStoreError, PostgresJobStore};
