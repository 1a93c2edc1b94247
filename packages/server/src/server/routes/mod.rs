pub mod health;
pub mod jobs;
pub mod uploads;

pub use health::health_handler;
pub use jobs::{cancel_job_handler, job_status_handler, list_jobs_handler};
pub use uploads::{complete_upload_handler, initiate_upload_handler};
