pub mod jobs;
pub mod notifications;
pub mod processing;
pub mod uploads;
