use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;
use uuid::Uuid;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Bucket receiving multipart uploads.
    pub upload_bucket: String,
    /// Files at or above this size route to the high-memory queue.
    pub large_file_threshold: u64,
    /// How long job records are retained after their last status change.
    pub job_retention: Duration,
    pub mailgun_api_key: Option<String>,
    pub mailgun_domain: Option<String>,
    pub mail_sender: String,
    /// Base URL for links embedded in notification emails.
    pub app_base_url: String,
    /// Users allowed to query and cancel jobs they do not own.
    pub admin_user_ids: Vec<Uuid>,
}

/// Default large-file threshold: 50 MB.
const DEFAULT_LARGE_FILE_THRESHOLD: u64 = 50 * 1024 * 1024;

/// Default job retention window: 48 hours.
const DEFAULT_RETENTION_HOURS: u64 = 48;

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            upload_bucket: env::var("UPLOAD_BUCKET")
                .unwrap_or_else(|_| "docpipe-uploads".to_string()),
            large_file_threshold: env::var("LARGE_FILE_THRESHOLD_BYTES")
                .ok()
                .map(|v| v.parse().context("LARGE_FILE_THRESHOLD_BYTES must be a number"))
                .transpose()?
                .unwrap_or(DEFAULT_LARGE_FILE_THRESHOLD),
            job_retention: Duration::from_secs(
                3600 * env::var("JOB_RETENTION_HOURS")
                    .ok()
                    .map(|v| v.parse::<u64>().context("JOB_RETENTION_HOURS must be a number"))
                    .transpose()?
                    .unwrap_or(DEFAULT_RETENTION_HOURS),
            ),
            mailgun_api_key: env::var("MAILGUN_API_KEY").ok(),
            mailgun_domain: env::var("MAILGUN_DOMAIN").ok(),
            mail_sender: env::var("MAIL_SENDER")
                .unwrap_or_else(|_| "Docpipe <no-reply@docpipe.io>".to_string()),
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            admin_user_ids: env::var("ADMIN_USER_IDS")
                .ok()
                .map(|raw| {
                    raw.split(',')
                        .filter(|s| !s.trim().is_empty())
                        .map(|s| Uuid::parse_str(s.trim()).context("ADMIN_USER_IDS must be UUIDs"))
                        .collect::<Result<Vec<_>>>()
                })
                .transpose()?
                .unwrap_or_default(),
        })
    }
}
