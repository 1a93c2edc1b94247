//! Durable job store.
//!
//! The store is the single source of truth for job state: any number of
//! pollers and observers converge on whatever is written here, never on
//! queue contents. Implementations must uphold the monotonic-status
//! invariant - `update` rejects writes that would regress a job's status or
//! resurrect a terminal one, so no caller can violate it by racing.
//!
//! `PostgresJobStore` backs production; `InMemoryJobStore` backs tests and
//! single-node deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use super::models::{Job, JobStatus};

/// Errors from job store operations.
#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("job {job_id} not found")]
    NotFound { job_id: Uuid },

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Trait for job persistence operations.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a freshly created job.
    async fn insert(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Fetch a job by ID. Expired-but-unpurged records are still returned;
    /// callers decide whether expiry means not-found for them.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>, JobStoreError>;

    /// Write a job back. The status may stay the same (progress snapshots,
    /// counters) or move forward; regressions and writes to a terminal
    /// record are rejected with `InvalidTransition`.
    async fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// All jobs owned by a user, newest first.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Job>, JobStoreError>;

    /// Job counts per status, for health/ops visibility.
    async fn count_by_status(&self) -> Result<Vec<(JobStatus, i64)>, JobStoreError>;

    /// Increment and return the job's poll counter.
    async fn record_poll(&self, job_id: Uuid) -> Result<i32, JobStoreError>;

    /// Delete records whose `ttl` has passed, regardless of status.
    /// Returns the number purged.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, JobStoreError>;
}

/// Whether a stored status may be overwritten with `next`.
fn write_allowed(current: JobStatus, next: JobStatus) -> bool {
    current == next || current.can_transition_to(next)
}

// ============================================================================
// In-memory implementation
// ============================================================================

/// Lock-free in-memory store.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: DashMap<Uuid, Job>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: &Job) -> Result<(), JobStoreError> {
        self.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>, JobStoreError> {
        Ok(self.jobs.get(&job_id).map(|entry| entry.value().clone()))
    }

    async fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut entry = self
            .jobs
            .get_mut(&job.id)
            .ok_or(JobStoreError::NotFound { job_id: job.id })?;

        if !write_allowed(entry.status, job.status) {
            return Err(JobStoreError::InvalidTransition {
                from: entry.status,
                to: job.status,
            });
        }

        *entry = job.clone();
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Job>, JobStoreError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn count_by_status(&self) -> Result<Vec<(JobStatus, i64)>, JobStoreError> {
        let mut counts: HashMap<JobStatus, i64> = HashMap::new();
        for entry in self.jobs.iter() {
            *counts.entry(entry.status).or_default() += 1;
        }
        let mut result: Vec<_> = counts.into_iter().collect();
        result.sort_by_key(|(status, _)| status.as_str());
        Ok(result)
    }

    async fn record_poll(&self, job_id: Uuid) -> Result<i32, JobStoreError> {
        let mut entry = self
            .jobs
            .get_mut(&job_id)
            .ok_or(JobStoreError::NotFound { job_id })?;
        entry.poll_attempts += 1;
        Ok(entry.poll_attempts)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, JobStoreError> {
        let before = self.jobs.len();
        self.jobs.retain(|_, job| !job.is_expired(now));
        Ok((before - self.jobs.len()) as u64)
    }
}

// ============================================================================
// PostgreSQL implementation
// ============================================================================

/// Raw row shape; JSON columns are converted at the boundary.
#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    user_id: Uuid,
    file_name: String,
    file_size: i64,
    file_type: String,
    processing_options: serde_json::Value,
    upload_id: Option<String>,
    storage_key: Option<String>,
    status: JobStatus,
    partial_content: Option<String>,
    poll_attempts: i32,
    delivery_attempts: i32,
    response_data: Option<serde_json::Value>,
    error_message: Option<String>,
    notify_email: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    ttl: DateTime<Utc>,
}

impl JobRow {
    fn into_job(self) -> Result<Job, JobStoreError> {
        Ok(Job {
            id: self.id,
            user_id: self.user_id,
            file_name: self.file_name,
            file_size: self.file_size,
            file_type: self.file_type,
            processing_options: serde_json::from_value(self.processing_options)?,
            upload_id: self.upload_id,
            storage_key: self.storage_key,
            status: self.status,
            partial_content: self.partial_content,
            poll_attempts: self.poll_attempts,
            delivery_attempts: self.delivery_attempts,
            response_data: self
                .response_data
                .map(serde_json::from_value)
                .transpose()?,
            error_message: self.error_message,
            notify_email: self.notify_email,
            created_at: self.created_at,
            updated_at: self.updated_at,
            ttl: self.ttl,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, user_id, file_name, file_size, file_type, processing_options,
           upload_id, storage_key, status, partial_content, poll_attempts,
           delivery_attempts, response_data, error_message, notify_email,
           created_at, updated_at, ttl
    FROM jobs
"#;

/// Maps the status enum to its rank inside SQL, for the monotonic guard.
const STATUS_RANK_SQL: &str = r#"
    CASE status
        WHEN 'pending' THEN 0
        WHEN 'uploading' THEN 1
        WHEN 'processing' THEN 2
        WHEN 'streaming' THEN 3
        ELSE 4
    END
"#;

/// PostgreSQL-backed job store.
pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn insert(&self, job: &Job) -> Result<(), JobStoreError> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, user_id, file_name, file_size, file_type,
                              processing_options, upload_id, storage_key, status,
                              partial_content, poll_attempts, delivery_attempts,
                              response_data, error_message, notify_email,
                              created_at, updated_at, ttl)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(job.id)
        .bind(job.user_id)
        .bind(&job.file_name)
        .bind(job.file_size)
        .bind(&job.file_type)
        .bind(serde_json::to_value(&job.processing_options)?)
        .bind(&job.upload_id)
        .bind(&job.storage_key)
        .bind(job.status)
        .bind(&job.partial_content)
        .bind(job.poll_attempts)
        .bind(job.delivery_attempts)
        .bind(
            job.response_data
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(&job.error_message)
        .bind(&job.notify_email)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.ttl)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>, JobStoreError> {
        let row = sqlx::query_as::<_, JobRow>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(JobRow::into_job).transpose()
    }

    async fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        // The WHERE clause enforces monotonicity at the database: the write
        // only lands if the stored status equals the new one or ranks
        // strictly below it and is not terminal.
        let result = sqlx::query(&format!(
            r#"
            UPDATE jobs
            SET status = $2,
                partial_content = $3,
                poll_attempts = $4,
                delivery_attempts = $5,
                response_data = $6,
                error_message = $7,
                upload_id = $8,
                storage_key = $9,
                updated_at = $10,
                ttl = $11
            WHERE id = $1
              AND (status = $2
                   OR (status NOT IN ('completed', 'failed', 'cancelled')
                       AND {STATUS_RANK_SQL} < $12))
            "#
        ))
        .bind(job.id)
        .bind(job.status)
        .bind(&job.partial_content)
        .bind(job.poll_attempts)
        .bind(job.delivery_attempts)
        .bind(
            job.response_data
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(&job.error_message)
        .bind(&job.upload_id)
        .bind(&job.storage_key)
        .bind(job.updated_at)
        .bind(job.ttl)
        .bind(status_rank(job.status))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish a missing record from a rejected transition.
            let current = self.get(job.id).await?;
            return match current {
                None => Err(JobStoreError::NotFound { job_id: job.id }),
                Some(existing) => Err(JobStoreError::InvalidTransition {
                    from: existing.status,
                    to: job.status,
                }),
            };
        }

        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Job>, JobStoreError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "{SELECT_COLUMNS} WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn count_by_status(&self) -> Result<Vec<(JobStatus, i64)>, JobStoreError> {
        let counts = sqlx::query_as::<_, (JobStatus, i64)>(
            "SELECT status, COUNT(*) FROM jobs GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(counts)
    }

    async fn record_poll(&self, job_id: Uuid) -> Result<i32, JobStoreError> {
        let attempts: Option<(i32,)> = sqlx::query_as(
            "UPDATE jobs SET poll_attempts = poll_attempts + 1 WHERE id = $1 RETURNING poll_attempts",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        attempts
            .map(|(n,)| n)
            .ok_or(JobStoreError::NotFound { job_id })
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, JobStoreError> {
        let result = sqlx::query("DELETE FROM jobs WHERE ttl <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        let purged = result.rows_affected();
        if purged > 0 {
            info!(purged, "purged expired job records");
        }
        Ok(purged)
    }
}

fn status_rank(status: JobStatus) -> i32 {
    match status {
        JobStatus::Pending => 0,
        JobStatus::Uploading => 1,
        JobStatus::Processing => 2,
        JobStatus::Streaming => 3,
        JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => 4,
    }
}
