use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::server::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    job_store: JobStoreHealth,
    queues: QueueHealth,
}

#[derive(Serialize)]
pub struct JobStoreHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    job_counts: Vec<StatusCount>,
}

#[derive(Serialize)]
pub struct StatusCount {
    status: String,
    count: i64,
}

#[derive(Serialize)]
pub struct QueueHealth {
    standard_depth: usize,
    high_memory_depth: usize,
    processing_dlq_depth: usize,
    notifications_depth: usize,
    notifications_dlq_depth: usize,
}

/// Health check endpoint
///
/// Checks:
/// - Job store connectivity (via the status-count query)
/// - Queue depths, including both dead-letter queues
///
/// Returns 200 OK if the store responds, 503 Service Unavailable otherwise.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let store_health = match tokio::time::timeout(
        std::time::Duration::from_secs(5),
        state.deps.job_store.count_by_status(),
    )
    .await
    {
        Ok(Ok(counts)) => JobStoreHealth {
            status: "ok".to_string(),
            error: None,
            job_counts: counts
                .into_iter()
                .map(|(status, count)| StatusCount {
                    status: status.as_str().to_string(),
                    count,
                })
                .collect(),
        },
        Ok(Err(e)) => JobStoreHealth {
            status: "error".to_string(),
            error: Some(format!("Query failed: {}", e)),
            job_counts: Vec::new(),
        },
        Err(_) => JobStoreHealth {
            status: "error".to_string(),
            error: Some("Query timeout (>5s)".to_string()),
            job_counts: Vec::new(),
        },
    };

    let queues = &state.deps.queues;
    let queue_health = QueueHealth {
        standard_depth: queues.standard.depth().await,
        high_memory_depth: queues.high_memory.depth().await,
        processing_dlq_depth: queues.processing_dlq.depth().await,
        notifications_depth: queues.notifications.depth().await,
        notifications_dlq_depth: queues.notifications_dlq.depth().await,
    };

    let is_healthy = store_health.status == "ok";
    let status_code = if is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if is_healthy { "healthy" } else { "unhealthy" }.to_string(),
            job_store: store_health,
            queues: queue_health,
        }),
    )
}
