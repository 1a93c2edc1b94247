//! Application setup and pipeline wiring.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Extension,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, Method,
    },
    middleware,
    routing::{get, post},
    Router,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::domains::notifications::dispatcher::NotificationDispatcher;
use crate::domains::processing::profiles::ResourceProfile;
use crate::domains::processing::worker::DocumentWorker;
use crate::kernel::ServerDeps;
use crate::server::middleware::auth_middleware;
use crate::server::routes::{
    cancel_job_handler, complete_upload_handler, health_handler, initiate_upload_handler,
    job_status_handler, list_jobs_handler,
};

/// How often the expiry sweep runs.
const PURGE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub deps: Arc<ServerDeps>,
}

/// Build the HTTP router.
pub fn build_app(deps: Arc<ServerDeps>) -> Router {
    let state = AppState { deps };

    let api = Router::new()
        .route("/api/uploads", post(initiate_upload_handler))
        .route("/api/uploads/complete", post(complete_upload_handler))
        .route("/api/jobs", get(list_jobs_handler))
        .route("/api/jobs/:id", get(job_status_handler))
        .route("/api/jobs/:id/cancel", post(cancel_job_handler))
        .route_layer(middleware::from_fn(auth_middleware));

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-user-id"),
        ])
        .allow_origin(Any);

    Router::new()
        .route("/health", get(health_handler))
        .merge(api)
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Spawn the background half of the pipeline: both worker tiers, the
/// notification dispatcher, and the expiry sweep. All tasks stop when the
/// shutdown token fires.
pub fn spawn_pipeline(deps: Arc<ServerDeps>, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    for profile in [ResourceProfile::standard(), ResourceProfile::high_memory()] {
        let tier = profile.tier;
        let consumer = DocumentWorker::new(deps.clone(), profile).consumer();
        let token = shutdown.clone();
        handles.push(tokio::spawn(async move {
            info!(?tier, "worker pool starting");
            consumer.run(token).await;
        }));
    }

    {
        let consumer = NotificationDispatcher::new(deps.mailer.clone())
            .consumer(deps.queues.notifications.clone());
        let token = shutdown.clone();
        handles.push(tokio::spawn(async move {
            info!("notification dispatcher starting");
            consumer.run(token).await;
        }));
    }

    {
        let deps = deps.clone();
        let token = shutdown;
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PURGE_INTERVAL);
            ticker.tick().await; // skip the immediate tick
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = deps.job_store.purge_expired(chrono::Utc::now()).await {
                            error!(error = %e, "expiry sweep failed");
                        }
                    }
                }
            }
        }));
    }

    handles
}
