// Main entry point for the pipeline server

use std::sync::Arc;

use anyhow::{Context, Result};
use mailgun::{MailgunOptions, MailgunService};
use server_core::domains::notifications::templates::NotificationLinks;
use server_core::domains::processing::router::ProcessingQueues;
use server_core::kernel::traits::BaseMailer;
use server_core::kernel::{EchoProcessor, InMemoryObjectStore, MailgunAdapter, ServerDeps};
use server_core::server::app::{build_app, spawn_pipeline};
use server_core::Config;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Docpipe processing pipeline");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    // Email provider: Mailgun when configured, log-only otherwise.
    let mailer: Arc<dyn BaseMailer> = match (&config.mailgun_api_key, &config.mailgun_domain) {
        (Some(api_key), Some(domain)) => Arc::new(MailgunAdapter::new(Arc::new(
            MailgunService::new(MailgunOptions {
                api_key: api_key.clone(),
                domain: domain.clone(),
                sender: config.mail_sender.clone(),
            }),
        ))),
        _ => {
            tracing::warn!("MAILGUN_API_KEY/MAILGUN_DOMAIN not set, notifications are log-only");
            Arc::new(LogOnlyMailer)
        }
    };

    // The object store and extraction engine are external collaborators; the
    // dev wiring runs both in process.
    tracing::warn!("using in-memory object store and stub processor (dev wiring)");

    let deps = Arc::new(ServerDeps {
        job_store: Arc::new(server_core::domains::jobs::PostgresJobStore::new(pool)),
        object_store: Arc::new(InMemoryObjectStore::new()),
        mailer,
        processor: Arc::new(EchoProcessor),
        queues: Arc::new(ProcessingQueues::with_defaults()),
        upload_bucket: config.upload_bucket.clone(),
        large_file_threshold: config.large_file_threshold,
        job_retention: config.job_retention,
        notification_links: NotificationLinks::from_base_url(&config.app_base_url),
        admin_user_ids: config.admin_user_ids.clone(),
    });

    // Background half of the pipeline: worker pools, dispatcher, expiry sweep.
    let shutdown = CancellationToken::new();
    let background = spawn_pipeline(deps.clone(), shutdown.clone());

    // HTTP server
    let app = build_app(deps);
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("Server error")?;

    // Drain background tasks before exiting.
    shutdown.cancel();
    for handle in background {
        let _ = handle.await;
    }

    Ok(())
}

/// Fallback mailer that records notifications in the log stream.
struct LogOnlyMailer;

#[async_trait::async_trait]
impl BaseMailer for LogOnlyMailer {
    async fn send(&self, email: &server_core::kernel::traits::RenderedEmail) -> Result<()> {
        tracing::info!(to = %email.to, subject = %email.subject, "notification (log-only)");
        Ok(())
    }
}
