// Main entry point for the submission server

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use submission_core::domains::submissions::models::PostgresSubmissionStore;
use submission_core::kernel::{
    start_dispatch_scheduler, FsArtifactStaging, FtpDelivery, LifecycleSettings, ServerDeps,
};
use submission_core::server::{build_app, AppState};
use submission_core::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,submission_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting submission server");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let connect_options: PgConnectOptions = config
        .database_url
        .parse()
        .context("DATABASE_URL is not a valid Postgres URL")?;
    let connect_options = connect_options.options([(
        "statement_timeout",
        config.store_timeout.as_millis().to_string(),
    )]);
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.store_timeout)
        .connect_with(connect_options)
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

    // Build dependencies
    let deps = Arc::new(ServerDeps::new(
        Arc::new(PostgresSubmissionStore::new(pool.clone())),
        Arc::new(FsArtifactStaging::new(
            config.staging_dir.clone(),
            config.artifact_extension.clone(),
        )),
        Arc::new(FtpDelivery::new(config.ftp.clone(), config.delivery_timeout)),
        LifecycleSettings::from_config(&config),
    ));

    // Optional in-process dispatch trigger
    let _scheduler = match config.dispatch_schedule.as_deref() {
        Some(schedule) => Some(
            start_dispatch_scheduler(deps.clone(), schedule)
                .await
                .context("Failed to start dispatch scheduler")?,
        ),
        None => {
            tracing::info!("No DISPATCH_SCHEDULE set, dispatch runs only via GET /new");
            None
        }
    };

    // Build application
    let app = build_app(
        AppState::new(deps, Some(pool)),
        &config.allowed_origins,
        config.rate_limit,
    );

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}
