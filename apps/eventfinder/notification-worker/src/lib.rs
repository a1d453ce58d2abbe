//! Notification Worker Service
//!
//! Delivers queued notifications: new-event pushes, event reminder emails
//! and generic pushes.
//!
//! ## Architecture
//!
//! ```text
//! Redis job store (notifications:*)
//!   ↓ claim (lease per attempt)
//! Worker<NotificationKind>
//!   ↓ dispatch by kind
//! Handlers ── PgDirectory (subscriptions, users, events)
//!   ↓
//! SMTP / push gateway
//! ```
//!
//! With `LIVE_NOTIFIER_ENABLED=true` the worker also subscribes to the
//! events channel and pushes new events immediately, without retries.
//!
//! ## Endpoints
//!
//! - Liveness: `/health`, `/healthz`
//! - Readiness: `/ready`, `/readyz`
//! - Prometheus metrics: `/metrics`
//! - Job admin: `/admin/jobs`, `/admin/jobs/stats`, `/admin/jobs/{id}`

pub mod settings;

use axum::Router;
use core_config::{AdminServerConfig, Environment, FromEnv};
use database::{
    postgres::PostgresConfig,
    redis::{open_client, RedisConfig},
};
use domain_notifications::{
    HandlerDeps, LiveNotifier, NotificationServiceConfig, PgDirectory, TemplateEngine,
};
use eyre::{Result, WrapErr};
use job_queue::{
    admin_router, init_metrics, AdminState, Clock, JobStore, QueueConfig, RedisJobStore,
    RedisRelay, SystemClock, Worker, WorkerConfig,
};
use settings::ServiceSettings;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, Level};

/// Health, metrics and job admin routes with request tracing
pub fn admin_app(state: AdminState) -> Router {
    admin_router(state).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
            .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
    )
}

/// Serve the admin app until `shutdown` flips
async fn start_admin_server(
    state: AdminState,
    config: AdminServerConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let addr = config.address();
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind admin server to {}", addr))?;

    info!(address = %addr, "Health and admin server listening");

    axum::serve(listener, admin_app(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .wrap_err("Admin server failed")?;

    Ok(())
}

/// Run the notification worker
///
/// 1. Installs error reporting, tracing and the Prometheus recorder
/// 2. Loads every config from the environment, failing fast on bad values
/// 3. Connects to PostgreSQL and Redis with retry
/// 4. Runs the worker (and optionally the live notifier) until SIGINT/SIGTERM
pub async fn run() -> Result<()> {
    core_config::tracing::install_color_eyre();

    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    init_metrics().wrap_err("Failed to install Prometheus recorder")?;

    let app_name = env!("CARGO_PKG_NAME");
    let app_version = env!("CARGO_PKG_VERSION");
    info!(name = app_name, version = app_version, environment = ?environment, "Starting notification worker");

    let admin_config =
        AdminServerConfig::from_env().wrap_err("Failed to load admin server configuration")?;
    let queue_config = QueueConfig::from_env().wrap_err("Failed to load queue configuration")?;
    let worker_config = WorkerConfig::from_env().wrap_err("Failed to load worker configuration")?;
    let service_config = NotificationServiceConfig::from_env()
        .wrap_err("Failed to load notification service configuration")?;
    let settings =
        ServiceSettings::from_env().wrap_err("Failed to load delivery configuration")?;

    let pg_config =
        PostgresConfig::from_env().wrap_err("Failed to load PostgreSQL configuration")?;
    info!("Connecting to PostgreSQL...");
    let db = database::postgres::connect_from_config_with_retry(pg_config, None)
        .await
        .wrap_err("Failed to connect to PostgreSQL")?;
    database::postgres::check_health(&db)
        .await
        .wrap_err("PostgreSQL did not answer SELECT 1")?;

    let redis_config = RedisConfig::from_env().wrap_err("Failed to load Redis configuration")?;
    let redis_client = open_client(&redis_config).wrap_err("Invalid Redis URL")?;
    info!("Connecting to Redis...");
    let mut redis = database::redis::connect_from_config_with_retry(redis_config, None)
        .await
        .wrap_err("Failed to connect to Redis")?;
    database::redis::check_health(&mut redis)
        .await
        .wrap_err("Redis did not answer PING")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store: Arc<dyn JobStore> = Arc::new(RedisJobStore::new(
        redis.clone(),
        queue_config.key_prefix.clone(),
        queue_config.retry.clone(),
        clock.clone(),
    ));

    let directory = Arc::new(PgDirectory::new(db));
    let deps = HandlerDeps {
        recipients: directory.clone(),
        users: directory.clone(),
        events: directory,
        email: settings
            .email_provider()
            .wrap_err("Failed to set up email delivery")?,
        push: settings
            .push_provider()
            .wrap_err("Failed to set up push delivery")?,
        templates: TemplateEngine::new().wrap_err("Failed to compile templates")?,
    };
    info!(
        email = deps.email.name(),
        push = deps.push.name(),
        key_prefix = %queue_config.key_prefix,
        max_attempts = queue_config.retry.max_attempts,
        "Delivery configured"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let admin_state = AdminState::new(store.clone(), app_name, app_version);
    let admin_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = start_admin_server(admin_state, admin_config, admin_shutdown).await {
            error!(error = %e, "Admin server failed");
        }
    });

    if service_config.live_notifier {
        let relay = Arc::new(RedisRelay::new(redis_client, redis.clone()));
        let live = LiveNotifier::new(
            relay,
            deps.new_event_handler(),
            service_config.events_channel.clone(),
        );
        let live_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = live.run(live_shutdown).await {
                error!(error = %e, "Live notifier stopped with error");
            }
        });
    }

    let worker = Worker::new(store, deps.registry(), clock, worker_config);
    worker
        .run(shutdown_rx)
        .await
        .wrap_err("Worker stopped with error")?;

    info!("Notification worker stopped");
    Ok(())
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating shutdown..."),
    }
}
