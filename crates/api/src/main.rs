use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coursecast_api::config::ServerConfig;
use coursecast_api::router::build_app_router;
use coursecast_api::state::AppState;
use coursecast_api::{background, ws};
use coursecast_core::clock::{Clock, SystemClock};
use coursecast_core::preferences::DigestWindow;
use coursecast_core::scheduling::TriggerJob;
use coursecast_db::{PgStore, Stores};
use coursecast_events::delivery::email::{EmailConfig, SmtpEmailSender};
use coursecast_events::{DeliveryConfig, EmailSender, NotificationCore};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    init_tracing();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        quiet_hours_clock = %config.delivery.quiet_hours_clock,
        "Loaded server configuration"
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = coursecast_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    coursecast_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    coursecast_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let stores = Stores::from_shared(Arc::new(PgStore::new(pool.clone())));

    // --- Email ---
    let email: Option<Arc<dyn EmailSender>> = match EmailConfig::from_env() {
        Some(email_config) => {
            let sender =
                SmtpEmailSender::new(&email_config).expect("Invalid SMTP configuration");
            tracing::info!(host = %email_config.smtp_host, "Email channel enabled");
            Some(Arc::new(sender) as Arc<dyn EmailSender>)
        }
        None => {
            tracing::warn!("SMTP_HOST not set, email channel disabled");
            None
        }
    };

    // --- WebSocket manager ---
    let cancel = CancellationToken::new();
    let ws_manager = Arc::new(ws::WsManager::new());
    let heartbeat_handle = ws::start_heartbeat(
        Arc::clone(&ws_manager),
        config.heartbeat_interval,
        cancel.child_token(),
    );

    // --- Notification core ---
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let core = Arc::new(NotificationCore::new(
        stores,
        ws_manager.clone(),
        email,
        config.delivery.clone(),
        clock,
        config.email_links(),
    ));

    // --- Background loops ---
    let loop_handles = spawn_loops(&core, &config.delivery, &cancel);
    tracing::info!(loops = loop_handles.len(), "Background loops started");

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        core: Arc::clone(&core),
        ws_manager: Arc::clone(&ws_manager),
        pool: Some(pool),
    };

    let app = build_app_router(state);

    // --- Start server ---
    let addr = config.bind_addr().expect("HOST must be an IP address");
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    let shutdown_timeout = config.shutdown_timeout;

    cancel.cancel();
    if tokio::time::timeout(shutdown_timeout, futures::future::join_all(loop_handles))
        .await
        .is_err()
    {
        tracing::warn!("Background loops did not stop in time");
    }
    tracing::info!("Background loops stopped");

    // Pending debounced events go out before the sockets close.
    core.broadcaster.shutdown().await;

    let in_flight = core.tasks.in_flight();
    if tokio::time::timeout(shutdown_timeout, core.tasks.wait_idle())
        .await
        .is_err()
    {
        tracing::warn!(in_flight, "Abandoning in-flight email deliveries");
    }

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    if let Err(e) = heartbeat_handle.await {
        tracing::warn!(error = %e, "Heartbeat task ended abnormally");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Install the global subscriber. `LOG_FORMAT=json` selects JSON output.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "coursecast_api=debug,coursecast_events=debug,tower_http=debug".into()
    });
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Spawn every periodic loop under `cancel`: the deferred sweep, both digest
/// windows, retention and the four trigger jobs.
fn spawn_loops(
    core: &Arc<NotificationCore>,
    config: &DeliveryConfig,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    let sweeper = Arc::clone(&core.sweeper);
    let (interval, token) = (config.sweep_interval, cancel.clone());
    handles.push(tokio::spawn(async move { sweeper.run(interval, token).await }));

    for window in [DigestWindow::Daily, DigestWindow::Weekly] {
        let digests = Arc::clone(&core.digests);
        let (interval, token) = (config.digest_poll_interval, cancel.clone());
        handles.push(tokio::spawn(async move {
            digests.run(window, interval, token).await
        }));
    }

    handles.push(tokio::spawn(background::retention::run(
        Arc::clone(core),
        config.retention_interval,
        cancel.clone(),
    )));

    for job in TriggerJob::ALL {
        let triggers = Arc::clone(&core.triggers);
        let token = cancel.clone();
        handles.push(tokio::spawn(async move { triggers.run(job, token).await }));
    }

    handles
}

/// Wait for SIGINT or SIGTERM to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
