use axum::{routing::get, Router};
use secrecy::ExposeSecret;
use std::{net::SocketAddr, sync::Arc};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gym_reservations::api::middleware::session::{create_session_layer, AppState};
use gym_reservations::config::Config;
use gym_reservations::db::{self, PgStore, ReservationStore};
use gym_reservations::jobs::credit_renewal;
use gym_reservations::services::ReservationCoordinator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gym_reservations=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting reservation server...");

    // Load configuration
    let config = Config::from_env()?;
    let calendar = config.calendar()?;
    tracing::info!(
        utc_offset_minutes = config.utc_offset_minutes,
        daily_reservation_limit = config.daily_reservation_limit,
        "Configuration loaded successfully"
    );

    // Create database pool
    let pool = db::create_pool(config.database_url.expose_secret()).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let store: Arc<dyn ReservationStore> = Arc::new(PgStore::new(pool.clone()));
    let coordinator = ReservationCoordinator::new(store.clone(), calendar)
        .with_daily_limit(config.daily_reservation_limit);

    // Optional reconciliation sweep; keep the scheduler alive for the server's lifetime
    let _scheduler = match &config.reconcile_cron {
        Some(schedule) => Some(
            credit_renewal::start_scheduler(
                store.clone(),
                coordinator.ledger().clone(),
                schedule,
                config.reconcile_batch_size,
            )
            .await?,
        ),
        None => {
            tracing::info!("Reconciliation sweep disabled");
            None
        }
    };

    // Create session layer
    let session_layer = create_session_layer(pool.clone(), config.secure_cookies).await?;
    tracing::info!("Session layer initialized");

    // Build application state
    let state = AppState {
        pool: pool.clone(),
        coordinator: Arc::new(coordinator),
    };

    // Build router
    let app = Router::new()
        .route("/health", get(gym_reservations::api::health::health_check))
        .merge(gym_reservations::api::reservations::router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(session_layer),
        )
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, cleaning up...");
}
