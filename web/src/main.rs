//! Storefront HTTP server.
//!
//! This binary:
//! - Connects to `PostgreSQL` (inventory ledger, orders, addresses) and runs migrations
//! - Connects to Redis (carts)
//! - Starts the outbox relay that delivers deferred tasks
//! - Installs the Prometheus exporter
//! - Serves the HTTP API until Ctrl+C or SIGTERM
//!
//! # Usage
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/storefront REDIS_URL=redis://localhost cargo run --bin storefront-server
//! ```

use std::sync::Arc;
use std::time::Duration;
use storefront_core::environment::SystemClock;
use storefront_postgres::{PostgresAddressBook, PostgresOrderStore};
use storefront_redis::RedisCartStore;
use storefront_runtime::metrics::MetricsServer;
use storefront_runtime::tasks::LoggingTaskHandler;
use storefront_runtime::{Environment, Storefront, TaskRelay};
use storefront_web::{AppState, Config, HttpPaymentGateway, build_router};
use tokio::signal;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Upper bound for one gateway HTTP call.
const GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,storefront=debug,sqlx=warn,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting storefront server...");

    let config = Config::from_env()?;
    info!(
        redis = %config.redis.url,
        gateway = %config.payment.gateway_url,
        max_attempts = config.commit.max_attempts,
        "Configuration loaded"
    );

    // PostgreSQL: inventory ledger, orders, addresses
    let pool = storefront_postgres::connect(&config.postgres.url, config.postgres.max_connections).await?;
    storefront_postgres::migrate(&pool).await?;
    let order_store = Arc::new(PostgresOrderStore::new(pool.clone()));
    let addresses = Arc::new(PostgresAddressBook::new(pool));
    info!("PostgreSQL ready");

    // Redis: carts
    let carts = Arc::new(RedisCartStore::new(&config.redis.url).await?);
    carts.ping().await?;
    info!("Redis ready");

    let gateway = Arc::new(HttpPaymentGateway::new(&config.payment.gateway_url, GATEWAY_TIMEOUT)?);

    let settings = config.settings();
    let (stop_relay, relay_shutdown) = watch::channel(false);
    let relay = TaskRelay::new(
        Arc::clone(&order_store),
        Arc::new(LoggingTaskHandler),
        Arc::new(SystemClock),
        settings.relay.clone(),
    )
    .spawn(relay_shutdown);

    let env = Environment::new(carts, addresses, gateway);
    let storefront = Storefront::new(order_store, env, settings);

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    let local_addr = listener.local_addr()?;

    let mut metrics = MetricsServer::new(local_addr);
    metrics.start()?;

    let mut state = AppState::new(storefront);
    if let Some(handle) = metrics.handle() {
        state = state.with_metrics(handle.clone());
    }

    let app = build_router(state);
    info!(address = %local_addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Undelivered rows stay in the outbox for the next start.
    let _ = stop_relay.send(true);
    if tokio::time::timeout(Duration::from_secs(5), relay).await.is_err() {
        tracing::warn!("Task relay did not stop in time");
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
