//! Ledger Webhook Server
//!
//! Receives billing-processor events and applies them to the ledger.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin ledger-webhook
//! ```
//!
//! # Environment Variables
//!
//! * `LEDGER_HOST` - Server host (default: 0.0.0.0)
//! * `LEDGER_PORT` - Server port (default: 8080)
//! * `LEDGER_DATABASE_URL` - PostgreSQL connection string
//! * `LEDGER_WEBHOOK_SECRET` - Endpoint signing secret
//! * `LEDGER_STRIPE_API_KEY` - Secret key for customer lookups
//! * `LEDGER_LOCK_TIMEOUT_MS` - Bound on per-identity lock waits (default: 5000)
//! * `LEDGER_LOG_LEVEL` - trace, debug, info, warn, error (default: info)
//! * `LEDGER_LOG_FORMAT` - plain or json (default: plain)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use domain_billing::LedgerService;
use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresBillingStore};
use interface_api::config::{ApiConfig, LogFormat};
use interface_api::identity::{CustomerApiConfig, StripeCustomerDirectory};
use interface_api::{create_router, AppState};

const CUSTOMER_API_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = ApiConfig::from_env().context("invalid LEDGER_* configuration")?;

    init_tracing(&config.log_level, config.log_format);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        "Starting ledger webhook server"
    );
    if config.webhook_secret.is_empty() {
        tracing::warn!("LEDGER_WEBHOOK_SECRET is empty; every delivery will fail verification");
    }

    let pool_config = DatabaseConfig::new(&config.database_url)
        .max_connections(config.max_connections)
        .acquire_timeout(config.lock_timeout());
    let pool = create_pool(pool_config)
        .await
        .context("failed to connect to the ledger database")?;
    run_migrations(&pool).await.context("failed to run migrations")?;

    let store = PostgresBillingStore::new(pool).with_lock_timeout(config.lock_timeout());
    let directory = StripeCustomerDirectory::new(CustomerApiConfig {
        api_base: config.stripe_api_base.clone(),
        api_key: config.stripe_api_key.clone(),
        timeout: CUSTOMER_API_TIMEOUT,
    })?;

    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .with_context(|| format!("invalid listen address {}", config.server_addr()))?;
    let app = create_router(AppState::new(
        LedgerService::new(Arc::new(store)),
        Arc::new(directory),
        config,
    ));

    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_tracing(log_level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init(),
        LogFormat::Plain => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init(),
    }
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
