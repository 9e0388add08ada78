//! donation-gateway server entry point.
//!
//! Wires the ledger backend, the payment providers and the services
//! together and starts the Axum HTTP server.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use donation_gateway::api;
use donation_gateway::app_state::AppState;
use donation_gateway::config::{GatewayConfig, LedgerBackend};
use donation_gateway::ledger::{LedgerStore, MemoryLedger, PostgresLedger};
use donation_gateway::provider::pix::{PixCredentials, PixRestClient};
use donation_gateway::provider::StripeClient;
use donation_gateway::service::{
    spawn_poll_worker, PaymentService, PixService, PollDispatcher, Reconciler,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = GatewayConfig::from_env()?;
    tracing::info!(addr = %config.listen_addr, "starting donation-gateway");

    // Build the ledger backend
    let ledger: Arc<dyn LedgerStore> = match config.ledger_backend {
        LedgerBackend::Memory => {
            tracing::warn!("using the in-memory ledger, data will not survive a restart");
            Arc::new(MemoryLedger::new())
        }
        LedgerBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
                .connect(&config.database_url)
                .await?;
            let ledger = PostgresLedger::new(pool);
            ledger.ensure_schema().await?;
            Arc::new(ledger)
        }
    };

    // Build the providers
    let stripe = Arc::new(StripeClient::new(
        config.stripe_secret_key.clone(),
        config.stripe_api_base.clone(),
    ));
    let pix_client = Arc::new(PixRestClient::new(PixCredentials {
        base_url: config.pix_base_url.clone(),
        access_token: config.pix_access_token.clone(),
        timeout_secs: config.pix_timeout_secs,
    })?);

    // Build the service layer and the poll worker
    let (dispatcher, queue) = PollDispatcher::channel(config.poll_queue_capacity);
    let pix = Arc::new(PixService::new(
        Arc::clone(&ledger),
        pix_client,
        dispatcher,
        config.poll_schedule,
        config.platform_fee_bps,
    ));
    spawn_poll_worker(queue, Arc::clone(&pix));

    let payments = Arc::new(PaymentService::new(Arc::clone(&ledger), stripe));
    let reconciler = Arc::new(Reconciler::new(Arc::clone(&ledger)));

    let app_state = AppState {
        payments,
        reconciler,
        pix,
        monitor_access_key: config.monitor_access_key.clone(),
    };

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
