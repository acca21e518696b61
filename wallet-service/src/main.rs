use axum::{
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wallet_common::WalletConfig;

use wallet_service::cache::WalletCache;
use wallet_service::handlers::{self, AppState};
use wallet_service::outbox::{OutboxPublisher, OutboxPump};
use wallet_service::query::{QueryService, ReadReplica};
use wallet_service::repository::WalletRepository;
use wallet_service::resilience::Resilience;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wallet_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WalletConfig::from_env();
    let server_port = WalletConfig::server_port(3000);

    tracing::info!("starting wallet-service");

    let write_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.write_database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&write_pool).await?;

    let read_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.read_database_url)
        .await?;

    let cache = WalletCache::connect(&config.cache_url, config.cache_ttl).await?;

    let repository = WalletRepository::new(write_pool.clone());
    let read_replica = ReadReplica::new(read_pool);
    let query_service = Arc::new(QueryService::new(cache, read_replica, repository.clone()));
    let resilience = Arc::new(Resilience::new(config.clone()));

    // Install the Prometheus metrics recorder for the retry/exhaustion
    // counters and the outbox publish counters.
    if let Err(err) = metrics_exporter_prometheus::PrometheusBuilder::new().install() {
        tracing::warn!(error = %err, "failed to install prometheus recorder");
    }

    let publisher = OutboxPublisher::new(&config.kafka_brokers, config.kafka_topic.clone())?;
    let pump = OutboxPump::new(
        write_pool,
        publisher,
        config.outbox_batch_size,
        config.outbox_interval,
        config.publish_deadline,
        config.outbox_lease_ttl,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(pump.run(shutdown_rx));

    let state = AppState {
        repository,
        resilience,
        query_service,
    };

    let app = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/wallets", post(handlers::create_wallet))
        .route("/wallets/:wallet_id", get(handlers::get_wallet))
        .route("/users/:user_id/wallets", get(handlers::get_user_wallets))
        .route("/wallets/:wallet_id/deposit", post(handlers::deposit))
        .route("/wallets/:wallet_id/withdraw", post(handlers::withdraw))
        .route("/wallets/:wallet_id/transfer", post(handlers::transfer))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{server_port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "wallet-service listening");

    axum::serve(listener, app).await?;

    let _ = shutdown_tx.send(true);
    Ok(())
}
