use axum::{routing::get, Router};
use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wallet_common::WalletConfig;

use history_service::consumer::EventConsumer;
use history_service::handlers::{self, AppState};
use history_service::repository::HistoryRepository;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "history_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WalletConfig::from_env();
    let server_port = WalletConfig::server_port(3001);

    tracing::info!("starting history-service");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.read_database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    if let Err(err) = metrics_exporter_prometheus::PrometheusBuilder::new().install() {
        tracing::warn!(error = %err, "failed to install prometheus recorder");
    }

    let repository = HistoryRepository::new(pool);

    let consumer = EventConsumer::new(
        &config.kafka_brokers,
        &config.kafka_group_id,
        &config.kafka_topic,
        repository.clone(),
        config.projector_event_deadline,
    )?;

    tokio::spawn(consumer.run());

    let state = AppState { repository };

    let app = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/wallets/:wallet_id/history", get(handlers::get_wallet_history))
        .route(
            "/wallets/:wallet_id/balance-history",
            get(handlers::get_historical_balance),
        )
        .route("/users/:user_id/activity", get(handlers::get_user_activity))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{server_port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "history-service listening");

    axum::serve(listener, app).await?;

    Ok(())
}
