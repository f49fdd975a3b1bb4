use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing::info;

use bankx_ledger::config::Settings;
use bankx_ledger::events::{KafkaConfig, KafkaPublisher, OutboxRelay, RelayConfig};
use bankx_ledger::observability::{init_logging, LogFormat};
use bankx_ledger::store::PgStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let settings = Settings::new()?;
    init_logging(
        &settings.application.log_level,
        LogFormat::from(settings.application.log_format.as_str()),
    );
    info!("configuration loaded");

    let pool = PgPoolOptions::new()
        .max_connections(settings.database.pool_size)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&settings.database.url)
        .await?;
    info!("database connection established");

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("migrations applied");

    let store = Arc::new(PgStore::new(pool));
    let publisher = Arc::new(KafkaPublisher::connect(KafkaConfig::from(&settings.kafka)).await?);

    let relay = OutboxRelay::new(store, publisher, RelayConfig::from(&settings.relay));
    tokio::spawn(relay.run());
    info!("outbox relay running");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}
