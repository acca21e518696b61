//! Outbox row access and the publisher pump.
//!
//! The pump is a plain Tokio background task driven by an explicit
//! `tokio::time::interval` and a cancellation signal — not a global
//! event-loop abstraction. Multiple pump processes are safe: a row is leased
//! with a conditional `UPDATE ... SET leased_at = now() WHERE ...` before
//! it's published, and `processed_at` is only set after the publish is
//! acknowledged. A row whose publish fails simply keeps its (eventually
//! stale) lease and gets picked up again, by this pump or another, once the
//! lease expires — it is never marked processed without a successful send.

use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use sqlx::PgPool;
use tokio::sync::watch;
use wallet_common::WalletEvent;

use crate::domain::OutboxRow;

pub struct OutboxPublisher {
    producer: FutureProducer,
    topic: String,
}

impl OutboxPublisher {
    pub fn new(brokers: &str, topic: String) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("compression.type", "snappy")
            .set("batch.size", "16384")
            .set("linger.ms", "10")
            .create()?;
        Ok(Self { producer, topic })
    }

    async fn publish_row(&self, row: &OutboxRow, deadline: Duration) -> anyhow::Result<()> {
        let payload = serde_json::to_string(&row.payload)?;
        let record = FutureRecord::to(&self.topic)
            .key(&row.aggregate_id)
            .payload(&payload);

        match self.producer.send(record, deadline).await {
            Ok((partition, offset)) => {
                tracing::debug!(
                    event_id = %row.id,
                    event_type = %row.event_type,
                    partition,
                    offset,
                    "outbox row published"
                );
                Ok(())
            }
            Err((err, _)) => Err(anyhow::anyhow!("publish failed: {err}")),
        }
    }
}

pub struct OutboxPump {
    pool: PgPool,
    publisher: OutboxPublisher,
    batch_size: i64,
    interval: Duration,
    publish_deadline: Duration,
    lease_ttl: Duration,
}

impl OutboxPump {
    pub fn new(
        pool: PgPool,
        publisher: OutboxPublisher,
        batch_size: i64,
        interval: Duration,
        publish_deadline: Duration,
        lease_ttl: Duration,
    ) -> Self {
        Self {
            pool,
            publisher,
            batch_size,
            interval,
            publish_deadline,
            lease_ttl,
        }
    }

    /// Runs forever until `shutdown` fires. Each cycle: select the oldest
    /// unprocessed rows, lease each with a conditional update, publish, and
    /// mark it processed only once the publish is acknowledged. A publish
    /// failure leaves the row leased rather than processed, so the next
    /// cycle (once the lease expires) retries it instead of losing it.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.run_once().await {
                        tracing::error!(error = %err, "outbox pump cycle failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("outbox pump shutting down");
                        return;
                    }
                }
            }
        }
    }

    pub async fn run_once(&self) -> anyhow::Result<()> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT id, aggregate_type, aggregate_id, event_type, payload, version, created_at, processed_at
            FROM outbox_events
            WHERE processed_at IS NULL
            ORDER BY created_at ASC, id ASC
            LIMIT $1
            "#,
        )
        .bind(self.batch_size)
        .fetch_all(&self.pool)
        .await?;

        let mut published = 0u64;
        for row in &rows {
            let now = chrono::Utc::now();
            let lease_cutoff = now - self.lease_ttl;

            let leased = sqlx::query(
                r#"
                UPDATE outbox_events SET leased_at = $1
                WHERE id = $2 AND processed_at IS NULL
                  AND (leased_at IS NULL OR leased_at < $3)
                "#,
            )
            .bind(now)
            .bind(&row.id)
            .bind(lease_cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

            if leased == 0 {
                // Another pump process holds an unexpired lease on this row.
                continue;
            }

            if let Err(err) = self.publisher.publish_row(row, self.publish_deadline).await {
                tracing::error!(event_id = %row.id, error = %err, "failed to publish leased outbox row, will retry after lease expires");
                metrics::counter!("wallet_outbox_publish_failed_total").increment(1);
                continue;
            }

            sqlx::query(
                r#"
                UPDATE outbox_events SET processed_at = $1
                WHERE id = $2 AND processed_at IS NULL
                "#,
            )
            .bind(chrono::Utc::now())
            .bind(&row.id)
            .execute(&self.pool)
            .await?;

            published += 1;
        }

        if published > 0 {
            metrics::counter!("wallet_outbox_published_total").increment(published);
            tracing::debug!(published, scanned = rows.len(), "outbox pump cycle complete");
        }
        Ok(())
    }
}

/// Deserializes a leased row's payload back into a typed event, used by
/// operational tooling and tests; the publisher itself ships the raw JSON
/// payload verbatim.
pub fn decode_event(row: &OutboxRow) -> Result<WalletEvent, serde_json::Error> {
    serde_json::from_value(row.payload.clone())
}
