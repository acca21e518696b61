//! Kafka consumer driving the projector.
//!
//! Consumes the same topic `wallet-service`'s outbox pump publishes to,
//! keyed by aggregate id so events for one wallet always land on the same
//! partition and are seen in commit order. Multiple instances of this
//! service share a consumer group: partitions are spread across them, and
//! Kafka rebalances on instance churn. Cross-wallet ordering is not
//! guaranteed or required.

use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use tokio::time::sleep;
use wallet_common::WalletEvent;

use crate::repository::HistoryRepository;

pub struct EventConsumer {
    consumer: StreamConsumer,
    repository: HistoryRepository,
    event_deadline: Duration,
}

impl EventConsumer {
    pub fn new(
        brokers: &str,
        group_id: &str,
        topic: &str,
        repository: HistoryRepository,
        event_deadline: Duration,
    ) -> anyhow::Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "true")
            .set("auto.commit.interval.ms", "5000")
            .set("session.timeout.ms", "30000")
            .set("enable.partition.eof", "false")
            .create()?;

        consumer.subscribe(&[topic])?;

        Ok(Self {
            consumer,
            repository,
            event_deadline,
        })
    }

    /// Runs forever. A message that fails to process is logged and left
    /// uncommitted where possible; redelivery handles the rest, matching the
    /// at-least-once contract the outbox publisher already assumes.
    pub async fn run(self) {
        tracing::info!("history-service consumer starting");

        loop {
            match self.consumer.recv().await {
                Ok(message) => {
                    let Some(payload) = message.payload() else {
                        continue;
                    };
                    if let Err(err) = self.process_message(payload).await {
                        tracing::error!(error = %err, "failed to process event, will be redelivered");
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "kafka consumer error");
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn process_message(&self, payload: &[u8]) -> anyhow::Result<()> {
        let event: WalletEvent = serde_json::from_slice(payload)?;
        let event_id = event_id_for(&event);

        let outcome = tokio::time::timeout(
            self.event_deadline,
            self.repository.apply_event(&event_id, &event),
        )
        .await??;

        if outcome {
            metrics::counter!("history_projector_events_applied_total", "event_type" => event.event_type())
                .increment(1);
            tracing::debug!(event_type = event.event_type(), "event applied");
        } else {
            metrics::counter!("history_projector_events_duplicate_total", "event_type" => event.event_type())
                .increment(1);
            tracing::debug!(event_type = event.event_type(), "duplicate event skipped");
        }

        Ok(())
    }
}

/// The dedupe key for `processed_events`. `WalletEvent` itself carries no
/// envelope id, so the key is derived from the fields that uniquely identify
/// the underlying write-store mutation — stable across redeliveries of the
/// same event.
fn event_id_for(event: &WalletEvent) -> String {
    match event {
        WalletEvent::WalletCreated { wallet_id, created_at, .. } => {
            format!("wallet-created:{wallet_id}:{}", created_at.timestamp_nanos_opt().unwrap_or_default())
        }
        WalletEvent::FundsDeposited { transaction_id, .. } => format!("deposit:{transaction_id}"),
        WalletEvent::FundsWithdrawn { transaction_id, .. } => format!("withdrawal:{transaction_id}"),
        WalletEvent::FundsTransferred { transaction_id, .. } => format!("transfer:{transaction_id}"),
    }
}
