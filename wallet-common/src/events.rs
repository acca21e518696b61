//! Outbox event payloads published to the messaging substrate.
//!
//! Events are additively evolvable: new optional fields are fine across minor
//! versions, a breaking change bumps the major version encoded in `eventType`
//! (e.g. `FUNDS_DEPOSITED` -> `FUNDS_DEPOSITED_V2`) and the consumer keeps
//! handling both until the old one drains from the outbox.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: i32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "eventType")]
pub enum WalletEvent {
    #[serde(rename = "WALLET_CREATED")]
    WalletCreated {
        wallet_id: String,
        user_id: String,
        created_at: DateTime<Utc>,
        version: i32,
    },

    #[serde(rename = "FUNDS_DEPOSITED")]
    FundsDeposited {
        wallet_id: String,
        transaction_id: String,
        reference_id: String,
        amount: Decimal,
        new_balance: Decimal,
        timestamp: DateTime<Utc>,
        version: i32,
    },

    #[serde(rename = "FUNDS_WITHDRAWN")]
    FundsWithdrawn {
        wallet_id: String,
        transaction_id: String,
        reference_id: String,
        amount: Decimal,
        new_balance: Decimal,
        timestamp: DateTime<Utc>,
        version: i32,
    },

    #[serde(rename = "FUNDS_TRANSFERRED")]
    FundsTransferred {
        transaction_id: String,
        reference_id: String,
        source_wallet_id: String,
        destination_wallet_id: String,
        amount: Decimal,
        source_new_balance: Decimal,
        destination_new_balance: Decimal,
        timestamp: DateTime<Utc>,
        version: i32,
    },
}

impl WalletEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            WalletEvent::WalletCreated { .. } => "WALLET_CREATED",
            WalletEvent::FundsDeposited { .. } => "FUNDS_DEPOSITED",
            WalletEvent::FundsWithdrawn { .. } => "FUNDS_WITHDRAWN",
            WalletEvent::FundsTransferred { .. } => "FUNDS_TRANSFERRED",
        }
    }

    /// Aggregate this event belongs to. Used as the Kafka partition key so
    /// events for one wallet are always seen in order.
    pub fn aggregate_id(&self) -> &str {
        match self {
            WalletEvent::WalletCreated { wallet_id, .. } => wallet_id,
            WalletEvent::FundsDeposited { wallet_id, .. } => wallet_id,
            WalletEvent::FundsWithdrawn { wallet_id, .. } => wallet_id,
            // Transfers are single-event, keyed by the source wallet; the projector
            // fans this one event out to both read-side wallets.
            WalletEvent::FundsTransferred {
                source_wallet_id, ..
            } => source_wallet_id,
        }
    }

    pub fn aggregate_type(&self) -> &'static str {
        "Wallet"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let event = WalletEvent::WalletCreated {
            wallet_id: "w1".into(),
            user_id: "u1".into(),
            created_at: Utc::now(),
            version: SCHEMA_VERSION,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("WALLET_CREATED"));
        let back: WalletEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type(), "WALLET_CREATED");
    }

    #[test]
    fn ignores_unknown_fields_for_forward_compatibility() {
        let json = r#"{"eventType":"WALLET_CREATED","wallet_id":"w1","user_id":"u1","created_at":"2024-01-01T00:00:00Z","version":1,"futureField":"ignored"}"#;
        let event: WalletEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.aggregate_id(), "w1");
    }
}
