//! HTTP response shapes, mirroring `wallet-service`'s `dto.rs` convention:
//! plain serialized entities, no envelope wrapper.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::{Direction, TransactionHistoryEntry, TransactionType};

#[derive(Debug, Serialize)]
pub struct HistoryEntryResponse {
    pub wallet_id: String,
    pub transaction_id: String,
    pub counterparty_wallet_id: Option<String>,
    pub direction: Direction,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub balance_after: Decimal,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl From<TransactionHistoryEntry> for HistoryEntryResponse {
    fn from(e: TransactionHistoryEntry) -> Self {
        Self {
            wallet_id: e.wallet_id,
            transaction_id: e.transaction_id,
            counterparty_wallet_id: e.counterparty_wallet_id,
            direction: e.direction,
            amount: e.amount,
            transaction_type: e.transaction_type,
            balance_after: e.balance_after,
            description: e.description,
            occurred_at: e.occurred_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoricalBalanceResponse {
    pub wallet_id: String,
    pub as_of: DateTime<Utc>,
    pub balance: Decimal,
}
