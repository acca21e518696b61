//! HTTP request/response shapes. Amount parsing goes through
//! `wallet_common::Money` so the validation grammar — no scientific notation,
//! half-even rounding to 4 fractional digits, the 0.01–1,000,000.00 bound —
//! is identical everywhere an amount is accepted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wallet_common::Money;

use crate::domain::{TransactionStatus, TransactionType, Wallet, WalletStatus, WalletTransaction};

#[derive(Debug, Deserialize)]
pub struct CreateWalletRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: Money,
    pub reference_id: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub amount: Money,
    pub reference_id: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub destination_wallet_id: String,
    pub amount: Money,
    pub reference_id: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub id: String,
    pub user_id: String,
    pub balance: rust_decimal::Decimal,
    pub status: WalletStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Wallet> for WalletResponse {
    fn from(w: Wallet) -> Self {
        Self {
            id: w.id,
            user_id: w.user_id,
            balance: w.balance,
            status: w.status,
            created_at: w.created_at,
            updated_at: w.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: String,
    pub wallet_id: String,
    pub destination_wallet_id: Option<String>,
    pub amount: rust_decimal::Decimal,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub reference_id: String,
    pub created_at: DateTime<Utc>,
}

impl From<WalletTransaction> for TransactionResponse {
    fn from(t: WalletTransaction) -> Self {
        Self {
            id: t.id,
            wallet_id: t.wallet_id,
            destination_wallet_id: t.destination_wallet_id,
            amount: t.amount,
            transaction_type: t.transaction_type,
            status: t.status,
            reference_id: t.reference_id,
            created_at: t.created_at,
        }
    }
}
