//! Read-store repository: the projector and the query-side reads it backs
//! (the historical-balance and activity queries).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use wallet_common::{WalletEvent, WalletResult};

use crate::domain::{Direction, TransactionHistoryEntry, TransactionType, Wallet};

#[derive(Clone)]
pub struct HistoryRepository {
    pool: PgPool,
}

impl HistoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies one Kafka event to the read store, idempotently keyed by the
    /// event's own id rather than the underlying transaction id, so a
    /// redelivered event is never applied twice even if it shares a
    /// transaction with another event.
    ///
    /// Returns `true` if the event was newly applied, `false` if it was a
    /// duplicate delivery already recorded in `processed_events`.
    pub async fn apply_event(&self, event_id: &str, event: &WalletEvent) -> WalletResult<bool> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO processed_events (event_id) VALUES ($1) ON CONFLICT DO NOTHING",
        )
        .bind(event_id)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        match event {
            WalletEvent::WalletCreated {
                wallet_id,
                user_id,
                created_at,
                ..
            } => {
                sqlx::query(
                    "INSERT INTO wallets (id, user_id, balance, status, version, created_at, updated_at)
                     VALUES ($1, $2, 0, 'ACTIVE', 0, $3, $3)
                     ON CONFLICT (id) DO NOTHING",
                )
                .bind(wallet_id)
                .bind(user_id)
                .bind(created_at)
                .execute(&mut *tx)
                .await?;
            }

            WalletEvent::FundsDeposited {
                wallet_id,
                transaction_id,
                reference_id,
                amount,
                new_balance,
                timestamp,
                ..
            } => {
                Self::upsert_wallet_balance(&mut tx, wallet_id, *new_balance, *timestamp).await?;
                Self::insert_transaction(
                    &mut tx,
                    transaction_id,
                    wallet_id,
                    None,
                    *amount,
                    TransactionType::Deposit,
                    reference_id,
                    *timestamp,
                )
                .await?;
                Self::append_history(
                    &mut tx,
                    wallet_id,
                    transaction_id,
                    None,
                    Direction::Credit,
                    *amount,
                    TransactionType::Deposit,
                    *new_balance,
                    *timestamp,
                )
                .await?;
            }

            WalletEvent::FundsWithdrawn {
                wallet_id,
                transaction_id,
                reference_id,
                amount,
                new_balance,
                timestamp,
                ..
            } => {
                Self::upsert_wallet_balance(&mut tx, wallet_id, *new_balance, *timestamp).await?;
                Self::insert_transaction(
                    &mut tx,
                    transaction_id,
                    wallet_id,
                    None,
                    *amount,
                    TransactionType::Withdrawal,
                    reference_id,
                    *timestamp,
                )
                .await?;
                Self::append_history(
                    &mut tx,
                    wallet_id,
                    transaction_id,
                    None,
                    Direction::Debit,
                    *amount,
                    TransactionType::Withdrawal,
                    *new_balance,
                    *timestamp,
                )
                .await?;
            }

            WalletEvent::FundsTransferred {
                transaction_id,
                reference_id,
                source_wallet_id,
                destination_wallet_id,
                amount,
                source_new_balance,
                destination_new_balance,
                timestamp,
                ..
            } => {
                Self::upsert_wallet_balance(&mut tx, source_wallet_id, *source_new_balance, *timestamp)
                    .await?;
                Self::upsert_wallet_balance(
                    &mut tx,
                    destination_wallet_id,
                    *destination_new_balance,
                    *timestamp,
                )
                .await?;
                Self::insert_transaction(
                    &mut tx,
                    transaction_id,
                    source_wallet_id,
                    Some(destination_wallet_id),
                    *amount,
                    TransactionType::Transfer,
                    reference_id,
                    *timestamp,
                )
                .await?;

                // One write-store row, but two read-store history entries — one per side.
                Self::append_history(
                    &mut tx,
                    source_wallet_id,
                    transaction_id,
                    Some(destination_wallet_id),
                    Direction::Debit,
                    *amount,
                    TransactionType::Transfer,
                    *source_new_balance,
                    *timestamp,
                )
                .await?;
                Self::append_history(
                    &mut tx,
                    destination_wallet_id,
                    transaction_id,
                    Some(source_wallet_id),
                    Direction::Credit,
                    *amount,
                    TransactionType::Transfer,
                    *destination_new_balance,
                    *timestamp,
                )
                .await?;
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn upsert_wallet_balance(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        wallet_id: &str,
        new_balance: Decimal,
        at: DateTime<Utc>,
    ) -> WalletResult<()> {
        sqlx::query(
            "UPDATE wallets SET balance = $2, version = version + 1, updated_at = $3 WHERE id = $1",
        )
        .bind(wallet_id)
        .bind(new_balance)
        .bind(at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_transaction(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        transaction_id: &str,
        wallet_id: &str,
        destination_wallet_id: Option<&str>,
        amount: Decimal,
        transaction_type: TransactionType,
        reference_id: &str,
        created_at: DateTime<Utc>,
    ) -> WalletResult<()> {
        sqlx::query(
            "INSERT INTO wallet_transactions
                (id, wallet_id, destination_wallet_id, amount, type, status, reference_id, created_at)
             VALUES ($1, $2, $3, $4, $5, 'COMPLETED', $6, $7)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(transaction_id)
        .bind(wallet_id)
        .bind(destination_wallet_id)
        .bind(amount)
        .bind(transaction_type)
        .bind(reference_id)
        .bind(created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn append_history(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        wallet_id: &str,
        transaction_id: &str,
        counterparty_wallet_id: Option<&str>,
        direction: Direction,
        amount: Decimal,
        transaction_type: TransactionType,
        balance_after: Decimal,
        occurred_at: DateTime<Utc>,
    ) -> WalletResult<()> {
        sqlx::query(
            "INSERT INTO transaction_history
                (wallet_id, transaction_id, counterparty_wallet_id, direction, amount, type, balance_after, occurred_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(wallet_id)
        .bind(transaction_id)
        .bind(counterparty_wallet_id)
        .bind(direction)
        .bind(amount)
        .bind(transaction_type)
        .bind(balance_after)
        .bind(occurred_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn get_wallet_history(&self, wallet_id: &str) -> WalletResult<Vec<TransactionHistoryEntry>> {
        let rows = sqlx::query_as::<_, TransactionHistoryEntry>(
            "SELECT id, wallet_id, transaction_id, counterparty_wallet_id, direction, amount, type,
                    balance_after, description, occurred_at, recorded_at
             FROM transaction_history
             WHERE wallet_id = $1
             ORDER BY occurred_at DESC, id DESC",
        )
        .bind(wallet_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_user_activity(&self, user_id: &str) -> WalletResult<Vec<TransactionHistoryEntry>> {
        let rows = sqlx::query_as::<_, TransactionHistoryEntry>(
            "SELECT h.id, h.wallet_id, h.transaction_id, h.counterparty_wallet_id, h.direction,
                    h.amount, h.type, h.balance_after, h.description, h.occurred_at, h.recorded_at
             FROM transaction_history h
             JOIN wallets w ON w.id = h.wallet_id
             WHERE w.user_id = $1
             ORDER BY h.occurred_at DESC, h.id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// `GetHistoricalBalance(walletId, asOf)`. `None` means the wallet
    /// did not exist by `asOf` (the caller maps this to `NOT_FOUND`); `Some(0)`
    /// means the wallet existed but had no transactions by `asOf`.
    pub async fn get_historical_balance(
        &self,
        wallet_id: &str,
        as_of: DateTime<Utc>,
    ) -> WalletResult<Option<Decimal>> {
        let wallet = sqlx::query_as::<_, Wallet>(
            "SELECT id, user_id, balance, status, version, created_at, updated_at
             FROM wallets WHERE id = $1",
        )
        .bind(wallet_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(wallet) = wallet else {
            return Ok(None);
        };
        if wallet.created_at > as_of {
            return Ok(None);
        }

        let balance = sqlx::query_scalar::<_, Decimal>(
            "SELECT balance_after FROM transaction_history
             WHERE wallet_id = $1 AND occurred_at <= $2
             ORDER BY occurred_at DESC, id DESC
             LIMIT 1",
        )
        .bind(wallet_id)
        .bind(as_of)
        .fetch_optional(&self.pool)
        .await?;

        Ok(Some(balance.unwrap_or(Decimal::ZERO)))
    }
}
