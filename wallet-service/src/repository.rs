//! Command handlers against the write store, plus the read-side fallback
//! used when the cache and replica both miss. Every state-changing method
//! here obeys one rule: the balance update, the transaction row, and the
//! outbox row commit together in one transaction or not at all.

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;
use wallet_common::events::SCHEMA_VERSION;
use wallet_common::WalletEvent;

use crate::domain::{TransactionType, Wallet, WalletStatus, WalletTransaction};
use crate::repo_error::RepoError;

#[derive(Clone)]
pub struct WalletRepository {
    pool: PgPool,
}

impl WalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn create_wallet(&self, user_id: &str) -> Result<Wallet, RepoError> {
        let wallet_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            INSERT INTO wallets (id, user_id, balance, status, version, created_at, updated_at)
            VALUES ($1, $2, 0, 'ACTIVE', 0, $3, $3)
            RETURNING id, user_id, balance, status, version, created_at, updated_at
            "#,
        )
        .bind(&wallet_id)
        .bind(user_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let event = WalletEvent::WalletCreated {
            wallet_id: wallet.id.clone(),
            user_id: wallet.user_id.clone(),
            created_at: now,
            version: SCHEMA_VERSION,
        };
        self.insert_outbox_row(&mut tx, "Wallet", &wallet.id, &event).await?;

        tx.commit().await?;
        Ok(wallet)
    }

    pub async fn find_by_id(&self, wallet_id: &str) -> Result<Wallet, RepoError> {
        sqlx::query_as::<_, Wallet>(
            r#"
            SELECT id, user_id, balance, status, version, created_at, updated_at
            FROM wallets WHERE id = $1
            "#,
        )
        .bind(wallet_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepoError::NotFound(wallet_id.to_string()))
    }

    pub async fn find_by_user_id(&self, user_id: &str) -> Result<Vec<Wallet>, RepoError> {
        let wallets = sqlx::query_as::<_, Wallet>(
            r#"
            SELECT id, user_id, balance, status, version, created_at, updated_at
            FROM wallets WHERE user_id = $1 ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(wallets)
    }

    /// Idempotency replay check shared by deposit/withdraw. Returns the prior
    /// transaction if (wallet_id, reference_id) already completed, erroring with
    /// `DuplicateReference` if the amount doesn't match the original call.
    async fn find_completed_for_replay(
        &self,
        wallet_id: &str,
        reference_id: &str,
        amount: Decimal,
    ) -> Result<Option<WalletTransaction>, RepoError> {
        let existing = sqlx::query_as::<_, WalletTransaction>(
            r#"
            SELECT id, wallet_id, destination_wallet_id, amount, type as transaction_type,
                   status, reference_id, description, created_at
            FROM wallet_transactions
            WHERE wallet_id = $1 AND reference_id = $2 AND status = 'COMPLETED'
            "#,
        )
        .bind(wallet_id)
        .bind(reference_id)
        .fetch_optional(&self.pool)
        .await?;

        match existing {
            Some(txn) if txn.amount == amount => Ok(Some(txn)),
            Some(_) => Err(RepoError::DuplicateReference {
                reference_id: reference_id.to_string(),
            }),
            None => Ok(None),
        }
    }

    pub async fn deposit(
        &self,
        wallet_id: &str,
        amount: Decimal,
        reference_id: &str,
        description: Option<&str>,
    ) -> Result<WalletTransaction, RepoError> {
        if amount <= Decimal::ZERO {
            return Err(RepoError::InvalidAmount("amount must be positive".into()));
        }
        if let Some(prior) = self
            .find_completed_for_replay(wallet_id, reference_id, amount)
            .await?
        {
            return Ok(prior);
        }

        let mut tx = self.pool.begin().await?;
        let wallet = self.find_by_id_in_tx(&mut tx, wallet_id).await?;
        if wallet.status != WalletStatus::Active {
            return Err(RepoError::NotActive(wallet_id.to_string()));
        }

        let new_balance = wallet.balance + amount;
        let new_version = wallet.version + 1;
        let rows = sqlx::query(
            r#"
            UPDATE wallets SET balance = $1, version = $2, updated_at = $3
            WHERE id = $4 AND version = $5
            "#,
        )
        .bind(new_balance)
        .bind(new_version)
        .bind(Utc::now())
        .bind(wallet_id)
        .bind(wallet.version)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(RepoError::OptimisticLockConflict);
        }

        let transaction = self
            .insert_transaction_in_tx(
                &mut tx,
                wallet_id,
                None,
                amount,
                TransactionType::Deposit,
                reference_id,
                description,
            )
            .await?;

        let event = WalletEvent::FundsDeposited {
            wallet_id: wallet_id.to_string(),
            transaction_id: transaction.id.clone(),
            reference_id: reference_id.to_string(),
            amount,
            new_balance,
            timestamp: Utc::now(),
            version: SCHEMA_VERSION,
        };
        self.insert_outbox_row(&mut tx, "Transaction", &transaction.id, &event).await?;

        tx.commit().await?;
        Ok(transaction)
    }

    pub async fn withdraw(
        &self,
        wallet_id: &str,
        amount: Decimal,
        reference_id: &str,
        description: Option<&str>,
    ) -> Result<WalletTransaction, RepoError> {
        if amount <= Decimal::ZERO {
            return Err(RepoError::InvalidAmount("amount must be positive".into()));
        }
        if let Some(prior) = self
            .find_completed_for_replay(wallet_id, reference_id, amount)
            .await?
        {
            return Ok(prior);
        }

        let mut tx = self.pool.begin().await?;
        let wallet = self.find_by_id_in_tx(&mut tx, wallet_id).await?;
        if wallet.status != WalletStatus::Active {
            return Err(RepoError::NotActive(wallet_id.to_string()));
        }
        if wallet.balance < amount {
            return Err(RepoError::InsufficientFunds {
                required: amount,
                available: wallet.balance,
            });
        }

        let new_balance = wallet.balance - amount;
        let new_version = wallet.version + 1;
        let rows = sqlx::query(
            r#"
            UPDATE wallets SET balance = $1, version = $2, updated_at = $3
            WHERE id = $4 AND version = $5
            "#,
        )
        .bind(new_balance)
        .bind(new_version)
        .bind(Utc::now())
        .bind(wallet_id)
        .bind(wallet.version)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(RepoError::OptimisticLockConflict);
        }

        let transaction = self
            .insert_transaction_in_tx(
                &mut tx,
                wallet_id,
                None,
                amount,
                TransactionType::Withdrawal,
                reference_id,
                description,
            )
            .await?;

        let event = WalletEvent::FundsWithdrawn {
            wallet_id: wallet_id.to_string(),
            transaction_id: transaction.id.clone(),
            reference_id: reference_id.to_string(),
            amount,
            new_balance,
            timestamp: Utc::now(),
            version: SCHEMA_VERSION,
        };
        self.insert_outbox_row(&mut tx, "Transaction", &transaction.id, &event).await?;

        tx.commit().await?;
        Ok(transaction)
    }

    /// Transfer between two wallets. Uses only the optimistic version check,
    /// no row lock, same as deposit/withdraw. The two conditional UPDATEs are
    /// issued in ascending-id order to avoid the classic AB/BA deadlock
    /// between concurrent transfers that touch the same two wallets in
    /// opposite directions; which wallet gets debited vs. credited is
    /// unaffected by that ordering.
    pub async fn transfer(
        &self,
        source_id: &str,
        destination_id: &str,
        amount: Decimal,
        reference_id: &str,
        description: Option<&str>,
    ) -> Result<WalletTransaction, RepoError> {
        if amount <= Decimal::ZERO {
            return Err(RepoError::InvalidAmount("amount must be positive".into()));
        }
        if source_id == destination_id {
            return Err(RepoError::InvalidAmount(
                "cannot transfer to the same wallet".into(),
            ));
        }
        if let Some(prior) = self
            .find_completed_for_replay(source_id, reference_id, amount)
            .await?
        {
            return Ok(prior);
        }

        let mut tx = self.pool.begin().await?;

        let source = self.find_by_id_in_tx(&mut tx, source_id).await?;
        let dest = self.find_by_id_in_tx(&mut tx, destination_id).await?;

        if source.status != WalletStatus::Active {
            return Err(RepoError::NotActive(source_id.to_string()));
        }
        if dest.status != WalletStatus::Active {
            return Err(RepoError::NotActive(destination_id.to_string()));
        }
        if source.balance < amount {
            return Err(RepoError::InsufficientFunds {
                required: amount,
                available: source.balance,
            });
        }

        let source_new_balance = source.balance - amount;
        let dest_new_balance = dest.balance + amount;

        let (first_id, first_new_balance, first_expected_version) = if source_id < destination_id
        {
            (source_id, source_new_balance, source.version)
        } else {
            (destination_id, dest_new_balance, dest.version)
        };
        let (second_id, second_new_balance, second_expected_version) = if source_id < destination_id
        {
            (destination_id, dest_new_balance, dest.version)
        } else {
            (source_id, source_new_balance, source.version)
        };

        self.apply_versioned_balance_update(&mut tx, first_id, first_new_balance, first_expected_version)
            .await?;
        self.apply_versioned_balance_update(&mut tx, second_id, second_new_balance, second_expected_version)
            .await?;

        let transaction = self
            .insert_transfer_transaction_in_tx(
                &mut tx,
                source_id,
                destination_id,
                amount,
                reference_id,
                description,
            )
            .await?;

        let event = WalletEvent::FundsTransferred {
            transaction_id: transaction.id.clone(),
            reference_id: reference_id.to_string(),
            source_wallet_id: source_id.to_string(),
            destination_wallet_id: destination_id.to_string(),
            amount,
            source_new_balance,
            destination_new_balance: dest_new_balance,
            timestamp: Utc::now(),
            version: SCHEMA_VERSION,
        };
        self.insert_outbox_row(&mut tx, "Transaction", &transaction.id, &event).await?;

        tx.commit().await?;
        Ok(transaction)
    }

    /// Admin transition: `ACTIVE -> FROZEN`. Not exposed as a route —
    /// authorization for who may call this is a boundary concern.
    pub async fn freeze(&self, wallet_id: &str) -> Result<Wallet, RepoError> {
        self.transition_status(wallet_id, WalletStatus::Active, WalletStatus::Frozen)
            .await
    }

    /// Admin transition: `FROZEN -> ACTIVE`.
    pub async fn unfreeze(&self, wallet_id: &str) -> Result<Wallet, RepoError> {
        self.transition_status(wallet_id, WalletStatus::Frozen, WalletStatus::Active)
            .await
    }

    /// Admin transition: `ACTIVE -> CLOSED`, terminal.
    pub async fn close(&self, wallet_id: &str) -> Result<Wallet, RepoError> {
        self.transition_status(wallet_id, WalletStatus::Active, WalletStatus::Closed)
            .await
    }

    async fn transition_status(
        &self,
        wallet_id: &str,
        required_current: WalletStatus,
        target: WalletStatus,
    ) -> Result<Wallet, RepoError> {
        let wallet = self.find_by_id(wallet_id).await?;
        if wallet.status != required_current {
            return Err(RepoError::InvalidTransition(format!(
                "cannot move wallet {wallet_id} from {} to {target}",
                wallet.status
            )));
        }

        let updated = sqlx::query_as::<_, Wallet>(
            r#"
            UPDATE wallets SET status = $1, version = version + 1, updated_at = $2
            WHERE id = $3 AND version = $4
            RETURNING id, user_id, balance, status, version, created_at, updated_at
            "#,
        )
        .bind(target.to_string())
        .bind(Utc::now())
        .bind(wallet_id)
        .bind(wallet.version)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepoError::OptimisticLockConflict)?;

        Ok(updated)
    }

    async fn apply_versioned_balance_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        wallet_id: &str,
        new_balance: Decimal,
        expected_version: i64,
    ) -> Result<(), RepoError> {
        let rows = sqlx::query(
            r#"
            UPDATE wallets SET balance = $1, version = version + 1, updated_at = $2
            WHERE id = $3 AND version = $4
            "#,
        )
        .bind(new_balance)
        .bind(Utc::now())
        .bind(wallet_id)
        .bind(expected_version)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(RepoError::OptimisticLockConflict);
        }
        Ok(())
    }

    async fn find_by_id_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        wallet_id: &str,
    ) -> Result<Wallet, RepoError> {
        sqlx::query_as::<_, Wallet>(
            r#"
            SELECT id, user_id, balance, status, version, created_at, updated_at
            FROM wallets WHERE id = $1
            "#,
        )
        .bind(wallet_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| RepoError::NotFound(wallet_id.to_string()))
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_transaction_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        wallet_id: &str,
        destination_wallet_id: Option<&str>,
        amount: Decimal,
        transaction_type: TransactionType,
        reference_id: &str,
        description: Option<&str>,
    ) -> Result<WalletTransaction, RepoError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let transaction = sqlx::query_as::<_, WalletTransaction>(
            r#"
            INSERT INTO wallet_transactions
                (id, wallet_id, destination_wallet_id, amount, type, status, reference_id, description, created_at)
            VALUES ($1, $2, $3, $4, $5, 'COMPLETED', $6, $7, $8)
            RETURNING id, wallet_id, destination_wallet_id, amount, type as transaction_type,
                      status, reference_id, description, created_at
            "#,
        )
        .bind(&id)
        .bind(wallet_id)
        .bind(destination_wallet_id)
        .bind(amount)
        .bind(transaction_type.to_string())
        .bind(reference_id)
        .bind(description)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;

        Ok(transaction)
    }

    async fn insert_transfer_transaction_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        source_id: &str,
        destination_id: &str,
        amount: Decimal,
        reference_id: &str,
        description: Option<&str>,
    ) -> Result<WalletTransaction, RepoError> {
        self.insert_transaction_in_tx(
            tx,
            source_id,
            Some(destination_id),
            amount,
            TransactionType::Transfer,
            reference_id,
            description,
        )
        .await
    }

    /// The outbox row is inserted in the same transaction as the business
    /// change that produced it, so the two can never diverge.
    async fn insert_outbox_row(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        aggregate_type: &str,
        aggregate_id: &str,
        event: &WalletEvent,
    ) -> Result<(), RepoError> {
        let id = Uuid::new_v4().to_string();
        let payload = serde_json::to_value(event).unwrap_or_else(|_| json!({}));

        sqlx::query(
            r#"
            INSERT INTO outbox_events
                (id, aggregate_type, aggregate_id, event_type, payload, version, created_at, processed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NULL)
            "#,
        )
        .bind(&id)
        .bind(aggregate_type)
        .bind(aggregate_id)
        .bind(event.event_type())
        .bind(payload)
        .bind(SCHEMA_VERSION)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}
