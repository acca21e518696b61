//! Current-balance query handling.
//!
//! `GetWallet` tries the cache, falls through to the read replica, and falls
//! through again to the write store as a last resort; every fallback hit
//! repopulates the cache. A cache miss or a read-replica miss is normal under
//! eventual consistency, never an error.

use sqlx::PgPool;
use wallet_common::{WalletError, WalletResult};

use crate::cache::{CachedWallet, WalletCache};
use crate::domain::Wallet;
use crate::repository::WalletRepository;

/// Thin read-only accessor for the replica's mirrored `wallets` table.
#[derive(Clone)]
pub struct ReadReplica {
    pool: PgPool,
}

impl ReadReplica {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, wallet_id: &str) -> Result<Option<Wallet>, sqlx::Error> {
        sqlx::query_as::<_, Wallet>(
            r#"
            SELECT id, user_id, balance, status, version, created_at, updated_at
            FROM wallets WHERE id = $1
            "#,
        )
        .bind(wallet_id)
        .fetch_optional(&self.pool)
        .await
    }
}

pub struct QueryService {
    cache: WalletCache,
    read_replica: ReadReplica,
    write_store: WalletRepository,
}

impl QueryService {
    pub fn new(cache: WalletCache, read_replica: ReadReplica, write_store: WalletRepository) -> Self {
        Self {
            cache,
            read_replica,
            write_store,
        }
    }

    pub async fn get_wallet(&self, wallet_id: &str) -> WalletResult<Wallet> {
        if let Some(cached) = self.cache.get(wallet_id).await {
            return Ok(Wallet {
                id: cached.id,
                user_id: cached.user_id,
                balance: cached.balance,
                status: cached.status,
                version: cached.version,
                created_at: cached.created_at,
                updated_at: cached.updated_at,
            });
        }

        if let Ok(Some(wallet)) = self.read_replica.find_by_id(wallet_id).await {
            self.cache.put(&CachedWallet::from(&wallet)).await;
            return Ok(wallet);
        }

        let wallet = self
            .write_store
            .find_by_id(wallet_id)
            .await
            .map_err(WalletError::from)?;
        self.cache.put(&CachedWallet::from(&wallet)).await;
        Ok(wallet)
    }
}
