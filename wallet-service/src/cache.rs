//! The wallet cache.
//!
//! A Redis-backed snapshot keyed by wallet id with a TTL. The cache is never
//! the system of record: a miss or a Redis outage falls through to the store
//! chain in `query.rs` and must never surface as an error to the caller.

use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, AsyncCommands};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::{Wallet, WalletStatus};

/// Canonical, field-tagged snapshot stored in the cache. Kept separate from
/// `Wallet` so the wire format doesn't silently change when the in-memory
/// struct grows a field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedWallet {
    pub id: String,
    pub user_id: String,
    pub balance: Decimal,
    pub status: WalletStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Wallet> for CachedWallet {
    fn from(w: &Wallet) -> Self {
        Self {
            id: w.id.clone(),
            user_id: w.user_id.clone(),
            balance: w.balance,
            status: w.status,
            version: w.version,
            created_at: w.created_at,
            updated_at: w.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct WalletCache {
    conn: ConnectionManager,
    ttl: Duration,
}

fn cache_key(wallet_id: &str) -> String {
    format!("wallet:{wallet_id}")
}

impl WalletCache {
    pub async fn connect(url: &str, ttl: Duration) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn, ttl })
    }

    /// Best-effort read. Any Redis error is logged and treated as a miss.
    pub async fn get(&self, wallet_id: &str) -> Option<CachedWallet> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = match conn.get(cache_key(wallet_id)).await {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(wallet_id, error = %err, "cache read failed, falling through");
                return None;
            }
        };
        raw.and_then(|s| match serde_json::from_str(&s) {
            Ok(w) => Some(w),
            Err(err) => {
                tracing::warn!(wallet_id, error = %err, "cache entry malformed, ignoring");
                None
            }
        })
    }

    /// Best-effort write. A cache write failure is logged, never propagated —
    /// the cache's absence must not block correctness.
    pub async fn put(&self, wallet: &CachedWallet) {
        let mut conn = self.conn.clone();
        let payload = match serde_json::to_string(wallet) {
            Ok(p) => p,
            Err(err) => {
                tracing::warn!(wallet_id = %wallet.id, error = %err, "failed to serialize cache entry");
                return;
            }
        };
        let result: redis::RedisResult<()> = conn
            .set_ex(cache_key(&wallet.id), payload, self.ttl.as_secs())
            .await;
        if let Err(err) = result {
            tracing::warn!(wallet_id = %wallet.id, error = %err, "cache write failed");
        }
    }

    pub async fn invalidate(&self, wallet_id: &str) {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = conn.del(cache_key(wallet_id)).await;
        if let Err(err) = result {
            tracing::warn!(wallet_id, error = %err, "cache invalidation failed");
        }
    }
}
