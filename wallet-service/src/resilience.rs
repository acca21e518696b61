//! The resilience wrapper around a command handler attempt.
//!
//! Wraps a single command attempt, classifies its failure, and retries
//! optimistic-lock conflicts and transient failures with independent jittered
//! exponential backoffs (via the `backoff` crate). Permanent failures
//! (validation, insufficient funds, not found, not active, duplicate
//! reference) are never retried. A small in-memory degradation table
//! (`dashmap`) fast-fails new requests against a wallet that recently
//! exhausted its retries.

use std::future::Future;
use std::time::{Duration, Instant};

use backoff::{backoff::Backoff, exponential::ExponentialBackoff, SystemClock};
use dashmap::DashMap;
use wallet_common::{WalletConfig, WalletError, WalletResult};

use crate::repo_error::RepoError;

type Key = (&'static str, String);

pub struct Resilience {
    cfg: WalletConfig,
    degraded: DashMap<Key, Instant>,
}

/// How long a recorded exhaustion keeps fast-failing new requests for the
/// same (operation, wallet) pair before the degradation entry expires.
const DEGRADATION_WINDOW: Duration = Duration::from_secs(5);

impl Resilience {
    pub fn new(cfg: WalletConfig) -> Self {
        Self {
            cfg,
            degraded: DashMap::new(),
        }
    }

    fn is_degraded(&self, operation: &'static str, wallet_id: &str) -> bool {
        match self.degraded.get(&(operation, wallet_id.to_string())) {
            Some(entry) => entry.elapsed() < DEGRADATION_WINDOW,
            None => false,
        }
    }

    fn record_exhaustion(&self, operation: &'static str, wallet_id: &str) {
        self.degraded
            .insert((operation, wallet_id.to_string()), Instant::now());
    }

    fn optimistic_backoff(&self) -> ExponentialBackoff<SystemClock> {
        backoff::ExponentialBackoffBuilder::new()
            .with_initial_interval(self.cfg.optimistic_retry_base)
            .with_max_interval(self.cfg.optimistic_retry_cap)
            .with_multiplier(2.0)
            .with_randomization_factor(0.5)
            .with_max_elapsed_time(None)
            .build()
    }

    fn transient_backoff(&self) -> ExponentialBackoff<SystemClock> {
        backoff::ExponentialBackoffBuilder::new()
            .with_initial_interval(self.cfg.optimistic_retry_cap)
            .with_max_interval(self.cfg.optimistic_retry_cap * 5)
            .with_multiplier(2.0)
            .with_randomization_factor(0.5)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Runs `f` until it succeeds, exhausts retries, or fails permanently.
    /// `operation` is a static label (e.g. `"deposit"`) used for metrics and
    /// the degradation table; `wallet_id` scopes degradation per wallet.
    pub async fn execute<F, Fut, T>(
        &self,
        operation: &'static str,
        wallet_id: &str,
        mut f: F,
    ) -> WalletResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RepoError>>,
    {
        if self.is_degraded(operation, wallet_id) {
            metrics::counter!("wallet_command_fast_failed_total", "operation" => operation)
                .increment(1);
            return Err(WalletError::TransientFailureExhausted);
        }

        let mut optimistic_attempts = 0u32;
        let mut transient_attempts = 0u32;
        let mut optimistic_backoff = self.optimistic_backoff();
        let mut transient_backoff = self.transient_backoff();

        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable_optimistic() => {
                    optimistic_attempts += 1;
                    metrics::counter!(
                        "wallet_retry_attempts_total",
                        "operation" => operation, "class" => "optimistic_lock"
                    )
                    .increment(1);

                    if optimistic_attempts >= self.cfg.optimistic_retry_max {
                        metrics::counter!(
                            "wallet_retry_exhausted_total",
                            "operation" => operation, "class" => "optimistic_lock"
                        )
                        .increment(1);
                        self.record_exhaustion(operation, wallet_id);
                        tracing::warn!(operation, wallet_id, attempts = optimistic_attempts, "optimistic lock retries exhausted");
                        return Err(WalletError::OptimisticLockExhausted);
                    }
                    let delay = optimistic_backoff.next_backoff().unwrap_or(self.cfg.optimistic_retry_cap);
                    tokio::time::sleep(delay).await;
                }
                Err(err) if err.is_retryable_transient() => {
                    transient_attempts += 1;
                    metrics::counter!(
                        "wallet_retry_attempts_total",
                        "operation" => operation, "class" => "transient"
                    )
                    .increment(1);

                    if transient_attempts >= self.cfg.transient_retry_max {
                        metrics::counter!(
                            "wallet_retry_exhausted_total",
                            "operation" => operation, "class" => "transient"
                        )
                        .increment(1);
                        self.record_exhaustion(operation, wallet_id);
                        tracing::warn!(operation, wallet_id, attempts = transient_attempts, "transient retries exhausted");
                        return Err(WalletError::TransientFailureExhausted);
                    }
                    let delay = transient_backoff.next_backoff().unwrap_or(self.cfg.optimistic_retry_cap * 5);
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn test_config() -> WalletConfig {
        let mut cfg_env = WalletConfig::from_env();
        cfg_env.optimistic_retry_max = 3;
        cfg_env.optimistic_retry_base = Duration::from_millis(1);
        cfg_env.optimistic_retry_cap = Duration::from_millis(2);
        cfg_env.transient_retry_max = 2;
        cfg_env
    }

    #[tokio::test]
    async fn retries_optimistic_conflicts_then_succeeds() {
        let resilience = Resilience::new(test_config());
        let attempts = Arc::new(AtomicU32::new(0));
        let a = attempts.clone();

        let result = resilience
            .execute("deposit", "w1", || {
                let a = a.clone();
                async move {
                    let n = a.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(RepoError::OptimisticLockConflict)
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_optimistic_conflicts() {
        let resilience = Resilience::new(test_config());

        let result: WalletResult<()> = resilience
            .execute("deposit", "w2", || async { Err(RepoError::OptimisticLockConflict) })
            .await;

        assert!(matches!(result, Err(WalletError::OptimisticLockExhausted)));
    }

    #[tokio::test]
    async fn never_retries_permanent_failures() {
        let resilience = Resilience::new(test_config());
        let attempts = Arc::new(AtomicU32::new(0));
        let a = attempts.clone();

        let result: WalletResult<()> = resilience
            .execute("withdraw", "w3", || {
                let a = a.clone();
                async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    Err(RepoError::InsufficientFunds {
                        required: rust_decimal::Decimal::new(500, 2),
                        available: rust_decimal::Decimal::new(100, 2),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(WalletError::InsufficientFunds { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
