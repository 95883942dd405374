//! Retry facade: a uniform, metered retry wrapper around any [`StorageDriver`].
//!
//! A generic wrapper that implements the same trait as its inner value, so
//! it composes transparently into the same call sites. `RetryDriver<D>`
//! implements `StorageDriver` itself, wrapping every call with bounded
//! retries, backoff, and the `sql_query_*` counters from
//! `custodian_core::metrics`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use custodian_core::{metrics::counters, CoreError, DenylistedItem, OperationKind, Record, RecordToDelete, RecordType};

use crate::driver::{DenylistSource, Inserter, PoolStats, Pruner, RecordGetter, StorageDriver};

/// Injectable sleep function; the default is `tokio::time::sleep`, and
/// tests inject an instrumented substitute to assert exact wait durations
/// without real delay.
pub type SleepFn = Arc<dyn Fn(Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

fn default_sleep() -> SleepFn {
    Arc::new(|duration| Box::pin(tokio::time::sleep(duration)))
}

/// Retry facade configuration.
#[derive(Clone)]
pub struct RetryConfig {
    /// Additional attempts after the first. Default 1.
    pub retries: u32,
    /// Initial delay between attempts. Default 1 second.
    pub interval: Duration,
    /// Multiplier applied to the delay after each retry. `1` is constant
    /// backoff; `>1` is geometric. Default 1.
    pub interval_mult: u32,
    /// Injection point for deterministic tests; defaults to
    /// `tokio::time::sleep`.
    pub sleep: SleepFn,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { retries: 1, interval: Duration::from_secs(1), interval_mult: 1, sleep: default_sleep() }
    }
}

impl std::fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryConfig")
            .field("retries", &self.retries)
            .field("interval", &self.interval)
            .field("interval_mult", &self.interval_mult)
            .finish_non_exhaustive()
    }
}

/// Wraps a [`StorageDriver`] with bounded retry, backoff, and metrics.
///
/// Implements `StorageDriver` itself, so callers can use `RetryDriver<D>`
/// anywhere a `StorageDriver` is expected.
pub struct RetryDriver<D> {
    inner: Arc<D>,
    config: RetryConfig,
}

impl<D> RetryDriver<D> {
    /// Wraps `inner` with the given retry configuration.
    pub fn new(inner: Arc<D>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Runs `op` with bounded retry and backoff, recording metrics under
    /// `kind`.
    ///
    /// Tries once; on failure waits `interval`, retries, and multiplies the
    /// wait by `interval_mult` after each subsequent retry. Stops at first
    /// success or after `retries + 1` total attempts, always returning the
    /// last error observed. Always increments the end counter exactly once;
    /// increments the retry counter once per retry (not per initial
    /// attempt).
    async fn call<T, F, Fut>(&self, kind: OperationKind, mut op: F) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut wait = self.config.interval;
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => {
                    metrics::counter!(counters::SQL_QUERY_SUCCESS_COUNT, "type" => kind.label()).increment(1);
                    metrics::counter!(counters::SQL_QUERY_END_COUNT, "type" => kind.label()).increment(1);
                    return Ok(value);
                }
                Err(err) => {
                    metrics::counter!(counters::SQL_QUERY_FAILURE_COUNT, "type" => kind.label()).increment(1);
                    if attempt >= self.config.retries {
                        metrics::counter!(counters::SQL_QUERY_END_COUNT, "type" => kind.label()).increment(1);
                        return Err(err);
                    }
                    metrics::counter!(counters::SQL_QUERY_RETRY_COUNT, "type" => kind.label()).increment(1);
                    (self.config.sleep)(wait).await;
                    wait = wait.saturating_mul(self.config.interval_mult.max(1));
                    attempt += 1;
                }
            }
        }
    }
}

#[async_trait]
impl<D: Inserter + Send + Sync> Inserter for RetryDriver<D> {
    async fn insert_many(&self, records: &[Record]) -> anyhow::Result<u64> {
        let rows = self.call(OperationKind::Insert, || self.inner.insert_many(records)).await?;
        metrics::counter!(counters::SQL_INSERTED_ROWS).increment(rows);
        Ok(rows)
    }
}

#[async_trait]
impl<D: RecordGetter + Send + Sync> RecordGetter for RetryDriver<D> {
    async fn find_records(&self, device_id: &str, limit: u32) -> anyhow::Result<Vec<Record>> {
        let rows = self.call(OperationKind::Read, || self.inner.find_records(device_id, limit)).await?;
        metrics::counter!(counters::SQL_READ_ROWS).increment(rows.len() as u64);
        Ok(rows)
    }

    async fn find_records_of_type(
        &self,
        device_id: &str,
        limit: u32,
        record_type: RecordType,
    ) -> anyhow::Result<Vec<Record>> {
        let rows = self
            .call(OperationKind::Read, || self.inner.find_records_of_type(device_id, limit, record_type))
            .await?;
        metrics::counter!(counters::SQL_READ_ROWS).increment(rows.len() as u64);
        Ok(rows)
    }
}

#[async_trait]
impl<D: Pruner + Send + Sync> Pruner for RetryDriver<D> {
    async fn find_records_to_delete(
        &self,
        shard: i32,
        limit: u32,
        now_ns: i64,
    ) -> anyhow::Result<Vec<RecordToDelete>> {
        self.call(OperationKind::Read, || self.inner.find_records_to_delete(shard, limit, now_ns)).await
    }

    async fn delete_record(&self, shard: i32, death_date: i64, record_id: i64) -> anyhow::Result<()> {
        self.call(OperationKind::Delete, || self.inner.delete_record(shard, death_date, record_id)).await?;
        metrics::counter!(counters::SQL_DELETED_ROWS).increment(1);
        Ok(())
    }
}

#[async_trait]
impl<D: DenylistSource + Send + Sync> DenylistSource for RetryDriver<D> {
    async fn get_denylist(&self) -> anyhow::Result<Vec<DenylistedItem>> {
        self.call(OperationKind::DenylistRead, || self.inner.get_denylist()).await
    }
}

#[async_trait]
impl<D: StorageDriver> StorageDriver for RetryDriver<D> {
    async fn ping(&self) -> anyhow::Result<()> {
        self.call(OperationKind::Ping, || self.inner.ping()).await
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.inner.close().await
    }

    fn pool_stats(&self) -> PoolStats {
        self.inner.pool_stats()
    }
}

/// Maps a driver-call failure to a [`CoreError::Driver`], preserving the
/// underlying error so the terminal condition is never obscured.
#[must_use]
pub fn wrap_driver_error(operation: &'static str, source: anyhow::Error) -> CoreError {
    CoreError::driver(operation, source)
}
