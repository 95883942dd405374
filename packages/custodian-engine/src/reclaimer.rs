//! Expired-row reclaimer: continuously discovers and deletes rows whose
//! `death_date` has passed.
//!
//! Discovery and deletion run as two independent `tokio::task`s sharing a
//! [`CapacitySet`], each racing a `tokio::sync::watch` shutdown receiver
//! against its own work-source future.

use std::sync::Arc;
use std::time::Duration;

use custodian_core::{metrics::gauges, RecordToDelete};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::driver::Pruner;
use crate::sync::{CapacitySet, Semaphore};

/// Reclaimer configuration.
#[derive(Debug, Clone, Copy)]
pub struct ReclaimerConfig {
    /// Coarse partition key this reclaimer instance scans. Default 0.
    pub shard: i32,
    /// Maximum concurrent delete workers. Minimum 1, default 5.
    pub max_workers: u32,
    /// Capacity of the discovery→deletion buffer. Minimum 5, default 1000.
    pub set_size: usize,
    /// Delay between dispatching one delete and popping the next (a rate
    /// limiter on the deletion stage). Minimum 1ms, default 1ms.
    pub delete_wait: Duration,
    /// Maximum rows fetched per discovery tick. Default 10.
    pub get_limit: u32,
    /// Discovery tick interval. Minimum 1ms.
    pub get_wait: Duration,
}

impl Default for ReclaimerConfig {
    fn default() -> Self {
        Self {
            shard: 0,
            max_workers: 5,
            set_size: 1000,
            delete_wait: Duration::from_millis(1),
            get_limit: 10,
            get_wait: Duration::from_millis(100),
        }
    }
}

impl ReclaimerConfig {
    /// Clamps configured values to their documented minima.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.max_workers = self.max_workers.max(1);
        self.set_size = self.set_size.max(5);
        self.delete_wait = self.delete_wait.max(Duration::from_millis(1));
        self.get_wait = self.get_wait.max(Duration::from_millis(1));
        self
    }
}

/// Runs the discovery and deletion stages against a driver.
pub struct Reclaimer {
    discovery: JoinHandle<()>,
    deletion: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
    workers: Semaphore,
    max_workers: u32,
}

impl Reclaimer {
    /// Starts both the discovery and deletion tasks against `driver`.
    pub fn start<D>(driver: Arc<D>, config: ReclaimerConfig, now: impl Fn() -> i64 + Send + Sync + 'static) -> Self
    where
        D: Pruner + Send + Sync + 'static,
    {
        let config = config.normalized();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let set = Arc::new(CapacitySet::<RecordToDelete>::new(config.set_size));
        let workers = Semaphore::new(config.max_workers as usize);

        let discovery = tokio::spawn(discovery_loop(
            driver.clone(),
            config,
            set.clone(),
            shutdown_rx.clone(),
            now,
        ));
        let deletion = tokio::spawn(deletion_loop(driver, config, set, workers.clone(), shutdown_rx));

        Self { discovery, deletion, shutdown_tx, workers, max_workers: config.max_workers }
    }

    /// Signals both stages to stop and waits for them to exit. The
    /// discovery stage exits on the next tick boundary; the deletion stage
    /// shuts down the shared set so it drains before exiting. Also waits for
    /// every in-flight delete worker spawned by the deletion stage to
    /// finish, by acquiring all `max_workers` permits.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.discovery.await;
        let _ = self.deletion.await;
        let _all = self.workers.acquire_all(self.max_workers).await.expect("reclaimer semaphore is never closed");
    }
}

async fn discovery_loop<D>(
    driver: Arc<D>,
    config: ReclaimerConfig,
    set: Arc<CapacitySet<RecordToDelete>>,
    mut shutdown_rx: watch::Receiver<bool>,
    now: impl Fn() -> i64 + Send + Sync + 'static,
) where
    D: Pruner + Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval(config.get_wait);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now_ns = now();
                match driver.find_records_to_delete(config.shard, config.get_limit, now_ns).await {
                    Ok(candidates) => {
                        for candidate in candidates {
                            if set.add(candidate) {
                                metrics::gauge!(gauges::DELETING_QUEUE_DEPTH).set(set.len() as f64);
                            }
                        }
                    }
                    Err(err) => warn!(error = %err, "discovery scan failed"),
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    set.shutdown();
                    return;
                }
            }
        }
    }
}

async fn deletion_loop<D>(
    driver: Arc<D>,
    config: ReclaimerConfig,
    set: Arc<CapacitySet<RecordToDelete>>,
    workers: Semaphore,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    D: Pruner + Send + Sync + 'static,
{
    loop {
        let item = tokio::select! {
            item = set.blocking_pop() => item,
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    set.shutdown();
                }
                continue;
            }
        };

        let Some(candidate) = item else {
            return;
        };
        metrics::gauge!(gauges::DELETING_QUEUE_DEPTH).set(set.len() as f64);

        let permit = workers.acquire_owned().await.expect("reclaimer semaphore is never closed");
        let driver = driver.clone();
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(err) = driver
                .delete_record(candidate.shard, candidate.death_date, candidate.record_id)
                .await
            {
                warn!(error = %err, record_id = candidate.record_id, "delete failed");
            } else {
                debug!(record_id = candidate.record_id, "record deleted");
            }
        });

        tokio::time::sleep(config.delete_wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::memory::MemoryDriver;
    use crate::driver::Inserter;
    use async_trait::async_trait;
    use custodian_core::{AlgTag, Record, RecordType};

    /// A [`Pruner`] whose scan always fails, used to exercise the error
    /// path: nothing should ever reach the deletion stage.
    struct ErroringPruner {
        inner: MemoryDriver,
    }

    #[async_trait]
    impl Pruner for ErroringPruner {
        async fn find_records_to_delete(&self, _shard: i32, _limit: u32, _now_ns: i64) -> anyhow::Result<Vec<RecordToDelete>> {
            Err(anyhow::anyhow!("scan failed"))
        }

        async fn delete_record(&self, shard: i32, death_date: i64, record_id: i64) -> anyhow::Result<()> {
            self.inner.delete_record(shard, death_date, record_id).await
        }
    }

    fn record(record_id: i64, death_date: i64, shard: i32) -> Record {
        Record {
            r#type: RecordType::Default,
            device_id: "d1".to_string(),
            birth_date: 0,
            death_date,
            data: vec![1],
            nonce: vec![],
            alg: AlgTag::None,
            kid: String::new(),
            record_id,
            shard,
        }
    }

    #[tokio::test]
    async fn discovers_and_deletes_expired_rows() {
        let driver = Arc::new(MemoryDriver::new());
        driver.insert_many(&[record(1, 50, 0), record(2, 50, 0), record(3, 500, 0)]).await.unwrap();

        let reclaimer = Reclaimer::start(
            driver.clone(),
            ReclaimerConfig { get_wait: Duration::from_millis(5), delete_wait: Duration::from_millis(1), ..ReclaimerConfig::default() },
            || 100,
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        reclaimer.stop().await;

        assert_eq!(driver.len(), 1);
    }

    #[tokio::test]
    async fn scan_error_enqueues_and_deletes_nothing() {
        let inner = MemoryDriver::new();
        inner.insert_many(&[record(1, 50, 0)]).await.unwrap();
        let driver = Arc::new(ErroringPruner { inner });

        let reclaimer = Reclaimer::start(
            driver.clone(),
            ReclaimerConfig { get_wait: Duration::from_millis(5), ..ReclaimerConfig::default() },
            || 100,
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        reclaimer.stop().await;

        assert_eq!(driver.inner.len(), 1);
    }

    #[tokio::test]
    async fn stop_halts_both_stages() {
        let driver = Arc::new(MemoryDriver::new());
        let reclaimer = Reclaimer::start(driver, ReclaimerConfig::default(), || 0);
        reclaimer.stop().await;
    }
}
