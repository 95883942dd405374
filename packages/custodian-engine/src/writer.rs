//! Batched writer: groups single-record submissions into multi-row inserts
//! under a size/time dual trigger.
//!
//! The batcher loop is a single `tokio::task` running a `select!` over the
//! submission channel and a `tokio::time::sleep` timer future.

use std::sync::Arc;
use std::time::Duration;

use custodian_core::{metrics::counters, metrics::gauges, CoreError, Record};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::driver::Inserter;
use crate::sync::Semaphore;

/// Batched writer configuration.
#[derive(Debug, Clone, Copy)]
pub struct WriterConfig {
    /// Maximum number of concurrent insert workers. Minimum 1, default 5.
    pub max_workers: u32,
    /// Size trigger: submit once the pending batch reaches this many
    /// records. `0` means no size cap (time trigger only). Default 1.
    pub max_batch_size: usize,
    /// Time trigger: submit whatever has accumulated after this long since
    /// the first record in a fresh batch. Minimum 1ms, default 1ms.
    pub max_batch_wait: Duration,
    /// Submission queue capacity. Minimum 5, default 5.
    pub queue_size: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            max_batch_size: 1,
            max_batch_wait: Duration::from_millis(1),
            queue_size: 5,
        }
    }
}

impl WriterConfig {
    /// Clamps configured values to their documented minima.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.max_workers = self.max_workers.max(1);
        self.max_batch_wait = self.max_batch_wait.max(Duration::from_millis(1));
        self.queue_size = self.queue_size.max(5);
        self
    }
}

/// A handle for submitting records to a running [`BatchedWriter`].
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Record>,
}

impl WriterHandle {
    /// Submits a record for batched insertion. Blocks if the internal queue
    /// is full (backpressure). Empty-payload records are accepted here and
    /// silently discarded by the batcher loop -- an observable no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Shutdown`] if the writer has stopped accepting
    /// submissions.
    pub async fn submit(&self, record: Record) -> Result<(), CoreError> {
        self.tx.send(record).await.map_err(|_| CoreError::Shutdown)
    }
}

/// Groups single-record submissions into batched `insert_many` calls.
pub struct BatchedWriter {
    handle: WriterHandle,
    batcher: JoinHandle<()>,
    workers: Semaphore,
    max_workers: u32,
}

impl BatchedWriter {
    /// Starts the batcher loop against `driver`, returning once the
    /// background task is spawned.
    pub fn start<D>(driver: Arc<D>, config: WriterConfig) -> Self
    where
        D: Inserter + Send + Sync + 'static,
    {
        let config = config.normalized();
        let (tx, rx) = mpsc::channel(config.queue_size);
        let workers = Semaphore::new(config.max_workers as usize);

        let batcher = tokio::spawn(batcher_loop(rx, driver, config, workers.clone()));

        Self { handle: WriterHandle { tx }, batcher, workers, max_workers: config.max_workers }
    }

    /// Returns a cloneable handle for submitting records.
    #[must_use]
    pub fn handle(&self) -> WriterHandle {
        self.handle.clone()
    }

    /// Closes the submission queue, waits for the batcher to drain its
    /// in-flight batch, then acquires every worker permit to ensure all
    /// dispatched workers have completed. Consumes `self`: stopping is a
    /// once-only transition, enforced by ownership rather than an
    /// idempotency flag.
    pub async fn stop(self) {
        drop(self.handle);
        let _ = self.batcher.await;
        let _all = self.workers.acquire_all(self.max_workers).await.expect("writer semaphore is never closed");
    }
}

async fn batcher_loop<D>(
    mut rx: mpsc::Receiver<Record>,
    driver: Arc<D>,
    config: WriterConfig,
    workers: Semaphore,
) where
    D: Inserter + Send + Sync + 'static,
{
    let mut batch: Vec<Record> = Vec::new();
    let mut timer: Option<std::pin::Pin<Box<tokio::time::Sleep>>> = None;

    loop {
        let ready = if let Some(sleep) = timer.as_mut() {
            tokio::select! {
                biased;
                () = sleep => true,
                maybe_record = rx.recv() => {
                    match maybe_record {
                        Some(record) => {
                            if !record.has_empty_payload() {
                                batch.push(record);
                            }
                            config.max_batch_size != 0 && batch.len() >= config.max_batch_size
                        }
                        None => {
                            // channel closed: finish the in-flight batch and drain
                            if !batch.is_empty() {
                                dispatch(driver.clone(), std::mem::take(&mut batch), workers.clone()).await;
                            }
                            break;
                        }
                    }
                }
            }
        } else {
            match rx.recv().await {
                Some(record) => {
                    if record.has_empty_payload() {
                        continue;
                    }
                    batch.push(record);
                    timer = Some(Box::pin(tokio::time::sleep(config.max_batch_wait)));
                    config.max_batch_size != 0 && batch.len() >= config.max_batch_size
                }
                None => break,
            }
        };

        if ready {
            timer = None;
            if !batch.is_empty() {
                dispatch(driver.clone(), std::mem::take(&mut batch), workers.clone()).await;
            }
        }
    }
}

async fn dispatch<D>(driver: Arc<D>, records: Vec<Record>, workers: Semaphore)
where
    D: Inserter + Send + Sync + 'static,
{
    // Acquired here, on the batcher loop, so a full worker pool applies
    // backpressure to batch dispatch rather than letting batches pile up
    // unboundedly in spawned tasks.
    let permit = workers.acquire_owned().await.expect("writer semaphore is never closed");
    tokio::spawn(async move {
        let _permit = permit;
        match driver.insert_many(&records).await {
            Ok(rows) => {
                debug!(rows, "batch insert succeeded");
            }
            Err(err) => {
                metrics::counter!(counters::DROPPED_EVENTS_DB_FAIL_COUNT).increment(records.len() as u64);
                warn!(error = %err, dropped = records.len(), "batch insert failed, dropping events");
            }
        }
        // permit dropped here regardless of success/failure/panic unwinding
    });
}

/// Updates the pending-queue-depth gauge. Exposed separately from the
/// batcher loop so callers that expose submission metrics externally can
/// drive the same stable name.
pub fn record_queue_depth(depth: u64) {
    metrics::gauge!(gauges::INSERTING_QUEUE_DEPTH).set(depth as f64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::memory::MemoryDriver;
    use async_trait::async_trait;
    use custodian_core::{AlgTag, RecordType};
    use parking_lot::Mutex;

    /// Wraps a [`MemoryDriver`] and records the size of every `insert_many`
    /// call it receives, in order, so batch composition can be asserted.
    struct CountingDriver {
        inner: MemoryDriver,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl CountingDriver {
        fn new() -> Self {
            Self { inner: MemoryDriver::new(), calls: Mutex::new(Vec::new()) }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl Inserter for CountingDriver {
        async fn insert_many(&self, records: &[Record]) -> anyhow::Result<u64> {
            self.calls.lock().push(records.iter().map(|r| r.device_id.clone()).collect());
            self.inner.insert_many(records).await
        }
    }

    fn record(device_id: &str, payload: Vec<u8>) -> Record {
        Record {
            r#type: RecordType::Default,
            device_id: device_id.to_string(),
            birth_date: 1,
            death_date: 100,
            data: payload,
            nonce: vec![],
            alg: AlgTag::None,
            kid: String::new(),
            record_id: 0,
            shard: 0,
        }
    }

    #[tokio::test]
    async fn time_trigger_yields_one_call_with_both_records() {
        let driver = Arc::new(CountingDriver::new());
        let writer = BatchedWriter::start(
            driver.clone(),
            WriterConfig { max_batch_size: 3, max_batch_wait: Duration::from_millis(10), ..WriterConfig::default() },
        );
        let handle = writer.handle();
        handle.submit(record("d1", vec![1])).await.unwrap();
        handle.submit(record("d2", vec![2])).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        writer.stop().await;

        assert_eq!(driver.calls(), vec![vec!["d1".to_string(), "d2".to_string()]]);
    }

    #[tokio::test]
    async fn size_trigger_splits_into_two_ordered_calls() {
        let driver = Arc::new(CountingDriver::new());
        let writer = BatchedWriter::start(
            driver.clone(),
            WriterConfig { max_batch_size: 3, max_batch_wait: Duration::from_millis(10), ..WriterConfig::default() },
        );
        let handle = writer.handle();
        for id in ["d1", "d2", "d3", "d4", "d5"] {
            handle.submit(record(id, vec![1])).await.unwrap();
        }

        tokio::time::sleep(Duration::from_millis(40)).await;
        writer.stop().await;

        assert_eq!(
            driver.calls(),
            vec![
                vec!["d1".to_string(), "d2".to_string(), "d3".to_string()],
                vec!["d4".to_string(), "d5".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn empty_payload_is_silently_discarded() {
        let driver = Arc::new(MemoryDriver::new());
        let writer = BatchedWriter::start(
            driver.clone(),
            WriterConfig { max_batch_size: 1, ..WriterConfig::default() },
        );
        let handle = writer.handle();
        handle.submit(record("d1", vec![])).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        writer.stop().await;
        assert!(driver.is_empty());
    }

    #[tokio::test]
    async fn empty_payload_does_not_delay_a_following_records_timer() {
        let driver = Arc::new(CountingDriver::new());
        let writer = BatchedWriter::start(
            driver.clone(),
            WriterConfig { max_batch_size: 10, max_batch_wait: Duration::from_millis(20), ..WriterConfig::default() },
        );
        let handle = writer.handle();
        handle.submit(record("empty", vec![])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(15)).await;
        handle.submit(record("d1", vec![1])).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        writer.stop().await;

        assert_eq!(driver.calls(), vec![vec!["d1".to_string()]]);
    }

    #[tokio::test]
    async fn stop_drains_in_flight_batch() {
        let driver = Arc::new(MemoryDriver::new());
        let writer = BatchedWriter::start(
            driver.clone(),
            WriterConfig { max_batch_size: 5, max_batch_wait: Duration::from_secs(60), ..WriterConfig::default() },
        );
        let handle = writer.handle();
        handle.submit(record("d1", vec![1])).await.unwrap();
        handle.submit(record("d1", vec![2])).await.unwrap();

        writer.stop().await;
        assert_eq!(driver.len(), 2);
    }

    #[tokio::test]
    async fn stop_waits_for_in_flight_workers() {
        let driver = Arc::new(MemoryDriver::new());
        let writer = BatchedWriter::start(driver, WriterConfig::default());
        writer.stop().await;
    }
}
