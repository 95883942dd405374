//! In-memory reference [`StorageDriver`] implementation.
//!
//! Backed by [`DashMap`] for concurrent read/write access. Scans are
//! linear, which is fine for unit tests, benchmarks, and retry-facade
//! conformance checks -- this is not a production backend.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use custodian_core::{DenylistedItem, Record, RecordToDelete, RecordType};
use parking_lot::RwLock;

use super::{require_non_empty, DenylistSource, Inserter, PoolStats, Pruner, RecordGetter, StorageDriver};

/// In-memory `StorageDriver` keyed by `record_id`.
///
/// Useful as the default embeddable backend, as a test double for the
/// retry facade / batched writer / reclaimer, and as a conformance
/// reference for the `Inserter`/`RecordGetter`/`Pruner` contracts.
pub struct MemoryDriver {
    rows: DashMap<i64, Record>,
    denylist: RwLock<Vec<DenylistedItem>>,
    next_id: AtomicI64,
    closed: std::sync::atomic::AtomicBool,
}

impl MemoryDriver {
    /// Creates an empty driver with no denylist entries.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            denylist: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Replaces the denylist table, as an external admin process would.
    pub fn set_denylist(&self, items: Vec<DenylistedItem>) {
        *self.denylist.write() = items;
    }

    /// Returns the number of rows currently stored. Test/diagnostic helper.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if no rows are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Inserter for MemoryDriver {
    async fn insert_many(&self, records: &[Record]) -> anyhow::Result<u64> {
        require_non_empty(records)?;
        for record in records {
            let id = if record.record_id != 0 {
                record.record_id
            } else {
                self.next_id.fetch_add(1, Ordering::SeqCst)
            };
            let mut stored = record.clone();
            stored.record_id = id;
            self.rows.insert(id, stored);
        }
        Ok(records.len() as u64)
    }
}

#[async_trait]
impl RecordGetter for MemoryDriver {
    async fn find_records(&self, device_id: &str, limit: u32) -> anyhow::Result<Vec<Record>> {
        let mut matches: Vec<Record> = self
            .rows
            .iter()
            .filter(|entry| entry.value().device_id == device_id)
            .map(|entry| entry.value().clone())
            .collect();
        matches.sort_by(|a, b| b.birth_date.cmp(&a.birth_date));
        matches.truncate(limit as usize);
        Ok(matches)
    }

    async fn find_records_of_type(
        &self,
        device_id: &str,
        limit: u32,
        record_type: RecordType,
    ) -> anyhow::Result<Vec<Record>> {
        let mut matches: Vec<Record> = self
            .rows
            .iter()
            .filter(|entry| entry.value().device_id == device_id && entry.value().r#type == record_type)
            .map(|entry| entry.value().clone())
            .collect();
        matches.sort_by(|a, b| b.birth_date.cmp(&a.birth_date));
        matches.truncate(limit as usize);
        Ok(matches)
    }
}

#[async_trait]
impl Pruner for MemoryDriver {
    async fn find_records_to_delete(
        &self,
        shard: i32,
        limit: u32,
        now_ns: i64,
    ) -> anyhow::Result<Vec<RecordToDelete>> {
        let mut matches: Vec<RecordToDelete> = self
            .rows
            .iter()
            .filter(|entry| entry.value().shard == shard && entry.value().death_date < now_ns)
            .map(|entry| entry.value().to_delete_key())
            .collect();
        matches.sort_by(|a, b| a.death_date.cmp(&b.death_date).then(a.record_id.cmp(&b.record_id)));
        matches.truncate(limit as usize);
        Ok(matches)
    }

    async fn delete_record(&self, shard: i32, death_date: i64, record_id: i64) -> anyhow::Result<()> {
        if let Some(entry) = self.rows.get(&record_id) {
            if entry.shard != shard || entry.death_date != death_date {
                return Ok(());
            }
        } else {
            return Ok(());
        }
        self.rows.remove(&record_id);
        Ok(())
    }
}

#[async_trait]
impl DenylistSource for MemoryDriver {
    async fn get_denylist(&self) -> anyhow::Result<Vec<DenylistedItem>> {
        Ok(self.denylist.read().clone())
    }
}

#[async_trait]
impl StorageDriver for MemoryDriver {
    async fn ping(&self) -> anyhow::Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            anyhow::bail!("driver is closed");
        }
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn pool_stats(&self) -> PoolStats {
        PoolStats { open: 1, in_use: 0, idle: 1 }
    }
}
