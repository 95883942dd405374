//! Embedded, single-file [`StorageDriver`] backend, feature `redb`.
//!
//! Tables keyed by serialized composite keys, values round-tripped through
//! `serde_json`, and a `spawn_blocking` boundary around every call since
//! `redb` is a synchronous, blocking API.
//!
//! Two tables back this driver:
//! - `events`: `record_id -> Record` (JSON), the primary row store.
//! - `blacklist`: `id -> DenylistedItem` (JSON).
//!
//! Because `redb` has no secondary indexes, `find_records`,
//! `find_records_of_type`, and `find_records_to_delete` scan every row in
//! the `events` table. This is acceptable for the embedded, single-node
//! deployments this backend targets; multi-tenant, high-cardinality
//! deployments should use [`super::postgres::PostgresDriver`] instead.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use custodian_core::{DenylistedItem, Record, RecordToDelete, RecordType};
use redb::{Database, ReadableTable, TableDefinition};

use super::{require_non_empty, DenylistSource, Inserter, PoolStats, Pruner, RecordGetter, StorageDriver};

const EVENTS_TABLE: TableDefinition<'_, i64, &[u8]> = TableDefinition::new("events");
const BLACKLIST_TABLE: TableDefinition<'_, &str, &[u8]> = TableDefinition::new("blacklist");

/// `StorageDriver` backed by an embedded `redb` database file.
///
/// `record_id` is the table's primary key, but the batched writer forwards
/// records with `record_id == 0` (the inserter, not the caller, owns id
/// assignment). `next_id` mirrors [`super::memory::MemoryDriver`]'s
/// auto-assignment: seeded from the highest `record_id` already on disk at
/// open time, then handed out for every zero id on insert.
pub struct RedbDriver {
    db: Arc<Database>,
    next_id: Arc<AtomicI64>,
}

impl RedbDriver {
    /// Opens (creating if absent) the `redb` database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or opened, or if its
    /// tables cannot be initialized.
    pub fn open(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let db = Database::create(path)?;
        let write_txn = db.begin_write()?;
        let max_id = {
            write_txn.open_table(BLACKLIST_TABLE)?;
            let table = write_txn.open_table(EVENTS_TABLE)?;
            table.iter()?.try_fold(0i64, |max, entry| -> anyhow::Result<i64> { Ok(max.max(entry?.0.value())) })?
        };
        write_txn.commit()?;
        Ok(Self { db: Arc::new(db), next_id: Arc::new(AtomicI64::new(max_id + 1)) })
    }
}

#[async_trait]
impl Inserter for RedbDriver {
    async fn insert_many(&self, records: &[Record]) -> anyhow::Result<u64> {
        require_non_empty(records)?;
        let db = self.db.clone();
        let next_id = self.next_id.clone();
        let mut records = records.to_vec();
        for record in &mut records {
            if record.record_id == 0 {
                record.record_id = next_id.fetch_add(1, Ordering::SeqCst);
            }
        }
        tokio::task::spawn_blocking(move || -> anyhow::Result<u64> {
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(EVENTS_TABLE)?;
                for record in &records {
                    let bytes = serde_json::to_vec(record)?;
                    table.insert(record.record_id, bytes.as_slice())?;
                }
            }
            write_txn.commit()?;
            Ok(records.len() as u64)
        })
        .await?
    }
}

#[async_trait]
impl RecordGetter for RedbDriver {
    async fn find_records(&self, device_id: &str, limit: u32) -> anyhow::Result<Vec<Record>> {
        let db = self.db.clone();
        let device_id = device_id.to_string();
        tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<Record>> {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(EVENTS_TABLE)?;
            let mut matches = Vec::new();
            for entry in table.iter()? {
                let (_, value) = entry?;
                let record: Record = serde_json::from_slice(value.value())?;
                if record.device_id == device_id {
                    matches.push(record);
                }
            }
            matches.sort_by(|a, b| b.birth_date.cmp(&a.birth_date));
            matches.truncate(limit as usize);
            Ok(matches)
        })
        .await?
    }

    async fn find_records_of_type(
        &self,
        device_id: &str,
        limit: u32,
        record_type: RecordType,
    ) -> anyhow::Result<Vec<Record>> {
        let db = self.db.clone();
        let device_id = device_id.to_string();
        tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<Record>> {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(EVENTS_TABLE)?;
            let mut matches = Vec::new();
            for entry in table.iter()? {
                let (_, value) = entry?;
                let record: Record = serde_json::from_slice(value.value())?;
                if record.device_id == device_id && record.r#type == record_type {
                    matches.push(record);
                }
            }
            matches.sort_by(|a, b| b.birth_date.cmp(&a.birth_date));
            matches.truncate(limit as usize);
            Ok(matches)
        })
        .await?
    }
}

#[async_trait]
impl Pruner for RedbDriver {
    async fn find_records_to_delete(
        &self,
        shard: i32,
        limit: u32,
        now_ns: i64,
    ) -> anyhow::Result<Vec<RecordToDelete>> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<RecordToDelete>> {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(EVENTS_TABLE)?;
            let mut matches = Vec::new();
            for entry in table.iter()? {
                let (_, value) = entry?;
                let record: Record = serde_json::from_slice(value.value())?;
                if record.shard == shard && record.death_date < now_ns {
                    matches.push(record.to_delete_key());
                }
            }
            matches.sort_by(|a, b| a.death_date.cmp(&b.death_date).then(a.record_id.cmp(&b.record_id)));
            matches.truncate(limit as usize);
            Ok(matches)
        })
        .await?
    }

    async fn delete_record(&self, shard: i32, death_date: i64, record_id: i64) -> anyhow::Result<()> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(EVENTS_TABLE)?;
                let matches = table
                    .get(record_id)?
                    .map(|value| serde_json::from_slice::<Record>(value.value()))
                    .transpose()?;
                if let Some(record) = matches {
                    if record.shard == shard && record.death_date == death_date {
                        table.remove(record_id)?;
                    }
                }
            }
            write_txn.commit()?;
            Ok(())
        })
        .await?
    }
}

#[async_trait]
impl DenylistSource for RedbDriver {
    async fn get_denylist(&self) -> anyhow::Result<Vec<DenylistedItem>> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<DenylistedItem>> {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(BLACKLIST_TABLE)?;
            let mut items = Vec::new();
            for entry in table.iter()? {
                let (_, value) = entry?;
                items.push(serde_json::from_slice(value.value())?);
            }
            Ok(items)
        })
        .await?
    }
}

#[async_trait]
impl StorageDriver for RedbDriver {
    async fn ping(&self) -> anyhow::Result<()> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            db.begin_read()?;
            Ok(())
        })
        .await?
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn pool_stats(&self) -> PoolStats {
        PoolStats { open: 1, in_use: 0, idle: 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodian_core::AlgTag;
    use tempfile::NamedTempFile;

    fn record(device_id: &str, birth: i64, death: i64, shard: i32, record_id: i64) -> Record {
        Record {
            r#type: RecordType::Default,
            device_id: device_id.to_string(),
            birth_date: birth,
            death_date: death,
            data: vec![1],
            nonce: vec![],
            alg: AlgTag::None,
            kid: String::new(),
            record_id,
            shard,
        }
    }

    fn open_temp() -> (NamedTempFile, RedbDriver) {
        let file = NamedTempFile::new().unwrap();
        let driver = RedbDriver::open(file.path()).unwrap();
        (file, driver)
    }

    #[tokio::test]
    async fn insert_and_find_records_round_trip() {
        let (_file, driver) = open_temp();
        driver
            .insert_many(&[record("d1", 1, 100, 0, 1), record("d1", 2, 100, 0, 2)])
            .await
            .unwrap();

        let found = driver.find_records("d1", 10).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].birth_date, 2);
    }

    #[tokio::test]
    async fn zero_record_id_is_auto_assigned_and_does_not_collide() {
        let (_file, driver) = open_temp();
        driver
            .insert_many(&[record("d1", 1, 100, 0, 0), record("d1", 2, 100, 0, 0)])
            .await
            .unwrap();

        let found = driver.find_records("d1", 10).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_ne!(found[0].record_id, 0);
        assert_ne!(found[1].record_id, 0);
        assert_ne!(found[0].record_id, found[1].record_id);
    }

    #[tokio::test]
    async fn find_records_to_delete_and_delete_record() {
        let (_file, driver) = open_temp();
        driver.insert_many(&[record("d1", 1, 50, 0, 1)]).await.unwrap();

        let expired = driver.find_records_to_delete(0, 10, 100).await.unwrap();
        assert_eq!(expired.len(), 1);

        driver
            .delete_record(expired[0].shard, expired[0].death_date, expired[0].record_id)
            .await
            .unwrap();

        let remaining = driver.find_records_to_delete(0, 10, 100).await.unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn ping_succeeds_on_open_database() {
        let (_file, driver) = open_temp();
        driver.ping().await.unwrap();
    }
}
