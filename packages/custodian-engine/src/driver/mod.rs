//! Storage driver trait hierarchy and concrete backends.
//!
//! A small set of `async_trait` contracts, one blanket trait implementors
//! satisfy in full, and feature-gated concrete backends (`memory` always
//! on, `redb` default-on, `postgres` opt-in).
//!
//! [`Inserter`], [`RecordGetter`], and [`Pruner`] are kept as separate
//! traits (rather than one monolithic trait) so a conformance test can
//! assert each independently against every concrete driver.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "redb")]
pub mod redb_backend;

use async_trait::async_trait;
use custodian_core::{DenylistedItem, Record, RecordToDelete};

pub use memory::MemoryDriver;
#[cfg(feature = "postgres")]
pub use postgres::PostgresDriver;
#[cfg(feature = "redb")]
pub use redb_backend::RedbDriver;

/// Snapshot of a driver's connection pool, exposed for the pool gauges in
/// `custodian_core::metrics::gauges`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Currently open connections.
    pub open: u32,
    /// Connections currently checked out.
    pub in_use: u32,
    /// Idle connections available for reuse.
    pub idle: u32,
}

/// Atomically inserts a batch of records.
#[async_trait]
pub trait Inserter: Send + Sync {
    /// Inserts all `records` in a single atomic operation, returning the
    /// number of rows persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if `records` is empty, or if the underlying store
    /// fails the write.
    async fn insert_many(&self, records: &[Record]) -> anyhow::Result<u64>;
}

/// Reads a device's record history.
#[async_trait]
pub trait RecordGetter: Send + Sync {
    /// Returns at most `limit` most-recent records for `device_id`, ordered
    /// by `birth_date` descending.
    async fn find_records(&self, device_id: &str, limit: u32) -> anyhow::Result<Vec<Record>>;

    /// As [`find_records`](Self::find_records), filtered to the given event
    /// type.
    async fn find_records_of_type(
        &self,
        device_id: &str,
        limit: u32,
        record_type: custodian_core::RecordType,
    ) -> anyhow::Result<Vec<Record>>;
}

/// Discovers and deletes expired rows.
#[async_trait]
pub trait Pruner: Send + Sync {
    /// Returns up to `limit` records in `shard` whose `death_date < now_ns`.
    async fn find_records_to_delete(
        &self,
        shard: i32,
        limit: u32,
        now_ns: i64,
    ) -> anyhow::Result<Vec<RecordToDelete>>;

    /// Deletes exactly one row identified by `(shard, death_date, record_id)`.
    /// A no-op if the row is already gone.
    async fn delete_record(&self, shard: i32, death_date: i64, record_id: i64) -> anyhow::Result<()>;
}

/// Reads the denylist table.
#[async_trait]
pub trait DenylistSource: Send + Sync {
    /// Returns every denylist entry.
    async fn get_denylist(&self) -> anyhow::Result<Vec<DenylistedItem>>;
}

/// The full storage driver contract consumed by the retry facade.
///
/// Implementations include a relational backend ([`PostgresDriver`], feature
/// `postgres`) and a document-store-style embedded backend ([`RedbDriver`],
/// feature `redb`); [`MemoryDriver`] is always available as a reference
/// implementation and test double. The core never assumes a specific SQL
/// dialect -- only this trait.
#[async_trait]
pub trait StorageDriver: Inserter + RecordGetter + Pruner + DenylistSource + Send + Sync {
    /// Verifies connectivity to the backing store.
    async fn ping(&self) -> anyhow::Result<()>;

    /// Releases all resources held by this driver. Idempotent.
    async fn close(&self) -> anyhow::Result<()>;

    /// Returns a snapshot of the connection pool, for the pool gauges.
    fn pool_stats(&self) -> PoolStats;
}

/// Every concrete driver must reject an empty batch with
/// [`custodian_core::CoreError::EmptyBatch`]. Shared by every backend so the
/// check and its error message stay identical across implementations.
///
/// # Errors
///
/// Returns [`custodian_core::CoreError::EmptyBatch`] if `records` is empty.
pub fn require_non_empty(records: &[Record]) -> anyhow::Result<()> {
    if records.is_empty() {
        return Err(custodian_core::CoreError::EmptyBatch.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Compiles only if `D` implements every sub-trait `StorageDriver`
    /// requires; instantiating it below is the conformance check.
    fn assert_storage_driver<D: StorageDriver>() {}

    #[test]
    fn memory_driver_satisfies_storage_driver_contract() {
        assert_storage_driver::<MemoryDriver>();
    }

    #[cfg(feature = "redb")]
    #[test]
    fn redb_driver_satisfies_storage_driver_contract() {
        assert_storage_driver::<RedbDriver>();
    }

    #[cfg(feature = "postgres")]
    #[test]
    fn postgres_driver_satisfies_storage_driver_contract() {
        assert_storage_driver::<PostgresDriver>();
    }

    #[test]
    fn require_non_empty_rejects_empty_slice() {
        let err = require_non_empty(&[]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<custodian_core::CoreError>(),
            Some(custodian_core::CoreError::EmptyBatch)
        ));
    }
}
