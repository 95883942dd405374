//! Custodian engine: batched writer, expired-row reclaimer, retry facade,
//! denylist cache, and encryption envelope on top of a pluggable storage
//! driver.

pub mod crypto;
pub mod denylist;
pub mod driver;
pub mod reclaimer;
pub mod retry;
pub mod sync;
pub mod telemetry;
pub mod writer;

pub use denylist::DenylistCache;
pub use driver::{DenylistSource, Inserter, MemoryDriver, PoolStats, Pruner, RecordGetter, StorageDriver};
pub use reclaimer::{Reclaimer, ReclaimerConfig};
pub use retry::{RetryConfig, RetryDriver};
pub use writer::{BatchedWriter, WriterConfig, WriterHandle};

#[cfg(feature = "postgres")]
pub use driver::PostgresDriver;
#[cfg(feature = "redb")]
pub use driver::RedbDriver;

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        let _ = crate::RetryConfig::default();
    }
}
