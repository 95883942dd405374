//! Custodian core -- the record schema, error kinds, and metrics taxonomy
//! shared by the inserter, reader, and pruner services.
//!
//! - **Record** ([`record`]): [`Record`], [`RecordToDelete`], [`DenylistedItem`],
//!   and the `AlgTag`/`HashTag`/`RecordType` wire enums
//! - **Error** ([`error`]): [`CoreError`], the error kinds surfaced to callers
//! - **Metrics** ([`metrics`]): stable counter/gauge names and the
//!   [`metrics::OperationKind`] label domain

pub mod error;
pub mod metrics;
pub mod record;

pub use error::CoreError;
pub use metrics::OperationKind;
pub use record::{AlgTag, DenylistedItem, HashTag, Record, RecordToDelete, RecordType};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
