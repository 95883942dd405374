//! Stable metric names and the operation-kind label domain.
//!
//! These strings are the wire contract between this crate and whatever
//! metrics registry the embedder wires up (out of scope here, per the
//! purpose statement); the core only ever calls through the `metrics`
//! crate's global recorder, never builds a registry of its own.

use std::fmt;

/// Operation-kind label used on every `sql_query_*_count{type}` counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// `insert_many` calls.
    Insert,
    /// `delete_record` calls.
    Delete,
    /// `find_records`/`find_records_of_type`/`find_records_to_delete` calls.
    Read,
    /// `ping` calls.
    Ping,
    /// `get_denylist` calls.
    DenylistRead,
}

impl OperationKind {
    /// Returns the stable label string used as the `type` tag value.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Delete => "delete",
            Self::Read => "read",
            Self::Ping => "ping",
            Self::DenylistRead => "denylistRead",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Gauge names.
pub mod gauges {
    /// Depth of the batched writer's pending-insert queue.
    pub const INSERTING_QUEUE_DEPTH: &str = "inserting_queue_depth";
    /// Depth of the reclaimer's capacity set awaiting deletion.
    pub const DELETING_QUEUE_DEPTH: &str = "deleting_queue_depth";
    /// Driver connection pool: currently open connections.
    pub const POOL_OPEN_CONNECTIONS: &str = "pool_open_connections";
    /// Driver connection pool: connections currently checked out.
    pub const POOL_IN_USE_CONNECTIONS: &str = "pool_in_use_connections";
    /// Driver connection pool: idle connections available for reuse.
    pub const POOL_IDLE_CONNECTIONS: &str = "pool_idle_connections";
}

/// Counter names.
pub mod counters {
    /// Total time connections spent waiting for a pool slot.
    pub const SQL_WAIT_COUNT: &str = "sql_wait_count";
    /// Total wait duration for pool slots, in seconds.
    pub const SQL_WAIT_DURATION_SECONDS: &str = "sql_wait_duration_seconds";
    /// Connections closed for exceeding the pool's max-idle setting.
    pub const SQL_MAX_IDLE_CLOSED: &str = "sql_max_idle_closed";
    /// Connections closed for exceeding the pool's max-lifetime setting.
    pub const SQL_MAX_LIFETIME_CLOSED: &str = "sql_max_lifetime_closed";
    /// Successful driver calls, labelled by [`super::OperationKind`].
    pub const SQL_QUERY_SUCCESS_COUNT: &str = "sql_query_success_count";
    /// Failed driver calls, labelled by [`super::OperationKind`].
    pub const SQL_QUERY_FAILURE_COUNT: &str = "sql_query_failure_count";
    /// Retry attempts, labelled by [`super::OperationKind`]. Incremented once
    /// per retry, not per initial attempt.
    pub const SQL_QUERY_RETRY_COUNT: &str = "sql_query_retry_count";
    /// Terminal attempts (success or exhausted retries), labelled by
    /// [`super::OperationKind`]. Incremented exactly once per call through
    /// the retry facade.
    pub const SQL_QUERY_END_COUNT: &str = "sql_query_end_count";
    /// Rows inserted.
    pub const SQL_INSERTED_ROWS: &str = "sql_inserted_rows";
    /// Rows read.
    pub const SQL_READ_ROWS: &str = "sql_read_rows";
    /// Rows deleted.
    pub const SQL_DELETED_ROWS: &str = "sql_deleted_rows";
    /// Events dropped because the driver failed and were not retried further.
    pub const DROPPED_EVENTS_DB_FAIL_COUNT: &str = "dropped_events_db_fail_count";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_kind_labels_match_spec_domain() {
        assert_eq!(OperationKind::Insert.label(), "insert");
        assert_eq!(OperationKind::Delete.label(), "delete");
        assert_eq!(OperationKind::Read.label(), "read");
        assert_eq!(OperationKind::Ping.label(), "ping");
        assert_eq!(OperationKind::DenylistRead.label(), "denylistRead");
    }

    #[test]
    fn operation_kind_display_matches_label() {
        assert_eq!(OperationKind::Read.to_string(), "read");
    }
}
