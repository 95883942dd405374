//! Error kinds shared across the inserter, reader, and pruner.
//!
//! Mirrors the five recoverable/fatal kinds a caller needs to distinguish:
//! configuration, driver, empty-batch, decryption, and shutdown. `Transient`
//! is intentionally absent from this public enum: it is an internal retry
//! state that gets promoted to [`CoreError::Driver`] once retries are
//! exhausted, never observed outside the retry facade.

use thiserror::Error;

/// Top-level error type returned by the core subsystems.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid or missing configuration. Fatal at startup; never recovered.
    #[error("configuration error: {0}")]
    Config(String),

    /// A call to the storage driver failed after exhausting all retries.
    #[error("driver error ({operation}): {source}")]
    Driver {
        /// Metric label for the operation kind (`insert`, `delete`, `read`,
        /// `ping`, `denylistRead`).
        operation: &'static str,
        /// The last error observed from the driver.
        #[source]
        source: anyhow::Error,
    },

    /// Attempted to insert zero records.
    #[error("insert called with an empty batch")]
    EmptyBatch,

    /// Ciphertext/signature validation failed, or no decrypter is
    /// registered for the record's `(alg, kid)` pair.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// The receiver observed a stop signal; this is a graceful condition,
    /// not a failure.
    #[error("shutting down")]
    Shutdown,
}

impl CoreError {
    /// Builds a [`CoreError::Driver`] for the given metric label, wrapping
    /// an arbitrary source error.
    pub fn driver(operation: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::Driver { operation, source: source.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_error_preserves_operation_label() {
        let err = CoreError::driver("insert", anyhow::anyhow!("connection reset"));
        match err {
            CoreError::Driver { operation, .. } => assert_eq!(operation, "insert"),
            _ => panic!("expected Driver variant"),
        }
    }

    #[test]
    fn display_messages_are_stable() {
        assert_eq!(CoreError::EmptyBatch.to_string(), "insert called with an empty batch");
        assert_eq!(CoreError::Shutdown.to_string(), "shutting down");
    }
}
