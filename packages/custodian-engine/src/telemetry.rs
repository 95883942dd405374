//! Tracing-subscriber initialization for binaries that embed this crate.
//!
//! A leaf module with no dependency on anything else here, matching
//! `server-rust`'s use of `tracing-subscriber` for its own process-wide
//! subscriber setup. Subsystems never take a logger argument -- they log
//! through the ambient `tracing` subscriber this installs.

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber reading filter directives from the
/// `RUST_LOG` environment variable (default `info` if unset).
///
/// Intended for binaries, not tests: a test crate typically calls
/// `tracing_subscriber::fmt().with_test_writer().try_init()` itself if it
/// wants log output.
///
/// # Errors
///
/// Returns an error if a global subscriber has already been installed.
pub fn init() -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_does_not_panic_on_first_call() {
        let _ = init();
    }
}
