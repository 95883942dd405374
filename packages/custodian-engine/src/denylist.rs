//! Denylist cache: an in-memory, periodically-refreshed mapping from a
//! device-id pattern (literal or regex) to a free-text reason.
//!
//! Storage is `arc_swap::ArcSwap<DenylistSnapshot>` -- a copy-on-write
//! whole-map swap, so readers never block on a refresh in flight. Regexes
//! are compiled once per refresh, never per lookup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use custodian_core::DenylistedItem;
use regex::Regex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::driver::DenylistSource;

/// A single refresh generation: a literal fast-path map plus a compiled
/// regex slow path, checked in that order.
#[derive(Default)]
struct DenylistSnapshot {
    literals: HashMap<String, String>,
    patterns: Vec<(Regex, String)>,
}

impl DenylistSnapshot {
    fn build(items: &[DenylistedItem]) -> Self {
        let mut literals = HashMap::with_capacity(items.len());
        let mut patterns = Vec::new();
        for item in items {
            literals.insert(item.id.clone(), item.reason.clone());
            match anchored(&item.id) {
                Ok(re) => patterns.push((re, item.reason.clone())),
                Err(err) => warn!(pattern = %item.id, error = %err, "denylist pattern failed to compile"),
            }
        }
        Self { literals, patterns }
    }

    fn lookup(&self, id: &str) -> Option<String> {
        if let Some(reason) = self.literals.get(id) {
            return Some(reason.clone());
        }
        self.patterns.iter().find(|(re, _)| re.is_match(id)).map(|(_, reason)| reason.clone())
    }
}

fn anchored(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}

/// Refreshed, concurrently-readable denylist cache.
pub struct DenylistCache {
    snapshot: Arc<ArcSwap<DenylistSnapshot>>,
    refresher: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl DenylistCache {
    /// Performs one immediate refresh against `source`, then starts a
    /// background task that refreshes on every `refresh_interval` tick.
    ///
    /// # Errors
    ///
    /// Returns the error from the initial refresh if `source` fails before
    /// any snapshot exists to fall back on.
    pub async fn start<D>(source: Arc<D>, refresh_interval: Duration) -> anyhow::Result<Self>
    where
        D: DenylistSource + Send + Sync + 'static,
    {
        let items = source.get_denylist().await?;
        let snapshot = Arc::new(ArcSwap::from_pointee(DenylistSnapshot::build(&items)));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let refresher = tokio::spawn(refresh_loop(source, snapshot.clone(), refresh_interval, shutdown_rx));

        Ok(Self { snapshot, refresher, shutdown_tx })
    }

    /// Looks up `id` against the current snapshot. Returns `(reason, true)`
    /// on a hit (literal match takes priority over a regex match), or
    /// `("", false)` on a miss.
    #[must_use]
    pub fn in_list(&self, id: &str) -> (String, bool) {
        match self.snapshot.load().lookup(id) {
            Some(reason) => (reason, true),
            None => (String::new(), false),
        }
    }

    /// Signals the refresh loop to stop and waits for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.refresher.await;
    }
}

async fn refresh_loop<D>(
    source: Arc<D>,
    snapshot: Arc<ArcSwap<DenylistSnapshot>>,
    refresh_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    D: DenylistSource + Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval(refresh_interval.max(Duration::from_millis(1)));
    ticker.tick().await; // consume the immediate first tick; initial load already happened in `start`
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match source.get_denylist().await {
                    Ok(items) => snapshot.store(Arc::new(DenylistSnapshot::build(&items))),
                    Err(err) => warn!(error = %err, "denylist refresh failed, keeping previous snapshot"),
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    return;
                }
            }
        }
    }
}
