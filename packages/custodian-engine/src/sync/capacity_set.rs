//! Bounded, deduplicating, FIFO-evicting set used as the reclaimer's
//! inter-stage buffer between discovery and deletion.
//!
//! A plain FIFO channel would re-enqueue duplicates the discovery stage
//! rediscovers across ticks while deletion is still draining the previous
//! batch; `CapacitySet` dedups on [`add`](CapacitySet::add) and evicts the
//! oldest pending item once full, so a slow deletion stage bounds memory
//! instead of back-pressuring discovery indefinitely. Internal mutation is
//! guarded by `parking_lot::Mutex`, matching the locking idiom used
//! elsewhere in this crate for small, short-held critical sections.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

struct Inner<T> {
    order: VecDeque<T>,
    members: HashSet<T>,
    capacity: usize,
}

impl<T: Eq + Hash + Clone> Inner<T> {
    fn add(&mut self, item: T) -> bool {
        if self.members.contains(&item) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
        self.order.push_back(item.clone());
        self.members.insert(item);
        true
    }

    fn pop(&mut self) -> Option<T> {
        let item = self.order.pop_front()?;
        self.members.remove(&item);
        Some(item)
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

/// A bounded, deduplicating, FIFO-evicting container.
///
/// Holds up to `capacity` distinct items. Duplicate [`add`](Self::add) calls
/// are no-ops; once full, the oldest-inserted item is evicted to make room
/// for the new one. In-memory only -- there is no persistence and no
/// failure mode beyond the process dying.
pub struct CapacitySet<T> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
    shut_down: AtomicBool,
}

impl<T: Eq + Hash + Clone> CapacitySet<T> {
    /// Creates a set that holds at most `capacity` distinct items.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                order: VecDeque::with_capacity(capacity),
                members: HashSet::with_capacity(capacity),
                capacity: capacity.max(1),
            }),
            notify: Notify::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Inserts `item` if it is not already present.
    ///
    /// Returns `false` if `item` was already queued (no duplication).
    /// Returns `true` on insertion, whether or not an eviction happened to
    /// make room. Wakes one suspended [`blocking_pop`](Self::blocking_pop)
    /// caller, if any.
    pub fn add(&self, item: T) -> bool {
        let inserted = self.inner.lock().add(item);
        if inserted {
            self.notify.notify_one();
        }
        inserted
    }

    /// Removes and returns the oldest-inserted item, or `None` if empty.
    #[must_use]
    pub fn pop(&self) -> Option<T> {
        self.inner.lock().pop()
    }

    /// Returns the number of items currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns `true` if the set holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Signals shutdown: any suspended or future [`blocking_pop`](Self::blocking_pop)
    /// call returns `None` once the set has drained.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Removes and returns the next item, suspending the caller until one
    /// is available or the set is shut down.
    ///
    /// Returns `None` only after [`shutdown`](Self::shutdown) has been
    /// called and the set has no more items to drain.
    pub async fn blocking_pop(&self) -> Option<T> {
        loop {
            if let Some(item) = self.pop() {
                return Some(item);
            }
            if self.shut_down.load(Ordering::SeqCst) {
                return None;
            }
            let notified = self.notify.notified();
            // Re-check after registering interest to avoid missing a
            // notification that fired between the checks above and here.
            if let Some(item) = self.pop() {
                return Some(item);
            }
            if self.shut_down.load(Ordering::SeqCst) {
                return None;
            }
            notified.await;
        }
    }
}

impl<T> std::fmt::Debug for CapacitySet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapacitySet").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn dedup_rejects_existing_member() {
        let set: CapacitySet<&str> = CapacitySet::new(2);
        assert!(set.add("a"));
        assert!(set.add("b"));
        assert!(!set.add("a"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn dedup_pop_preserves_fifo_order() {
        let set: CapacitySet<&str> = CapacitySet::new(2);
        set.add("a");
        set.add("b");
        set.add("a");
        assert_eq!(set.pop(), Some("a"));
        assert_eq!(set.pop(), Some("b"));
        assert_eq!(set.pop(), None);
    }

    #[test]
    fn fifo_eviction_drops_oldest_when_full() {
        let set: CapacitySet<&str> = CapacitySet::new(2);
        set.add("a");
        set.add("b");
        set.add("c");
        assert_eq!(set.len(), 2);
        assert_eq!(set.pop(), Some("b"));
        assert_eq!(set.pop(), Some("c"));
    }

    #[tokio::test]
    async fn blocking_pop_returns_immediately_when_populated() {
        let set: CapacitySet<i32> = CapacitySet::new(4);
        set.add(1);
        assert_eq!(set.blocking_pop().await, Some(1));
    }

    #[tokio::test]
    async fn blocking_pop_suspends_until_add() {
        let set = Arc::new(CapacitySet::<i32>::new(4));
        let set2 = set.clone();

        let popper = tokio::spawn(async move { set2.blocking_pop().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!popper.is_finished());

        set.add(7);
        assert_eq!(popper.await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn blocking_pop_returns_none_after_shutdown_drains() {
        let set: CapacitySet<i32> = CapacitySet::new(4);
        set.shutdown();
        assert_eq!(set.blocking_pop().await, None);
    }

    #[tokio::test]
    async fn blocking_pop_drains_before_honoring_shutdown() {
        let set: CapacitySet<i32> = CapacitySet::new(4);
        set.add(1);
        set.shutdown();
        assert_eq!(set.blocking_pop().await, Some(1));
        assert_eq!(set.blocking_pop().await, None);
    }
}
