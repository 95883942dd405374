//! Counted-permit primitive capping concurrent work.
//!
//! Thin wrapper over [`tokio::sync::Semaphore`] used by the batched writer
//! (capping concurrent `insert_many` calls) and the reclaimer (capping
//! concurrent `delete_record` calls). No fairness guarantees beyond what
//! `tokio` itself provides, which is first-in-first-out permit acquisition
//! -- enough to avoid starvation under steady load.

use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore as TokioSemaphore, SemaphorePermit};

/// A counted-permit semaphore.
#[derive(Debug, Clone)]
pub struct Semaphore {
    inner: Arc<TokioSemaphore>,
}

impl Semaphore {
    /// Creates a semaphore with `permits` initial permits available.
    #[must_use]
    pub fn new(permits: usize) -> Self {
        Self { inner: Arc::new(TokioSemaphore::new(permits)) }
    }

    /// Acquires a single permit, suspending the caller until one is free.
    ///
    /// # Errors
    ///
    /// Returns an error only if the semaphore has been closed, which this
    /// type never does -- callers can treat this as infallible in practice.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>, AcquireError> {
        self.inner.acquire().await
    }

    /// Acquires a single permit that owns a clone of the underlying `Arc`,
    /// so it can be moved into a spawned task rather than borrowing `self`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the semaphore has been closed, which this
    /// type never does -- callers can treat this as infallible in practice.
    pub async fn acquire_owned(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        self.inner.clone().acquire_owned().await
    }

    /// Acquires every outstanding permit, suspending until all `total`
    /// permits configured at construction are free. Used by `stop()` paths
    /// to wait for all in-flight workers to finish.
    ///
    /// # Errors
    ///
    /// Returns an error only if the semaphore has been closed.
    pub async fn acquire_all(&self, total: u32) -> Result<SemaphorePermit<'_>, AcquireError> {
        self.inner.acquire_many(total).await
    }

    /// Returns the number of permits currently available.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.inner.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn acquire_and_release_restores_permit() {
        let sem = Semaphore::new(1);
        assert_eq!(sem.available_permits(), 1);

        let permit = sem.acquire().await.unwrap();
        assert_eq!(sem.available_permits(), 0);

        drop(permit);
        assert_eq!(sem.available_permits(), 1);
    }

    #[tokio::test]
    async fn second_acquire_blocks_until_release() {
        let sem = Semaphore::new(1);
        let permit = sem.acquire().await.unwrap();

        let sem2 = sem.clone();
        let waiter = tokio::spawn(async move {
            let _p = sem2.acquire().await.unwrap();
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(permit);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn acquire_all_waits_for_every_permit() {
        let sem = Semaphore::new(3);
        let p1 = sem.acquire().await.unwrap();
        let p2 = sem.acquire().await.unwrap();

        let sem2 = sem.clone();
        let waiter = tokio::spawn(async move {
            let _all = sem2.acquire_all(3).await.unwrap();
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(p1);
        drop(p2);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn owned_permit_can_move_into_spawned_task() {
        let sem = Semaphore::new(1);
        let permit = sem.acquire_owned().await.unwrap();

        let task = tokio::spawn(async move {
            let _permit = permit;
        });
        task.await.unwrap();

        assert_eq!(sem.available_permits(), 1);
    }
}
