//! Counting semaphore bounding concurrent knowledge ingestion.
//!
//! Waiters are served FIFO. `release` never raises the available count past
//! the configured maximum; a release with nothing outstanding is ignored.

use parking_lot::Mutex;
use tokio::sync::Semaphore as TokioSemaphore;

use crate::error::RuntimeError;

/// Counting semaphore with explicit `acquire`/`release`.
#[derive(Debug)]
pub struct Semaphore {
    inner: TokioSemaphore,
    max: usize,
    release_lock: Mutex<()>,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Semaphore {
            inner: TokioSemaphore::new(permits),
            max: permits,
            release_lock: Mutex::new(()),
        }
    }

    /// Wait for a permit. The permit is held until [`Semaphore::release`].
    pub async fn acquire(&self) -> Result<(), RuntimeError> {
        let permit = self
            .inner
            .acquire()
            .await
            .map_err(|_| RuntimeError::SemaphoreClosed)?;
        permit.forget();
        Ok(())
    }

    /// Return a permit, waking the next queued waiter if any.
    pub fn release(&self) {
        let _guard = self.release_lock.lock();
        if self.inner.available_permits() >= self.max {
            tracing::debug!(max = self.max, "Semaphore release ignored: already at capacity");
            return;
        }
        self.inner.add_permits(1);
    }

    /// Acquire a permit that is released when the guard drops.
    pub async fn acquire_guard(&self) -> Result<SemaphoreGuard<'_>, RuntimeError> {
        self.acquire().await?;
        Ok(SemaphoreGuard { semaphore: self })
    }

    /// Permits currently available
    pub fn available(&self) -> usize {
        self.inner.available_permits()
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Fail all current and future waiters
    pub fn close(&self) {
        self.inner.close();
    }
}

/// Holds one permit of a [`Semaphore`].
#[derive(Debug)]
pub struct SemaphoreGuard<'a> {
    semaphore: &'a Semaphore,
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_excess_acquirers_block_until_release() {
        let sem = Arc::new(Semaphore::new(2));
        sem.acquire().await.unwrap();
        sem.acquire().await.unwrap();
        assert_eq!(sem.available(), 0);

        let acquired = Arc::new(AtomicUsize::new(0));
        let waiter = {
            let sem = sem.clone();
            let acquired = acquired.clone();
            tokio::spawn(async move {
                sem.acquire().await.unwrap();
                acquired.fetch_add(1, Ordering::SeqCst);
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(acquired.load(Ordering::SeqCst), 0);

        sem.release();
        waiter.await.unwrap();
        assert_eq!(acquired.load(Ordering::SeqCst), 1);
        assert_eq!(sem.available(), 0);
    }

    #[tokio::test]
    async fn test_release_saturates_at_max() {
        let sem = Semaphore::new(3);
        sem.release();
        sem.release();
        assert_eq!(sem.available(), 3);

        sem.acquire().await.unwrap();
        sem.release();
        sem.release();
        assert_eq!(sem.available(), 3);
    }

    #[tokio::test]
    async fn test_guard_releases_on_drop() {
        let sem = Semaphore::new(1);
        {
            let _guard = sem.acquire_guard().await.unwrap();
            assert_eq!(sem.available(), 0);
        }
        assert_eq!(sem.available(), 1);
    }

    #[tokio::test]
    async fn test_closed_semaphore_errors() {
        let sem = Semaphore::new(0);
        sem.close();
        assert!(matches!(
            sem.acquire().await,
            Err(RuntimeError::SemaphoreClosed)
        ));
    }
}
