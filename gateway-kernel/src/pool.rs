//! Bounded pool limiting how many dispatches run at once.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Slots used when no pool size is configured.
pub const DEFAULT_POOL_SIZE: NonZeroUsize = match NonZeroUsize::new(4) {
    Some(size) => size,
    None => unreachable!(),
};

/// Number of dispatches allowed in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    size: NonZeroUsize,
}

impl PoolConfig {
    /// Creates a configuration with the supplied worker count.
    #[must_use]
    pub const fn new(size: NonZeroUsize) -> Self {
        Self { size }
    }

    /// Returns the worker count.
    #[must_use]
    pub const fn size(self) -> NonZeroUsize {
        self.size
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}

/// Fixed-size pool of dispatch slots.
///
/// Callers beyond the bound wait for a slot instead of running concurrently.
/// Clones share the same slots.
#[derive(Debug, Clone)]
pub struct DispatchPool {
    semaphore: Arc<Semaphore>,
    closed: Arc<AtomicBool>,
    config: PoolConfig,
}

impl DispatchPool {
    /// Constructs a pool using the provided configuration.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.size().get())),
            closed: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    /// Returns the associated configuration.
    #[must_use]
    pub const fn config(&self) -> PoolConfig {
        self.config
    }

    /// Number of dispatches currently holding a slot.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.config
            .size()
            .get()
            .saturating_sub(self.semaphore.available_permits())
    }

    /// Returns `true` once the pool has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the pool. Waiting and future callers get [`PoolError::Closed`];
    /// dispatches already running are unaffected.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.semaphore.close();
    }

    /// Waits for a free slot.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Closed`] when the pool is closed before a slot frees up.
    pub async fn acquire(&self) -> PoolResult<OwnedSemaphorePermit> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)
    }

    /// Runs `future` while holding a slot. The slot is released when the
    /// future completes or is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Closed`] when no slot can be acquired.
    pub async fn run<F>(&self, future: F) -> PoolResult<F::Output>
    where
        F: Future,
    {
        let _permit = self.acquire().await?;
        Ok(future.await)
    }
}

impl Default for DispatchPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

/// Errors produced by the pool.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// Pool is closed and will not accept new dispatches.
    #[error("dispatch pool closed")]
    Closed,
}

/// Result alias for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn default_config_has_four_slots() {
        assert_eq!(PoolConfig::default().size().get(), 4);
        assert_eq!(DispatchPool::default().config().size(), DEFAULT_POOL_SIZE);
    }

    #[tokio::test]
    async fn respects_pool_size() {
        let pool = DispatchPool::new(PoolConfig::new(NonZeroUsize::new(2).unwrap()));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let pool = pool.clone();
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                pool.run(async {
                    let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(current, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                })
                .await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 2);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn dropped_future_releases_its_slot() {
        let pool = DispatchPool::new(PoolConfig::new(NonZeroUsize::MIN));
        let stalled = pool.run(std::future::pending::<()>());
        let timed_out = tokio::time::timeout(Duration::from_millis(10), stalled).await;
        assert!(timed_out.is_err());

        assert_eq!(pool.in_flight(), 0);
        assert_eq!(pool.run(async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn close_rejects_new_dispatches() {
        let pool = DispatchPool::default();
        assert_eq!(pool.config().size().get(), 4);
        pool.close();

        assert_eq!(pool.run(async {}).await, Err(PoolError::Closed));
    }
}
