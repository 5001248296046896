//! Waiter objects and the pool that recycles them across waits.
//!
//! See the documentation on [`WaiterPool`] for more information.
//!
//! [`WaiterPool`]: struct.WaiterPool.html

use std::fmt;
use std::sync::{Arc, OnceLock};

use crossbeam_queue::ArrayQueue;
use tracing::trace;

use crate::config::PoolConfig;
use crate::sema::Semaphore;
use crate::waitable::Registration;

/// The thing a blocked thread actually sleeps on: one semaphore, shared by every registration of
/// a single wait.
pub(crate) struct Waiter {
    pub(crate) sem: Semaphore,
}

impl Waiter {
    pub(crate) fn new() -> Waiter {
        Waiter {
            sem: Semaphore::new(),
        }
    }
}

/// A pool of waiter objects, so that a blocking wait does not allocate a fresh semaphore each
/// time.
///
/// Every blocking [`wait_many`] checks out one waiter, shares it among the registrations it makes,
/// and returns it when the wait finishes. The pool is a bounded lock-free queue: checkouts from an
/// empty pool allocate, and returns to a full pool drop the waiter.
///
/// Most code uses the shared pool from [`WaiterPool::global`]. A separate pool can be injected
/// with [`Counter::with_pool`] or by calling [`WaiterPool::wait_many`] directly.
///
/// [`wait_many`]: fn.wait_many.html
/// [`WaiterPool::global`]: #method.global
/// [`WaiterPool::wait_many`]: #method.wait_many
/// [`Counter::with_pool`]: struct.Counter.html#method.with_pool
///
/// # Example
///
/// ```
/// use waitables::{Counter, Deadline, WaiterPool};
/// use std::sync::Arc;
///
/// let pool = Arc::new(WaiterPool::new());
/// let counter = Counter::with_pool(1, pool.clone());
///
/// // times out right away, but still goes through the pool
/// assert_eq!(counter.wait(Deadline::At(std::time::Instant::now())), 1);
/// assert_eq!(pool.idle(), 1);
/// ```
pub struct WaiterPool {
    idle: ArrayQueue<Arc<Waiter>>,
}

impl WaiterPool {
    /// Creates a pool with the default configuration.
    pub fn new() -> WaiterPool {
        WaiterPool::with_config(PoolConfig::default())
    }

    /// Creates a pool with the given configuration.
    pub fn with_config(config: PoolConfig) -> WaiterPool {
        let idle = ArrayQueue::new(config.effective_capacity());
        for _ in 0..config.effective_prewarm() {
            // capacity was checked above, this never overflows the queue
            let _ = idle.push(Arc::new(Waiter::new()));
        }

        WaiterPool { idle }
    }

    /// Returns the process-wide pool, creating it on first use.
    pub fn global() -> Arc<WaiterPool> {
        static GLOBAL: OnceLock<Arc<WaiterPool>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(WaiterPool::new())).clone()
    }

    /// Returns the number of idle waiters currently held by the pool.
    pub fn idle(&self) -> usize {
        self.idle.len()
    }

    /// Returns the maximum number of idle waiters this pool keeps.
    pub fn capacity(&self) -> usize {
        self.idle.capacity()
    }

    /// Takes a waiter out of the pool, allocating one if the pool is empty. The waiter goes back
    /// into the pool when the returned guard drops.
    pub fn checkout(&self) -> PooledWaiter<'_> {
        let waiter = self.idle.pop().unwrap_or_else(|| {
            trace!(capacity = self.capacity(), "waiter pool empty, allocating");
            Arc::new(Waiter::new())
        });

        PooledWaiter {
            pool: self,
            waiter: Some(waiter),
        }
    }

    fn checkin(&self, waiter: Arc<Waiter>) {
        // a waiter some waitable still holds a handle to must not be handed to another thread
        if Arc::strong_count(&waiter) != 1 {
            return;
        }

        waiter.sem.drain();
        let _ = self.idle.push(waiter);
    }
}

impl Default for WaiterPool {
    fn default() -> WaiterPool {
        WaiterPool::new()
    }
}

impl fmt::Debug for WaiterPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaiterPool")
            .field("idle", &self.idle())
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// A waiter checked out of a [`WaiterPool`]. Returns the waiter to the pool on drop.
///
/// [`WaiterPool`]: struct.WaiterPool.html
pub struct PooledWaiter<'a> {
    pool: &'a WaiterPool,
    waiter: Option<Arc<Waiter>>,
}

impl<'a> PooledWaiter<'a> {
    /// Creates a fresh registration that wakes this waiter.
    pub fn register(&self) -> Registration {
        Registration::new(self.waiter().clone())
    }

    pub(crate) fn waiter(&self) -> &Arc<Waiter> {
        match self.waiter {
            Some(ref waiter) => waiter,
            None => unreachable!("pooled waiter used after being returned"),
        }
    }
}

impl<'a> Drop for PooledWaiter<'a> {
    fn drop(&mut self) {
        if let Some(waiter) = self.waiter.take() {
            self.pool.checkin(waiter);
        }
    }
}

impl<'a> fmt::Debug for PooledWaiter<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledWaiter").finish()
    }
}
