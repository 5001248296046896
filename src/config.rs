//! Construction-time configuration for the waiter pool.

/// How many idle waiters a [`WaiterPool`] keeps when none is given.
///
/// [`WaiterPool`]: struct.WaiterPool.html
pub const DEFAULT_POOL_CAPACITY: usize = 64;

/// Configuration for a [`WaiterPool`].
///
/// [`WaiterPool`]: struct.WaiterPool.html
///
/// # Example
///
/// ```
/// use waitables::{PoolConfig, WaiterPool};
///
/// let pool = WaiterPool::with_config(PoolConfig::new(8).with_prewarm(2));
/// assert_eq!(pool.idle(), 2);
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of idle waiters kept for reuse. Waiters returned to a full pool are
    /// dropped. A capacity of zero is treated as one.
    pub capacity: usize,
    /// Number of waiters allocated up front when the pool is created. Clamped to `capacity`.
    pub prewarm: usize,
}

impl Default for PoolConfig {
    fn default() -> PoolConfig {
        PoolConfig::new(DEFAULT_POOL_CAPACITY)
    }
}

impl PoolConfig {
    /// A configuration with the given capacity and no prewarmed waiters.
    pub const fn new(capacity: usize) -> PoolConfig {
        PoolConfig {
            capacity,
            prewarm: 0,
        }
    }

    /// Sets the number of waiters to allocate up front.
    pub const fn with_prewarm(self, prewarm: usize) -> PoolConfig {
        PoolConfig { prewarm, ..self }
    }

    pub(crate) fn effective_capacity(&self) -> usize {
        self.capacity.max(1)
    }

    pub(crate) fn effective_prewarm(&self) -> usize {
        self.prewarm.min(self.effective_capacity())
    }
}
