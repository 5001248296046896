//! A counter that threads can wait on until it reaches zero.
//!
//! The primary type in this module is the [`Counter`] struct. See the documentation on that type
//! for further information.
//!
//! [`Counter`]: struct.Counter.html

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::trace;

use crate::list::WaitList;
use crate::time::Deadline;
use crate::waitable::{Registration, WaitableId, Wakeup, Waitable};
use crate::waiter::WaiterPool;

/// A synchronization primitive whose waiters block until its count reaches zero.
///
/// With a `Counter`, one thread can wait for a set of computations happening in other threads by
/// having the other threads add to the counter when they take on work and subtract from it when
/// they finish. It serves both as a countdown latch (start at `n`, count down) and as a wait
/// group (count up and down as work is spawned and completed).
///
/// Reading the counter, either through [`value`] or through `add(0)`, never takes a lock and
/// never blocks. Every other `add` takes the counter's lock. When an `add` brings the count to
/// exactly zero, every thread currently waiting is woken at once.
///
/// `Counter` also implements [`Waitable`], so it can be waited on together with other objects
/// through [`wait_many`].
///
/// # Misuse
///
/// The following are programming errors and panic:
///
/// * subtracting below zero, or adding past `u32::MAX`;
/// * adding to a counter that sits at zero after a wait on it has been observed: waiters treat
///   zero as final, so bringing the counter back up would break their view of it;
/// * dropping a counter while a registration is still linked into it.
///
/// [`try_add`] reports the first two as a [`CounterError`] instead.
///
/// [`value`]: #method.value
/// [`try_add`]: #method.try_add
/// [`Waitable`]: trait.Waitable.html
/// [`wait_many`]: fn.wait_many.html
/// [`CounterError`]: enum.CounterError.html
///
/// # Example
///
/// This example uses a `Counter` to make the "coordinator" thread sleep until all of its "worker"
/// threads have finished. Each worker subtracts one when its work is done. When the last one
/// brings the counter to zero, the coordinator wakes up and prints `all done!`.
///
/// ```
/// use waitables::{Counter, Deadline};
/// use std::sync::Arc;
/// use std::thread;
/// use std::time::Duration;
///
/// let thread_count = 5;
/// let counter = Arc::new(Counter::new(thread_count));
///
/// for i in 0..thread_count {
///     let signal = counter.clone();
///     thread::spawn(move || {
///         thread::sleep(Duration::from_millis(10 * i as u64));
///         println!("thread {} activated!", i);
///         signal.add(-1);
///     });
/// }
///
/// assert_eq!(counter.wait(Deadline::Never), 0);
///
/// println!("all done!");
/// ```
pub struct Counter {
    value: AtomicU32,
    waited: AtomicBool,
    // also serializes every nonzero `add`
    waiters: Mutex<WaitList<Wakeup>>,
    id: WaitableId,
    pool: Arc<WaiterPool>,
}

/// The ways an update to a [`Counter`] can be rejected.
///
/// [`Counter::add`] panics with these; [`Counter::try_add`] returns them.
///
/// [`Counter`]: struct.Counter.html
/// [`Counter::add`]: struct.Counter.html#method.add
/// [`Counter::try_add`]: struct.Counter.html#method.try_add
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum CounterError {
    /// Adding would have pushed the counter past `u32::MAX`.
    #[error("counter overflow: adding {delta} to {value} exceeds u32::MAX")]
    Overflow {
        /// The value before the update.
        value: u32,
        /// The rejected delta.
        delta: i32,
    },
    /// Subtracting would have taken the counter below zero.
    #[error("counter underflow: adding {delta} to {value} goes below zero")]
    Underflow {
        /// The value before the update.
        value: u32,
        /// The rejected delta.
        delta: i32,
    },
    /// The counter was at zero and has been waited on, so it can't be increased again.
    #[error("counter increased by {delta} from zero after a wait on it was observed")]
    AlreadyWaited {
        /// The rejected delta.
        delta: i32,
    },
}

impl Counter {
    /// Creates a new `Counter` with the given value, waiting through the global waiter pool.
    pub fn new(initial: u32) -> Counter {
        Counter::with_pool(initial, WaiterPool::global())
    }

    /// Creates a new `Counter` with the given value, waiting through `pool`.
    pub fn with_pool(initial: u32, pool: Arc<WaiterPool>) -> Counter {
        Counter {
            value: AtomicU32::new(initial),
            waited: AtomicBool::new(false),
            waiters: Mutex::new(WaitList::new()),
            id: WaitableId::next(),
            pool,
        }
    }

    /// Returns the current value.
    pub fn value(&self) -> u32 {
        self.value.load(Ordering::Acquire)
    }

    /// Adds `delta` to the counter and returns the new value.
    ///
    /// An `add(0)` is the same as [`value`]: it takes no lock and wakes nobody. If the new value
    /// is zero, every waiting thread is woken.
    ///
    /// # Panics
    ///
    /// Panics in every case where [`try_add`] would return an error.
    ///
    /// [`value`]: #method.value
    /// [`try_add`]: #method.try_add
    pub fn add(&self, delta: i32) -> u32 {
        match self.try_add(delta) {
            Ok(value) => value,
            Err(err) => panic!("{}", err),
        }
    }

    /// Adds `delta` to the counter and returns the new value, or returns an error and leaves the
    /// counter untouched.
    ///
    /// # Errors
    ///
    /// * `CounterError::Overflow` if the result would exceed `u32::MAX`.
    /// * `CounterError::Underflow` if the result would be negative.
    /// * `CounterError::AlreadyWaited` if `delta` is positive, the counter is at zero, and some
    ///   thread has already waited on it.
    pub fn try_add(&self, delta: i32) -> Result<u32, CounterError> {
        if delta == 0 {
            return Ok(self.value());
        }

        let mut waiters = self.waiters.lock();

        // the lock serializes writers, but readers see `value` without it
        let mut current = self.value.load(Ordering::Relaxed);
        let new_value = loop {
            let new_value = self.apply(current, delta)?;
            match self.value.compare_exchange_weak(
                current,
                new_value,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break new_value,
                Err(actual) => current = actual,
            }
        };

        if new_value == 0 && !waiters.is_empty() {
            let mut woken = 0usize;
            while let Some(wakeup) = waiters.pop_front() {
                wakeup.wake();
                woken += 1;
            }
            trace!(woken, "counter reached zero");
        }

        Ok(new_value)
    }

    fn apply(&self, current: u32, delta: i32) -> Result<u32, CounterError> {
        if delta > 0 {
            if current == 0 && self.waited.load(Ordering::Acquire) {
                return Err(CounterError::AlreadyWaited { delta });
            }
            current
                .checked_add(delta.unsigned_abs())
                .ok_or(CounterError::Overflow {
                    value: current,
                    delta,
                })
        } else {
            current
                .checked_sub(delta.unsigned_abs())
                .ok_or(CounterError::Underflow {
                    value: current,
                    delta,
                })
        }
    }

    /// Blocks until the counter reaches zero or `deadline` passes. Returns 0 if the counter
    /// reached zero, and the current (nonzero) value otherwise.
    ///
    /// `Deadline::Now` polls without blocking, `Deadline::Never` waits as long as it takes.
    pub fn wait(&self, deadline: Deadline) -> u32 {
        match self.pool.wait_many(deadline, &[self as &dyn Waitable]) {
            Some(_) => 0,
            None => self.value(),
        }
    }

    /// Blocks until the counter reaches zero or `timeout` elapses. Returns the same as
    /// [`wait`](#method.wait).
    pub fn wait_timeout(&self, timeout: Duration) -> u32 {
        self.wait(Deadline::after(timeout))
    }

    /// Adds one to the counter, then returns a guard that subtracts one when dropped.
    ///
    /// # Errors
    ///
    /// Returns the same errors as `try_add(1)`.
    ///
    /// # Panics
    ///
    /// Dropping the guard subtracts one with [`add`](#method.add), so it panics if the counter
    /// was already brought to zero by other means while the guard was held.
    ///
    /// # Example
    ///
    /// Here's the sample from the main docs, using `CounterGuard`s instead of subtracting by hand:
    ///
    /// ```
    /// use waitables::{Counter, Deadline};
    /// use std::sync::Arc;
    /// use std::thread;
    ///
    /// // start at one so the counter can't reach zero before every worker holds its guard, then
    /// // subtract that one when we're ready to wait
    /// let counter = Arc::new(Counter::new(1));
    /// let started = Arc::new(Counter::new(5));
    ///
    /// for i in 0..5 {
    ///     let signal = counter.clone();
    ///     let started = started.clone();
    ///     thread::spawn(move || {
    ///         let _guard = signal.guard().unwrap();
    ///         started.add(-1);
    ///         println!("thread {} activated!", i);
    ///     });
    /// }
    ///
    /// started.wait(Deadline::Never);
    /// counter.add(-1);
    /// counter.wait(Deadline::Never);
    ///
    /// println!("all done!");
    /// ```
    pub fn guard(&self) -> Result<CounterGuard<'_>, CounterError> {
        CounterGuard::new(self)
    }

    #[cfg(test)]
    pub(crate) fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }
}

impl Waitable for Counter {
    fn ready_time(&self, _registration: Option<&Registration>) -> Deadline {
        self.waited.store(true, Ordering::Release);
        if self.value() == 0 {
            Deadline::Now
        } else {
            Deadline::Never
        }
    }

    fn enqueue(&self, registration: &mut Registration) -> bool {
        let mut waiters = self.waiters.lock();
        let pending = self.value() != 0;
        if pending {
            let key = waiters.push_back(registration.wakeup());
            registration.link(self.id, key);
        }
        pending
    }

    fn dequeue(&self, registration: &mut Registration) -> bool {
        let mut waiters = self.waiters.lock();
        if let Some(key) = registration.unlink(self.id) {
            waiters.remove(key);
        }
        self.value() != 0
    }
}

impl Drop for Counter {
    fn drop(&mut self) {
        if thread::panicking() {
            return;
        }

        let waiters = self.waiters.get_mut().len();
        assert!(
            waiters == 0,
            "counter dropped with {} registered waiter(s)",
            waiters
        );
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counter")
            .field("value", &self.value())
            .field("waited", &self.waited.load(Ordering::Relaxed))
            .finish()
    }
}

/// An opaque guard that subtracts one from a borrowed [`Counter`] on drop.
///
/// See [`Counter::guard`] for more information about this struct.
///
/// [`Counter`]: struct.Counter.html
/// [`Counter::guard`]: struct.Counter.html#method.guard
pub struct CounterGuard<'a> {
    counter: &'a Counter,
}

impl<'a> CounterGuard<'a> {
    fn new(counter: &'a Counter) -> Result<CounterGuard<'a>, CounterError> {
        counter.try_add(1)?;
        Ok(CounterGuard { counter })
    }
}

/// Upon drop, this guard subtracts one from its parent `Counter`, panicking on underflow like
/// any other `add`.
impl<'a> Drop for CounterGuard<'a> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.counter.try_add(-1).ok();
        } else {
            self.counter.add(-1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn counter(initial: u32) -> Counter {
        Counter::with_pool(initial, Arc::new(WaiterPool::new()))
    }

    #[test]
    fn add_returns_new_value() {
        let c = counter(3);
        assert_eq!(c.add(2), 5);
        assert_eq!(c.add(-5), 0);
        assert_eq!(c.value(), 0);
    }

    #[test]
    fn zero_delta_reads_without_mutating() {
        let c = counter(4);
        assert_eq!(c.add(0), 4);
        assert_eq!(c.value(), 4);
    }

    #[test]
    fn unwaited_counter_can_rise_from_zero() {
        let c = counter(0);
        assert_eq!(c.add(2), 2);
    }

    #[test]
    fn try_add_rejects_without_mutating() {
        let c = counter(u32::MAX - 1);
        assert_eq!(
            c.try_add(2),
            Err(CounterError::Overflow {
                value: u32::MAX - 1,
                delta: 2
            })
        );
        assert_eq!(c.value(), u32::MAX - 1);

        let c = counter(1);
        assert_eq!(
            c.try_add(-2),
            Err(CounterError::Underflow { value: 1, delta: -2 })
        );
        assert_eq!(c.value(), 1);
    }

    #[test]
    fn extreme_deltas() {
        let c = counter(u32::MAX);
        assert_eq!(c.add(i32::MIN), u32::MAX - (1 << 31));

        let c = counter(0);
        assert_eq!(c.add(i32::MAX), i32::MAX as u32);
    }

    #[test]
    fn probing_marks_the_counter_waited() {
        let c = counter(0);
        assert_eq!(c.wait(Deadline::Now), 0);
        assert_eq!(c.try_add(1), Err(CounterError::AlreadyWaited { delta: 1 }));
    }

    #[test]
    #[should_panic(expected = "counter overflow")]
    fn overflow_is_fatal() {
        counter(u32::MAX).add(1);
    }

    #[test]
    #[should_panic(expected = "counter underflow")]
    fn underflow_is_fatal() {
        counter(0).add(-1);
    }

    #[test]
    #[should_panic(expected = "after a wait on it was observed")]
    fn resurrection_after_wait_is_fatal() {
        let c = counter(1);
        assert_eq!(c.wait(Deadline::Now), 1);
        c.add(-1);
        c.add(1);
    }

    #[test]
    #[should_panic(expected = "registered waiter")]
    fn dropping_with_linked_registration_is_fatal() {
        let pool = WaiterPool::new();
        let waiter = pool.checkout();
        let mut registration = waiter.register();

        let c = counter(1);
        assert!(c.enqueue(&mut registration));
        drop(c);
    }

    #[test]
    fn enqueue_refuses_when_ready() {
        let pool = WaiterPool::new();
        let waiter = pool.checkout();
        let mut registration = waiter.register();

        let c = counter(0);
        assert!(!c.enqueue(&mut registration));
        assert!(!registration.is_enqueued());
        assert!(!c.dequeue(&mut registration));
        assert_eq!(c.waiter_count(), 0);
    }

    #[test]
    fn reaching_zero_wakes_and_unlinks_registrations() {
        let pool = WaiterPool::new();
        let waiter = pool.checkout();
        let mut first = waiter.register();
        let mut second = waiter.register();

        let c = counter(2);
        assert!(c.enqueue(&mut first));
        assert!(c.enqueue(&mut second));
        assert_eq!(c.waiter_count(), 2);

        c.add(-1);
        assert!(first.is_enqueued());
        c.add(-1);
        assert!(!first.is_enqueued());
        assert!(!second.is_enqueued());
        assert_eq!(c.waiter_count(), 0);

        // woken registrations report readiness on dequeue
        assert!(!c.dequeue(&mut first));
        assert!(!c.dequeue(&mut second));
    }

    #[test]
    fn cancelled_registration_is_removed() {
        let pool = WaiterPool::new();
        let waiter = pool.checkout();
        let mut registration = waiter.register();

        let c = counter(1);
        assert!(c.enqueue(&mut registration));
        assert!(c.dequeue(&mut registration));
        assert_eq!(c.waiter_count(), 0);
    }

    #[test]
    fn wait_times_out_with_current_value() {
        let c = counter(3);
        let start = Instant::now();
        assert_eq!(c.wait_timeout(Duration::from_millis(30)), 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(30));
        assert!(elapsed < Duration::from_millis(30) + Duration::from_secs(1));
        assert_eq!(c.waiter_count(), 0);
    }

    #[test]
    fn guard_counts_up_then_down() {
        let c = counter(1);
        {
            let _guard = c.guard().unwrap();
            assert_eq!(c.value(), 2);
        }
        assert_eq!(c.value(), 1);
    }

    #[test]
    #[should_panic(expected = "counter underflow")]
    fn guard_dropped_after_counter_drained_is_fatal() {
        let c = counter(1);
        let guard = c.guard().unwrap();
        assert_eq!(c.add(-2), 0);
        drop(guard);
    }

    #[test]
    fn guard_reports_resurrection() {
        let c = counter(0);
        c.wait(Deadline::Now);
        assert!(matches!(
            c.guard(),
            Err(CounterError::AlreadyWaited { delta: 1 })
        ));
    }
}
