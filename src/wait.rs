//! Blocking until any one of several waitables is ready.
//!
//! The primary items in this module are the [`wait_many`] and [`wait_many_unlocking`] functions
//! and the [`Relock`] trait. See the documentation on those items for further information.
//!
//! [`wait_many`]: fn.wait_many.html
//! [`wait_many_unlocking`]: fn.wait_many_unlocking.html
//! [`Relock`]: trait.Relock.html

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard};

use smallvec::SmallVec;
use tracing::trace;

use crate::time::Deadline;
use crate::util;
use crate::waitable::{Registration, Waitable};
use crate::waiter::WaiterPool;

/// A lock the caller holds across a wait, released while the thread blocks and re-acquired
/// before the wait returns.
///
/// `wait_many_unlocking` calls `unlock` right before blocking and `lock` right before returning,
/// including when it returns by unwinding. If the wait never blocks, neither is called.
pub trait Relock {
    /// Releases the lock.
    fn unlock(&mut self);
    /// Re-acquires the lock.
    fn lock(&mut self);
}

/// A held `std::sync::Mutex` that can be handed off to [`wait_many_unlocking`].
///
/// `MutexSlot` dereferences to the protected value. Poisoning is ignored: if another thread
/// panicked while holding the mutex, the slot still takes the lock.
///
/// [`wait_many_unlocking`]: fn.wait_many_unlocking.html
///
/// # Example
///
/// ```
/// use waitables::{wait_many_unlocking, Counter, Deadline, MutexSlot, Waitable};
/// use std::sync::Mutex;
///
/// let state = Mutex::new(Vec::<u32>::new());
/// let counter = Counter::new(0);
///
/// let mut slot = MutexSlot::new(&state);
/// slot.push(1);
/// let ready = wait_many_unlocking(&mut slot, Deadline::Never, &[&counter as &dyn Waitable]);
/// slot.push(2);
///
/// assert_eq!(ready, Some(0));
/// assert_eq!(*slot, [1, 2]);
/// ```
pub struct MutexSlot<'a, T> {
    mutex: &'a Mutex<T>,
    guard: Option<MutexGuard<'a, T>>,
}

impl<'a, T> MutexSlot<'a, T> {
    /// Locks `mutex` and wraps the guard.
    pub fn new(mutex: &'a Mutex<T>) -> MutexSlot<'a, T> {
        MutexSlot {
            mutex,
            guard: Some(util::guts(mutex.lock())),
        }
    }

    /// Unwraps the guard.
    pub fn into_guard(mut self) -> MutexGuard<'a, T> {
        match self.guard.take() {
            Some(guard) => guard,
            None => util::guts(self.mutex.lock()),
        }
    }
}

impl<'a, T> Relock for MutexSlot<'a, T> {
    fn unlock(&mut self) {
        self.guard = None;
    }

    fn lock(&mut self) {
        if self.guard.is_none() {
            self.guard = Some(util::guts(self.mutex.lock()));
        }
    }
}

impl<'a, T> Deref for MutexSlot<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.guard {
            Some(ref guard) => guard,
            None => unreachable!("mutex slot read while handed off"),
        }
    }
}

impl<'a, T> DerefMut for MutexSlot<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        match self.guard {
            Some(ref mut guard) => guard,
            None => unreachable!("mutex slot written while handed off"),
        }
    }
}

/// A [`Relock`] made of two closures, for locks that are not `std` mutexes.
///
/// [`Relock`]: trait.Relock.html
///
/// # Example
///
/// ```
/// use waitables::{wait_many_unlocking, Deadline, Handoff};
/// use std::cell::Cell;
///
/// let released = Cell::new(0);
/// let mut handoff = Handoff::new(|| released.set(released.get() + 1), || {});
///
/// // nothing to wait on, so this just sleeps until the deadline with the lock released
/// let deadline = Deadline::after(std::time::Duration::from_millis(1));
/// assert_eq!(wait_many_unlocking(&mut handoff, deadline, &[]), None);
/// assert_eq!(released.get(), 1);
/// ```
pub struct Handoff<U, L> {
    unlock: U,
    lock: L,
}

impl<U: FnMut(), L: FnMut()> Handoff<U, L> {
    /// Wraps an unlock closure and a lock closure.
    pub fn new(unlock: U, lock: L) -> Handoff<U, L> {
        Handoff { unlock, lock }
    }
}

impl<U: FnMut(), L: FnMut()> Relock for Handoff<U, L> {
    fn unlock(&mut self) {
        (self.unlock)();
    }

    fn lock(&mut self) {
        (self.lock)();
    }
}

/// Keeps a handed-off lock released, and re-acquires it on drop.
struct Unlocked<'a> {
    lock: &'a mut dyn Relock,
}

impl<'a> Unlocked<'a> {
    fn new(lock: &'a mut dyn Relock) -> Unlocked<'a> {
        lock.unlock();
        Unlocked { lock }
    }
}

impl<'a> Drop for Unlocked<'a> {
    fn drop(&mut self) {
        self.lock.lock();
    }
}

/// Blocks until one of `waitables` is ready or `deadline` passes, using the global waiter pool.
///
/// Returns the index of the first ready waitable, in slice order, or `None` if the deadline
/// passed first.
///
/// * With `Deadline::Now` this is a non-blocking poll.
/// * With `Deadline::Never` it waits until something is ready.
/// * With an empty slice it sleeps until the deadline and returns `None`.
///
/// If one of the waitables is already ready, no registration is made and nothing blocks.
/// Otherwise every waitable is registered with, in order, and when the wait ends every
/// registration has been removed again.
///
/// # Example
///
/// ```
/// use waitables::{wait_many, Counter, Deadline, Waitable};
/// use std::sync::Arc;
/// use std::thread;
/// use std::time::Duration;
///
/// let first = Arc::new(Counter::new(1));
/// let second = Arc::new(Counter::new(1));
///
/// let signal = second.clone();
/// thread::spawn(move || {
///     thread::sleep(Duration::from_millis(50));
///     signal.add(-1);
/// });
///
/// let ready = wait_many(Deadline::Never, &[&*first as &dyn Waitable, &*second]);
/// assert_eq!(ready, Some(1));
/// assert_eq!(first.value(), 1);
/// ```
pub fn wait_many(deadline: Deadline, waitables: &[&dyn Waitable]) -> Option<usize> {
    WaiterPool::global().wait_many(deadline, waitables)
}

/// Like [`wait_many`], but releases `lock` while blocked.
///
/// The lock is released only once the thread is about to block, and is always held again when
/// this function returns.
///
/// [`wait_many`]: fn.wait_many.html
pub fn wait_many_unlocking(
    lock: &mut dyn Relock,
    deadline: Deadline,
    waitables: &[&dyn Waitable],
) -> Option<usize> {
    WaiterPool::global().wait_many_unlocking(lock, deadline, waitables)
}

impl WaiterPool {
    /// [`wait_many`] with waiters taken from this pool.
    ///
    /// [`wait_many`]: fn.wait_many.html
    pub fn wait_many(&self, deadline: Deadline, waitables: &[&dyn Waitable]) -> Option<usize> {
        self.wait_inner(None, deadline, waitables)
    }

    /// [`wait_many_unlocking`] with waiters taken from this pool.
    ///
    /// [`wait_many_unlocking`]: fn.wait_many_unlocking.html
    pub fn wait_many_unlocking(
        &self,
        lock: &mut dyn Relock,
        deadline: Deadline,
        waitables: &[&dyn Waitable],
    ) -> Option<usize> {
        self.wait_inner(Some(lock), deadline, waitables)
    }

    fn wait_inner(
        &self,
        lock: Option<&mut dyn Relock>,
        deadline: Deadline,
        waitables: &[&dyn Waitable],
    ) -> Option<usize> {
        if let Some(ready) = waitables.iter().position(|w| w.ready_time(None).is_now()) {
            return Some(ready);
        }

        if deadline.is_now() {
            return None;
        }

        let waiter = self.checkout();
        let mut registrations: SmallVec<[Registration; 4]> =
            SmallVec::with_capacity(waitables.len());

        // stop at the first waitable that turns out to be ready already
        let mut all_enqueued = true;
        for waitable in waitables {
            let mut registration = waiter.register();
            let pending = waitable.enqueue(&mut registration);
            registrations.push(registration);
            if !pending {
                all_enqueued = false;
                break;
            }
        }

        let mut unlocked = None;
        if all_enqueued {
            unlocked = lock.map(Unlocked::new);
            trace!(waitables = waitables.len(), ?deadline, "blocking");

            loop {
                let earliest = waitables
                    .iter()
                    .zip(&registrations)
                    .map(|(w, r)| w.ready_time(Some(r)))
                    .fold(deadline, Deadline::min);

                if earliest.is_now() || !waiter.waiter().sem.acquire_until(earliest) {
                    break;
                }
            }
        }

        let mut ready = None;
        for (index, (waitable, registration)) in
            waitables.iter().zip(registrations.iter_mut()).enumerate()
        {
            let still_pending = waitable.dequeue(registration);
            if !still_pending && ready.is_none() {
                ready = Some(index);
            }
        }

        if all_enqueued {
            trace!(?ready, "wait resolved");
        }

        drop(registrations);
        drop(waiter);
        drop(unlocked);

        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use crate::counter::Counter;

    /// Counts how the engine drives it; ready from the start or never.
    struct Scripted {
        ready: bool,
        enqueues: Cell<usize>,
        dequeues: Cell<usize>,
    }

    impl Scripted {
        fn new(ready: bool) -> Scripted {
            Scripted {
                ready,
                enqueues: Cell::new(0),
                dequeues: Cell::new(0),
            }
        }
    }

    impl Waitable for Scripted {
        fn ready_time(&self, _: Option<&Registration>) -> Deadline {
            if self.ready {
                Deadline::Now
            } else {
                Deadline::Never
            }
        }

        fn enqueue(&self, _: &mut Registration) -> bool {
            self.enqueues.set(self.enqueues.get() + 1);
            !self.ready
        }

        fn dequeue(&self, _: &mut Registration) -> bool {
            self.dequeues.set(self.dequeues.get() + 1);
            !self.ready
        }
    }

    #[test]
    fn ready_waitable_short_circuits_fast_path() {
        let pool = WaiterPool::new();
        let (a, b, c) = (Scripted::new(false), Scripted::new(true), Scripted::new(false));

        let ready = pool.wait_many(Deadline::Never, &[&a, &b, &c]);

        assert_eq!(ready, Some(1));
        assert_eq!(a.enqueues.get() + b.enqueues.get() + c.enqueues.get(), 0);
        // the fast path never touches the pool
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn poll_returns_none_without_registering() {
        let pool = WaiterPool::new();
        let scripted = Scripted::new(false);

        assert_eq!(pool.wait_many(Deadline::Now, &[&scripted]), None);
        assert_eq!(scripted.enqueues.get(), 0);
    }

    #[test]
    fn timeout_dequeues_every_enqueued_waitable() {
        let pool = WaiterPool::new();
        let (a, b) = (Scripted::new(false), Scripted::new(false));
        let deadline = Deadline::after(Duration::from_millis(20));

        assert_eq!(pool.wait_many(deadline, &[&a, &b]), None);
        assert_eq!((a.enqueues.get(), a.dequeues.get()), (1, 1));
        assert_eq!((b.enqueues.get(), b.dequeues.get()), (1, 1));
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn signaled_counter_wins_and_the_rest_are_unlinked() {
        let pool = Arc::new(WaiterPool::new());
        let counters: Vec<_> = (0..4)
            .map(|_| Arc::new(Counter::with_pool(1, pool.clone())))
            .collect();

        let signaler = {
            let counter = counters[2].clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                counter.add(-1)
            })
        };

        let waitables: Vec<&dyn Waitable> =
            counters.iter().map(|c| &**c as &dyn Waitable).collect();
        let ready = pool.wait_many(Deadline::after(Duration::from_secs(10)), &waitables);

        assert_eq!(ready, Some(2));
        assert_eq!(signaler.join().unwrap(), 0);
        for (i, counter) in counters.iter().enumerate() {
            assert_eq!(counter.waiter_count(), 0, "counter {} still has a waiter", i);
            assert_eq!(counter.value(), if i == 2 { 0 } else { 1 });
        }
    }

    #[test]
    fn empty_slice_sleeps_until_deadline() {
        let start = Instant::now();
        let ready = WaiterPool::new().wait_many(Deadline::after(Duration::from_millis(30)), &[]);

        assert_eq!(ready, None);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn lock_is_released_only_while_blocked() {
        let events = std::cell::RefCell::new(Vec::new());
        let mut handoff = Handoff::new(
            || events.borrow_mut().push("unlock"),
            || events.borrow_mut().push("lock"),
        );
        let pool = WaiterPool::new();

        let ready = Counter::new(0);
        assert_eq!(
            pool.wait_many_unlocking(&mut handoff, Deadline::Never, &[&ready]),
            Some(0)
        );
        assert!(events.borrow().is_empty());

        let pending = Counter::new(1);
        let deadline = Deadline::after(Duration::from_millis(10));
        assert_eq!(
            pool.wait_many_unlocking(&mut handoff, deadline, &[&pending]),
            None
        );
        assert_eq!(*events.borrow(), ["unlock", "lock"]);
    }

    #[test]
    fn mutex_slot_relocks_after_wait() {
        let mutex = Mutex::new(5);
        let mut slot = MutexSlot::new(&mutex);
        let pending = Counter::new(1);

        let deadline = Deadline::after(Duration::from_millis(10));
        assert_eq!(wait_many_unlocking(&mut slot, deadline, &[&pending]), None);

        *slot += 1;
        assert!(mutex.try_lock().is_err());
        drop(slot);
        assert_eq!(*mutex.lock().unwrap(), 6);
    }
}
