//! The contract an object implements to take part in a multi-object wait.
//!
//! The primary types in this module are the [`Waitable`] trait and the [`Registration`] record
//! that the wait engine hands to each waitable. See the documentation on those types for further
//! information.
//!
//! [`Waitable`]: trait.Waitable.html
//! [`Registration`]: struct.Registration.html

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::list::ListKey;
use crate::time::Deadline;
use crate::waiter::Waiter;

/// An object a thread can block on, alone or together with other waitables of unrelated types.
///
/// [`wait_many`] drives the three operations in a fixed protocol:
///
/// 1. `ready_time(None)` is called on every waitable as a non-blocking probe. A result of
///    `Deadline::Now` ends the wait right there.
/// 2. If the caller is willing to block, `enqueue` is called on each waitable in order. Each call
///    gets its own [`Registration`], but all registrations of one wait share the same blocked
///    thread.
/// 3. While blocked, the engine repeatedly calls `ready_time(Some(registration))` and sleeps until
///    the earliest of the returned instants (or the caller's deadline), or until some waitable
///    wakes the registration through its [`Wakeup`] handle.
/// 4. `dequeue` is called on every waitable whose `enqueue` was attempted, after which no
///    registration may remain linked anywhere.
///
/// Implementations hold their own lock around `enqueue`, `dequeue`, and whatever mutation makes
/// them ready, so that a registration is either linked before the mutation (and gets woken by
/// it) or sees the mutation's result when it re-checks readiness in `enqueue`.
///
/// A waitable whose readiness depends only on time can return `Deadline::At(instant)` from
/// `ready_time` and never wake anything; the engine wakes itself at that instant.
///
/// [`wait_many`]: fn.wait_many.html
/// [`Registration`]: struct.Registration.html
/// [`Wakeup`]: struct.Wakeup.html
pub trait Waitable {
    /// Returns when this object is (or will be) ready.
    ///
    /// * `Deadline::Now`: ready now.
    /// * `Deadline::Never`: not ready, and only an explicit wake will change that.
    /// * `Deadline::At(instant)`: ready at `instant` unless woken sooner.
    ///
    /// `registration` is `None` for the initial probe and the live registration afterwards.
    /// Implementations may record that a wait took place.
    fn ready_time(&self, registration: Option<&Registration>) -> Deadline;

    /// Re-checks readiness and, if still not ready, links `registration` into this object's
    /// waiters. Returns `true` if the registration was linked (the object is not ready yet) and
    /// `false` if the object is already ready.
    fn enqueue(&self, registration: &mut Registration) -> bool;

    /// Unlinks `registration` if it is still linked. Returns `true` if the object is still not
    /// ready, meaning the wait on it was abandoned, and `false` if it became ready.
    fn dequeue(&self, registration: &mut Registration) -> bool;
}

/// Identity of a waitable object, recorded in the registrations it links.
///
/// Dequeuing a registration from a waitable other than the one it was linked into is a
/// programming error and panics.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct WaitableId(u64);

impl WaitableId {
    /// Returns a fresh identity, distinct from every other one handed out in this process.
    pub fn next() -> WaitableId {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        WaitableId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

struct Slot {
    waiter: Arc<Waiter>,
    enqueued: AtomicBool,
}

/// Per-call bookkeeping linking one waitable to the thread blocked on it.
///
/// The engine creates one `Registration` per waitable for each blocking wait and drops it before
/// the wait returns. A waitable that decides to block stores a [`Wakeup`] for the registration in
/// its waiter list, keyed by a [`ListKey`], and records that key with [`link`]. When it becomes
/// ready it wakes the stored handle; when the engine gives up it calls `dequeue`, which uses
/// [`unlink`] to find out whether the entry is still there to remove.
///
/// [`Wakeup`]: struct.Wakeup.html
/// [`ListKey`]: struct.ListKey.html
/// [`link`]: #method.link
/// [`unlink`]: #method.unlink
pub struct Registration {
    slot: Arc<Slot>,
    link: Option<(WaitableId, ListKey)>,
}

impl Registration {
    pub(crate) fn new(waiter: Arc<Waiter>) -> Registration {
        Registration {
            slot: Arc::new(Slot {
                waiter,
                enqueued: AtomicBool::new(false),
            }),
            link: None,
        }
    }

    /// Returns a handle that wakes the thread blocked on this registration.
    pub fn wakeup(&self) -> Wakeup {
        Wakeup {
            slot: self.slot.clone(),
        }
    }

    /// Records that this registration was linked into `owner`'s waiter list under `key`, and
    /// marks it enqueued.
    ///
    /// # Panics
    ///
    /// Panics if the registration is already linked.
    pub fn link(&mut self, owner: WaitableId, key: ListKey) {
        assert!(self.link.is_none(), "registration is already enqueued");
        self.link = Some((owner, key));
        self.slot.enqueued.store(true, Ordering::Release);
    }

    /// Forgets the link recorded by `link`. Returns the key if the registration is still
    /// enqueued (so the caller must remove it from its list), or `None` if it was never linked or
    /// was already woken.
    ///
    /// # Panics
    ///
    /// Panics if the registration was linked by a different waitable.
    pub fn unlink(&mut self, owner: WaitableId) -> Option<ListKey> {
        let (linked_by, key) = self.link.take()?;
        assert_eq!(
            linked_by, owner,
            "registration dequeued from a waitable it was not enqueued on"
        );

        if self.slot.enqueued.swap(false, Ordering::AcqRel) {
            Some(key)
        } else {
            None
        }
    }

    /// Returns whether the registration is linked and has not been woken.
    pub fn is_enqueued(&self) -> bool {
        self.slot.enqueued.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("enqueued", &self.is_enqueued())
            .field("link", &self.link)
            .finish()
    }
}

/// A handle a waitable keeps in its waiter list to wake a blocked registration.
#[derive(Clone)]
pub struct Wakeup {
    slot: Arc<Slot>,
}

impl Wakeup {
    /// Marks the registration as no longer enqueued and wakes the thread blocked on it.
    ///
    /// The waitable must call this while holding the lock that also guards its `dequeue`, after
    /// removing the handle from its waiter list.
    pub fn wake(&self) {
        self.slot.enqueued.store(false, Ordering::Release);
        self.slot.waiter.sem.release();
    }
}

impl fmt::Debug for Wakeup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wakeup")
            .field("enqueued", &self.slot.enqueued.load(Ordering::Relaxed))
            .finish()
    }
}
