//! Blocking on any one of several unrelated synchronization objects, and a countdown counter
//! built on top of that.
//!
//! This library contains the following pieces:
//!
//! * [`wait_many`], which blocks the calling thread until any one of a list of [`Waitable`]
//!   objects is ready, or until an absolute [`Deadline`] passes. The waitables can be of entirely
//!   different types, and a waitable can become ready either by being signaled or at a point in
//!   time it reports itself.
//! * [`Counter`], a primitive that keeps a count and lets threads wait until it reaches zero. It
//!   works as a countdown latch or as a wait group, and is itself a `Waitable`.
//! * The building blocks for writing new waitables: [`Registration`], [`Wakeup`], [`WaitList`],
//!   and [`WaitableId`].
//!
//! Waiting threads sleep on a semaphore taken from a [`WaiterPool`], so blocking does not
//! allocate a new one each time. A caller that holds a lock while waiting can have it released
//! for the duration of the block with [`wait_many_unlocking`].
//!
//! Misusing a `Counter` (overflowing it, counting below zero, raising it from zero after someone
//! waited on it, or dropping it while a wait is registered) panics. See the [`Counter`] docs for
//! details.
//!
//! The slow paths emit `trace`-level events through the [`tracing`] crate.
//!
//! [`wait_many`]: fn.wait_many.html
//! [`wait_many_unlocking`]: fn.wait_many_unlocking.html
//! [`Waitable`]: trait.Waitable.html
//! [`Deadline`]: enum.Deadline.html
//! [`Counter`]: struct.Counter.html
//! [`Registration`]: struct.Registration.html
//! [`Wakeup`]: struct.Wakeup.html
//! [`WaitList`]: struct.WaitList.html
//! [`WaitableId`]: struct.WaitableId.html
//! [`WaiterPool`]: struct.WaiterPool.html
//! [`tracing`]: https://docs.rs/tracing

#![deny(missing_docs)]

mod config;
mod counter;
mod list;
mod sema;
mod time;
mod util;
mod wait;
mod waitable;
mod waiter;

pub use config::{PoolConfig, DEFAULT_POOL_CAPACITY};
pub use counter::{Counter, CounterError, CounterGuard};
pub use list::{Iter, ListKey, WaitList};
pub use time::Deadline;
pub use wait::{wait_many, wait_many_unlocking, Handoff, MutexSlot, Relock};
pub use waitable::{Registration, WaitableId, Waitable, Wakeup};
pub use waiter::{PooledWaiter, WaiterPool};
