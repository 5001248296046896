//! A counting semaphore whose acquire takes an absolute deadline.

use parking_lot::{Condvar, Mutex};

use crate::time::Deadline;

pub(crate) struct Semaphore {
    permits: Mutex<u32>,
    cond: Condvar,
}

impl Semaphore {
    pub(crate) fn new() -> Semaphore {
        Semaphore {
            permits: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    /// Adds a permit, waking one blocked acquirer if there is one.
    pub(crate) fn release(&self) {
        let mut permits = self.permits.lock();
        *permits = permits.saturating_add(1);
        self.cond.notify_one();
    }

    /// Takes a permit, blocking until one is available or `deadline` passes. Returns whether a
    /// permit was taken.
    ///
    /// A permit that is already available is always taken, even if the deadline has passed.
    pub(crate) fn acquire_until(&self, deadline: Deadline) -> bool {
        let mut permits = self.permits.lock();

        loop {
            if *permits > 0 {
                *permits -= 1;
                return true;
            }

            match deadline {
                Deadline::Now => return false,
                Deadline::Never => self.cond.wait(&mut permits),
                Deadline::At(instant) => {
                    if self.cond.wait_until(&mut permits, instant).timed_out() {
                        // a release may have raced with the timeout
                        if *permits > 0 {
                            *permits -= 1;
                            return true;
                        }
                        return false;
                    }
                }
            }
        }
    }

    /// Discards any leftover permits.
    pub(crate) fn drain(&self) {
        *self.permits.lock() = 0;
    }

    #[cfg(test)]
    pub(crate) fn available(&self) -> u32 {
        *self.permits.lock()
    }
}
