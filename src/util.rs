//! Small helpers that don't need to be part of the public API.

use std::sync::LockResult;

// Take the guard out of a LockResult whether or not the lock was poisoned.
//
// A caller's mutex handed to `wait_many_unlocking` may have been poisoned by some unrelated panic
// while we were blocked. Re-acquiring it is part of our contract either way, and whether the
// protected data is still consistent is the caller's call, not ours.
pub fn guts<T>(res: LockResult<T>) -> T {
    match res {
        Ok(guard) => guard,
        Err(poison) => poison.into_inner(),
    }
}
