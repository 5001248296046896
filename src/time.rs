//! Absolute deadlines, with sentinels for "already due" and "never".
//!
//! See the documentation on [`Deadline`] for more information.
//!
//! [`Deadline`]: enum.Deadline.html

use std::time::{Duration, Instant};

/// An absolute point in time after which a blocking operation gives up.
///
/// Besides a concrete [`Instant`], a `Deadline` has two sentinel values:
///
/// * `Deadline::Now` is the minimal deadline. As a deadline passed to a wait it means "poll, do
///   not block". As a ready time reported by a [`Waitable`] it means "ready right now".
/// * `Deadline::Never` is the maximal deadline. As a deadline it means "wait forever". As a ready
///   time it means "not ready, and only an explicit wake will change that".
///
/// The derived ordering puts `Now` before every `At(_)`, and every `At(_)` before `Never`, so the
/// earliest of several deadlines is simply their `min`.
///
/// [`Instant`]: https://doc.rust-lang.org/std/time/struct.Instant.html
/// [`Waitable`]: trait.Waitable.html
///
/// # Example
///
/// ```
/// use waitables::Deadline;
/// use std::time::Duration;
///
/// let soon = Deadline::after(Duration::from_millis(10));
///
/// assert!(Deadline::Now < soon);
/// assert!(soon < Deadline::Never);
/// assert_eq!(soon.min(Deadline::Never), soon);
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Deadline {
    /// The minimal deadline: already due.
    Now,
    /// A concrete instant on the monotonic clock.
    At(Instant),
    /// The maximal deadline: never due.
    Never,
}

impl Deadline {
    /// Returns a deadline `timeout` from now.
    ///
    /// If adding `timeout` to the current instant would overflow the clock, the result is
    /// `Deadline::Never`.
    pub fn after(timeout: Duration) -> Deadline {
        Instant::now()
            .checked_add(timeout)
            .map_or(Deadline::Never, Deadline::At)
    }

    /// Returns whether this is the `Now` sentinel.
    ///
    /// This only looks at the sentinel. A concrete instant in the past is *not* `Now`; use
    /// [`has_passed`](#method.has_passed) to compare against the clock.
    pub fn is_now(&self) -> bool {
        *self == Deadline::Now
    }

    /// Returns whether the deadline is due according to the monotonic clock.
    pub fn has_passed(&self) -> bool {
        match *self {
            Deadline::Now => true,
            Deadline::At(instant) => instant <= Instant::now(),
            Deadline::Never => false,
        }
    }

    /// Returns the concrete instant, if there is one.
    pub fn instant(&self) -> Option<Instant> {
        match *self {
            Deadline::At(instant) => Some(instant),
            _ => None,
        }
    }
}

impl From<Instant> for Deadline {
    fn from(instant: Instant) -> Deadline {
        Deadline::At(instant)
    }
}

impl From<Option<Instant>> for Deadline {
    /// `None` maps to `Deadline::Never`.
    fn from(instant: Option<Instant>) -> Deadline {
        instant.map_or(Deadline::Never, Deadline::At)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_bracket_every_instant() {
        let past = Instant::now();
        let future = past + Duration::from_secs(3600);

        assert!(Deadline::Now < Deadline::At(past));
        assert!(Deadline::At(past) < Deadline::At(future));
        assert!(Deadline::At(future) < Deadline::Never);
        assert_eq!(
            [Deadline::Never, Deadline::At(future), Deadline::At(past)]
                .iter()
                .copied()
                .min(),
            Some(Deadline::At(past))
        );
    }

    #[test]
    fn has_passed_follows_the_clock() {
        assert!(Deadline::Now.has_passed());
        assert!(!Deadline::Never.has_passed());
        assert!(Deadline::At(Instant::now()).has_passed());
        assert!(!Deadline::after(Duration::from_secs(3600)).has_passed());
    }

    #[test]
    fn elapsed_instant_is_not_the_now_sentinel() {
        let elapsed = Deadline::At(Instant::now());
        assert!(elapsed.has_passed());
        assert!(!elapsed.is_now());
    }

    #[test]
    fn huge_timeout_saturates_to_never() {
        assert_eq!(Deadline::after(Duration::MAX), Deadline::Never);
        assert_eq!(Deadline::from(None), Deadline::Never);
    }
}
