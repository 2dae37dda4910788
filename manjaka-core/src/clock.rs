//! Wall-clock abstraction.
//!
//! Cache entries are stamped and aged through a [`Clock`] so that TTL
//! behaviour can be driven deterministically in tests. Production code uses
//! [`SystemClock`]; tests use [`ManualClock`] (behind the `test-helpers`
//! feature).

use std::fmt;

use chrono::{DateTime, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current instant as a UTC timestamp.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the operating system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(any(test, feature = "test-helpers"))]
pub use manual::ManualClock;

#[cfg(any(test, feature = "test-helpers"))]
mod manual {
    use std::sync::Mutex;
    use std::time::Duration;

    use chrono::{DateTime, TimeDelta, Utc};

    use super::Clock;

    /// Clock that only moves when told to.
    ///
    /// ```
    /// use manjaka_core::{Clock, ManualClock};
    /// use std::time::Duration;
    ///
    /// let clock = ManualClock::new();
    /// let start = clock.now();
    /// clock.advance(Duration::from_millis(4000));
    /// assert_eq!((clock.now() - start).num_milliseconds(), 4000);
    /// ```
    #[derive(Debug)]
    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Creates a clock frozen at the current system time.
        pub fn new() -> Self {
            Self::starting_at(Utc::now())
        }

        /// Creates a clock frozen at `start`.
        pub fn starting_at(start: DateTime<Utc>) -> Self {
            Self {
                now: Mutex::new(start),
            }
        }

        /// Moves the clock forward by `step`.
        pub fn advance(&self, step: Duration) {
            let delta = TimeDelta::from_std(step).unwrap_or(TimeDelta::MAX);
            let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
            *now += delta;
        }

        /// Sets the clock to an absolute time.
        pub fn set(&self, at: DateTime<Utc>) {
            *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
        }
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap_or_else(|e| e.into_inner())
        }
    }
}
