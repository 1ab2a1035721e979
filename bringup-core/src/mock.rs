//! Test doubles shared by the unit tests in this crate.

use core::ops::Add;
use core::time::Duration;

use crate::clock::{Clock, MonotonicInstant};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MockInstant(u64);

impl MockInstant {
    pub const fn micros(value: u64) -> Self {
        Self(value)
    }
}

impl Add<Duration> for MockInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0 + u64::try_from(rhs.as_micros()).unwrap())
    }
}

impl MonotonicInstant for MockInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

/// Virtual clock that advances only when slept on.
pub struct MockClock {
    now: MockInstant,
    sleeps: usize,
}

impl MockClock {
    pub const fn new() -> Self {
        Self {
            now: MockInstant::micros(0),
            sleeps: 0,
        }
    }

    pub fn sleeps(&self) -> usize {
        self.sleeps
    }

    pub fn elapsed(&self) -> Duration {
        self.now.saturating_duration_since(MockInstant::micros(0))
    }
}

impl Clock for MockClock {
    type Instant = MockInstant;

    fn now(&self) -> Self::Instant {
        self.now
    }

    async fn sleep(&mut self, duration: Duration) {
        self.now = self.now + duration;
        self.sleeps += 1;
    }
}
