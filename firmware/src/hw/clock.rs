use core::ops::Add;
use core::time::Duration;

use bringup_core::clock::{Clock, MonotonicInstant};
use embassy_time::{Instant, Timer};

/// Converts a core duration into an embassy tick duration, saturating.
pub fn ticks(duration: Duration) -> embassy_time::Duration {
    embassy_time::Duration::from_micros(u64::try_from(duration.as_micros()).unwrap_or(u64::MAX))
}

/// Timestamp on the embassy time driver.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct BoardInstant(Instant);

impl Add<Duration> for BoardInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0 + ticks(rhs))
    }
}

impl MonotonicInstant for BoardInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_duration_since(earlier.0).as_micros())
    }
}

pub struct EmbassyClock;

impl Clock for EmbassyClock {
    type Instant = BoardInstant;

    fn now(&self) -> BoardInstant {
        BoardInstant(Instant::now())
    }

    async fn sleep(&mut self, duration: Duration) {
        Timer::after(ticks(duration)).await;
    }
}
