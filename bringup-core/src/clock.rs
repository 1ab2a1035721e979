//! Monotonic time abstractions shared by the firmware and host targets.
//!
//! Bring-up only ever suspends inside deadline-bounded waits. Those waits are
//! expressed against the [`Clock`] trait so the emulator and tests can advance
//! a virtual clock instead of sleeping for real.

use core::future::Future;
use core::ops::Add;
use core::time::Duration;

/// Smallest sleep issued by [`poll_until`], so a zero interval still makes progress.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Monotonic timestamp used to compute deadlines.
pub trait MonotonicInstant: Copy + Ord + Add<Duration, Output = Self> {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Source of monotonic time plus the ability to suspend the caller.
pub trait Clock {
    /// Timestamp type produced by [`Clock::now`].
    type Instant: MonotonicInstant;

    /// Returns the current monotonic timestamp.
    fn now(&self) -> Self::Instant;

    /// Suspends the calling sequence for `duration`.
    fn sleep(&mut self, duration: Duration) -> impl Future<Output = ()>;
}

/// Result of a deadline-bounded poll loop.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PollOutcome {
    Ready { polls: u32, elapsed: Duration },
    TimedOut { polls: u32, elapsed: Duration },
}

impl PollOutcome {
    /// Returns `true` when the condition was observed before the deadline.
    pub const fn is_ready(self) -> bool {
        matches!(self, PollOutcome::Ready { .. })
    }

    /// Number of times the condition was evaluated.
    pub const fn polls(self) -> u32 {
        match self {
            PollOutcome::Ready { polls, .. } | PollOutcome::TimedOut { polls, .. } => polls,
        }
    }

    /// Time spent inside the loop.
    pub const fn elapsed(self) -> Duration {
        match self {
            PollOutcome::Ready { elapsed, .. } | PollOutcome::TimedOut { elapsed, .. } => elapsed,
        }
    }
}

/// Polls `ready` until it reports `true` or `timeout` elapses.
///
/// The condition is evaluated once immediately and then after every
/// `interval`. The last sleep is clipped to the deadline, so the loop never
/// waits past `timeout`.
pub async fn poll_until<C, F>(
    clock: &mut C,
    timeout: Duration,
    interval: Duration,
    mut ready: F,
) -> PollOutcome
where
    C: Clock,
    F: FnMut() -> bool,
{
    let started = clock.now();
    let deadline = started + timeout;
    let mut polls: u32 = 0;

    loop {
        polls = polls.saturating_add(1);
        if ready() {
            let elapsed = clock.now().saturating_duration_since(started);
            return PollOutcome::Ready { polls, elapsed };
        }

        let now = clock.now();
        if now >= deadline {
            let elapsed = now.saturating_duration_since(started);
            return PollOutcome::TimedOut { polls, elapsed };
        }

        let remaining = deadline.saturating_duration_since(now);
        let step = interval.max(MIN_POLL_INTERVAL).min(remaining);
        clock.sleep(step).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockClock;
    use embassy_futures::block_on;

    #[test]
    fn ready_on_first_poll_does_not_sleep() {
        let mut clock = MockClock::new();
        let outcome = block_on(poll_until(
            &mut clock,
            Duration::from_secs(60),
            Duration::from_millis(500),
            || true,
        ));

        assert_eq!(
            outcome,
            PollOutcome::Ready {
                polls: 1,
                elapsed: Duration::ZERO
            }
        );
        assert_eq!(clock.sleeps(), 0);
    }

    #[test]
    fn times_out_exactly_at_deadline() {
        let mut clock = MockClock::new();
        let outcome = block_on(poll_until(
            &mut clock,
            Duration::from_secs(10),
            Duration::from_millis(500),
            || false,
        ));

        assert!(!outcome.is_ready());
        assert_eq!(outcome.elapsed(), Duration::from_secs(10));
        assert_eq!(outcome.polls(), 21);
    }

    #[test]
    fn last_sleep_is_clipped_to_deadline() {
        let mut clock = MockClock::new();
        let outcome = block_on(poll_until(
            &mut clock,
            Duration::from_millis(1_200),
            Duration::from_millis(500),
            || false,
        ));

        assert_eq!(outcome.elapsed(), Duration::from_millis(1_200));
        assert_eq!(clock.sleeps(), 3);
    }

    #[test]
    fn becomes_ready_after_several_polls() {
        let mut clock = MockClock::new();
        let mut remaining = 3;
        let outcome = block_on(poll_until(
            &mut clock,
            Duration::from_secs(60),
            Duration::from_millis(500),
            || {
                remaining -= 1;
                remaining == 0
            },
        ));

        assert_eq!(
            outcome,
            PollOutcome::Ready {
                polls: 3,
                elapsed: Duration::from_millis(1_000)
            }
        );
    }

    #[test]
    fn zero_interval_still_advances() {
        let mut clock = MockClock::new();
        let outcome = block_on(poll_until(
            &mut clock,
            Duration::from_millis(3),
            Duration::ZERO,
            || false,
        ));

        assert_eq!(outcome.elapsed(), Duration::from_millis(3));
    }
}
