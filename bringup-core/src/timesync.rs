//! Best-effort wall-clock synchronization.
//!
//! A sync request is issued once; afterwards the local wall clock is polled for
//! plausibility a bounded number of times. Nothing here is ever fatal: an
//! unsynchronized clock only means image timestamps are wrong.

use core::fmt;
use core::time::Duration;

use crate::clock::Clock;

/// Default time service queried by the firmware.
pub const DEFAULT_TIME_SERVER: &str = "pool.ntp.org";

/// Default number of plausibility checks.
pub const DEFAULT_MAX_POLLS: u32 = 10;

/// Default delay between plausibility checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Earliest year accepted as a synchronized clock.
pub const DEFAULT_FLOOR_YEAR: i32 = 2016;

/// Wall-clock source that can be asked to synchronize in the background.
pub trait TimeSource {
    /// Starts a background synchronization against `server`.
    fn request_sync(&mut self, server: &str);

    /// Current civil year according to the local wall clock, if it is set at all.
    fn current_year(&self) -> Option<i32>;
}

/// Tunables for [`synchronize`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TimeSyncPlan {
    pub server: &'static str,
    pub max_polls: u32,
    pub poll_interval: Duration,
    pub floor_year: i32,
}

impl TimeSyncPlan {
    pub const fn new(
        server: &'static str,
        max_polls: u32,
        poll_interval: Duration,
        floor_year: i32,
    ) -> Self {
        Self {
            server,
            max_polls,
            poll_interval,
            floor_year,
        }
    }
}

impl Default for TimeSyncPlan {
    fn default() -> Self {
        Self::new(
            DEFAULT_TIME_SERVER,
            DEFAULT_MAX_POLLS,
            DEFAULT_POLL_INTERVAL,
            DEFAULT_FLOOR_YEAR,
        )
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TimeSyncOutcome {
    Synced,
    TimedOut,
}

impl fmt::Display for TimeSyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSyncOutcome::Synced => f.write_str("synced"),
            TimeSyncOutcome::TimedOut => f.write_str("timed out"),
        }
    }
}

/// Outcome plus the number of plausibility checks performed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TimeSyncReport {
    pub outcome: TimeSyncOutcome,
    pub polls: u32,
}

impl TimeSyncReport {
    pub const fn is_synced(self) -> bool {
        matches!(self.outcome, TimeSyncOutcome::Synced)
    }
}

/// Returns `true` when `year` is at or past the plausibility floor.
pub const fn year_is_plausible(year: Option<i32>, floor_year: i32) -> bool {
    match year {
        Some(year) => year >= floor_year,
        None => false,
    }
}

/// Requests a sync and waits for the wall clock to become plausible.
///
/// The clock is checked up to `plan.max_polls` times, sleeping
/// `plan.poll_interval` between checks but not after the last one.
pub async fn synchronize<T, C>(source: &mut T, clock: &mut C, plan: &TimeSyncPlan) -> TimeSyncReport
where
    T: TimeSource + ?Sized,
    C: Clock,
{
    source.request_sync(plan.server);

    let max_polls = plan.max_polls.max(1);
    for poll in 1..=max_polls {
        if year_is_plausible(source.current_year(), plan.floor_year) {
            return TimeSyncReport {
                outcome: TimeSyncOutcome::Synced,
                polls: poll,
            };
        }
        if poll < max_polls {
            clock.sleep(plan.poll_interval).await;
        }
    }

    TimeSyncReport {
        outcome: TimeSyncOutcome::TimedOut,
        polls: max_polls,
    }
}

/// Civil (proleptic Gregorian, UTC) year containing `unix_seconds`.
pub const fn civil_year_from_unix(unix_seconds: i64) -> i32 {
    let days = unix_seconds.div_euclid(86_400);
    // Shift the epoch to 0000-03-01 so leap days fall at the end of an era year.
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let day_of_era = z.rem_euclid(146_097);
    let year_of_era =
        (day_of_era - day_of_era / 1_460 + day_of_era / 36_524 - day_of_era / 146_096) / 365;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let month_index = (5 * day_of_year + 2) / 153;
    let year = year_of_era + era * 400;
    // Month indices 10 and 11 are January and February of the next civil year.
    let year = if month_index >= 10 { year + 1 } else { year };
    #[allow(clippy::cast_possible_truncation)]
    let year = year as i32;
    year
}
