//! Deep-sleep retreat and steady-state frequency scaling.

use core::fmt;
use core::time::Duration;

/// Fixed time spent asleep after any fatal condition.
pub const DEFAULT_RETREAT_DURATION: Duration = Duration::from_secs(10 * 60);

pub const DEFAULT_MIN_FREQUENCY_MHZ: u16 = 80;
pub const DEFAULT_MAX_FREQUENCY_MHZ: u16 = 240;

/// Reasons steady-state power configuration can be refused.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PowerError {
    /// A bound of zero MHz.
    ZeroFrequency,
    /// `min_mhz` exceeds `max_mhz`.
    InvertedBounds { min_mhz: u16, max_mhz: u16 },
    /// The platform rejected otherwise valid bounds.
    Unsupported,
}

impl fmt::Display for PowerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerError::ZeroFrequency => f.write_str("frequency bound of 0 MHz"),
            PowerError::InvertedBounds { min_mhz, max_mhz } => {
                write!(f, "min {min_mhz} MHz above max {max_mhz} MHz")
            }
            PowerError::Unsupported => f.write_str("frequency bounds not supported"),
        }
    }
}

/// CPU frequency range applied once bring-up reaches `Running`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FrequencyBounds {
    pub min_mhz: u16,
    pub max_mhz: u16,
    pub light_sleep: bool,
}

impl FrequencyBounds {
    pub const fn new(min_mhz: u16, max_mhz: u16, light_sleep: bool) -> Self {
        Self {
            min_mhz,
            max_mhz,
            light_sleep,
        }
    }

    /// Rejects bounds no platform could apply.
    pub const fn validate(self) -> Result<Self, PowerError> {
        if self.min_mhz == 0 || self.max_mhz == 0 {
            return Err(PowerError::ZeroFrequency);
        }
        if self.min_mhz > self.max_mhz {
            return Err(PowerError::InvertedBounds {
                min_mhz: self.min_mhz,
                max_mhz: self.max_mhz,
            });
        }
        Ok(self)
    }
}

impl Default for FrequencyBounds {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_FREQUENCY_MHZ, DEFAULT_MAX_FREQUENCY_MHZ, false)
    }
}

impl fmt::Display for FrequencyBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{} MHz, light sleep {}",
            self.min_mhz,
            self.max_mhz,
            if self.light_sleep { "on" } else { "off" }
        )
    }
}

/// Platform power primitives.
pub trait PowerControl {
    /// Enters timer-only deep sleep for `duration`.
    ///
    /// On hardware this never returns: the chip resets into bring-up when the
    /// timer fires. Test doubles record the request and return.
    fn deep_sleep(&mut self, duration: Duration);

    /// Applies the steady-state frequency range.
    fn configure_frequency_scaling(&mut self, bounds: FrequencyBounds) -> Result<(), PowerError>;
}

/// A deep-sleep request that has been carried out.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SleepRecord<R> {
    pub reason: R,
    pub duration: Duration,
}

/// Owns the power primitives and the single retreat duration.
pub struct PowerPolicy<P> {
    power: P,
    retreat_duration: Duration,
}

impl<P> PowerPolicy<P>
where
    P: PowerControl,
{
    pub const fn new(power: P, retreat_duration: Duration) -> Self {
        Self {
            power,
            retreat_duration,
        }
    }

    pub const fn retreat_duration(&self) -> Duration {
        self.retreat_duration
    }

    /// Sleeps for the retreat duration. `reason` is only carried into the
    /// returned record.
    pub fn retreat<R>(&mut self, reason: R) -> SleepRecord<R> {
        self.power.deep_sleep(self.retreat_duration);
        SleepRecord {
            reason,
            duration: self.retreat_duration,
        }
    }

    /// Sleeps for a caller-chosen duration, used by the capture-and-doze path.
    pub fn doze(&mut self, duration: Duration) {
        self.power.deep_sleep(duration);
    }

    /// Validates and applies `bounds`.
    pub fn configure_steady_state(&mut self, bounds: FrequencyBounds) -> Result<(), PowerError> {
        let bounds = bounds.validate()?;
        self.power.configure_frequency_scaling(bounds)
    }

    pub fn power(&self) -> &P {
        &self.power
    }

    pub fn power_mut(&mut self) -> &mut P {
        &mut self.power
    }

    pub fn into_inner(self) -> P {
        self.power
    }
}
