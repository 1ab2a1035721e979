use core::fmt;
use core::time::Duration;

use heapless::String;

use super::phase::{BootPhase, TransitionError};
use crate::config::ConfigError;
use crate::network::NetworkMode;
use crate::power::{PowerError, SleepRecord};
use crate::reset::{ResetCause, ResetCode};

/// Longest fault message carried into a retreat.
pub const MAX_FAULT_MESSAGE: usize = 64;

pub type FaultMessage = String<MAX_FAULT_MESSAGE>;

/// Builds a [`FaultMessage`], truncating at a character boundary.
pub fn fault_message(text: &str) -> FaultMessage {
    let mut message = FaultMessage::new();
    for ch in text.chars() {
        if message.push(ch).is_err() {
            break;
        }
    }
    message
}

/// Unexpected failure signalled while a phase was executing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Fault {
    pub phase: BootPhase,
    pub message: FaultMessage,
}

impl Fault {
    pub fn new(phase: BootPhase, message: &str) -> Self {
        Self {
            phase,
            message: fault_message(message),
        }
    }

    /// Formats `value` into the fault message.
    pub fn from_display(phase: BootPhase, value: &dyn fmt::Display) -> Self {
        let mut message = FaultMessage::new();
        // Overflow keeps the prefix that fit.
        let _ = fmt::write(&mut message, format_args!("{value}"));
        Self { phase, message }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} during {}", self.message, self.phase)
    }
}

impl From<TransitionError> for Fault {
    fn from(error: TransitionError) -> Self {
        Fault::from_display(error.from, &error)
    }
}

/// Why a boot attempt gave up and went to sleep.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RetreatReason {
    /// Anti-loop guard: the reset itself points at an unstable device.
    UnstableReset(ResetCause),
    StorageMountFailed,
    NetworkAcquisitionFailed,
    UnhandledFault(Fault),
}

impl RetreatReason {
    pub const fn kind(&self) -> RetreatKind {
        match self {
            RetreatReason::UnstableReset(_) => RetreatKind::UnstableReset,
            RetreatReason::StorageMountFailed => RetreatKind::StorageMountFailed,
            RetreatReason::NetworkAcquisitionFailed => RetreatKind::NetworkAcquisitionFailed,
            RetreatReason::UnhandledFault(_) => RetreatKind::UnhandledFault,
        }
    }
}

impl fmt::Display for RetreatReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetreatReason::UnstableReset(cause) => write!(f, "unstable reset ({cause})"),
            RetreatReason::StorageMountFailed => f.write_str("storage mount failed"),
            RetreatReason::NetworkAcquisitionFailed => f.write_str("network acquisition failed"),
            RetreatReason::UnhandledFault(fault) => write!(f, "unhandled fault: {fault}"),
        }
    }
}

impl From<TransitionError> for RetreatReason {
    fn from(error: TransitionError) -> Self {
        RetreatReason::UnhandledFault(error.into())
    }
}

/// Payload-free discriminant of [`RetreatReason`], used by the journal.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RetreatKind {
    UnstableReset,
    StorageMountFailed,
    NetworkAcquisitionFailed,
    UnhandledFault,
}

impl fmt::Display for RetreatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetreatKind::UnstableReset => f.write_str("unstable-reset"),
            RetreatKind::StorageMountFailed => f.write_str("storage-mount-failed"),
            RetreatKind::NetworkAcquisitionFailed => f.write_str("network-acquisition-failed"),
            RetreatKind::UnhandledFault => f.write_str("unhandled-fault"),
        }
    }
}

/// Non-fatal condition reported by a stage.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Advisory {
    ConfigMissing,
    ConfigUnreadable(ConfigError),
    TimeSyncTimedOut { polls: u32 },
    LightSleepEnabled,
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::ConfigMissing => f.write_str("no config file, using defaults"),
            Advisory::ConfigUnreadable(error) => {
                write!(f, "config unreadable ({error}), using defaults")
            }
            Advisory::TimeSyncTimedOut { polls } => {
                write!(f, "time sync timed out after {polls} polls")
            }
            Advisory::LightSleepEnabled => {
                f.write_str("light sleep enabled, capture timing may drift")
            }
        }
    }
}

/// Result of one bring-up stage.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StageOutcome<T> {
    Ok(T),
    Advisory { value: T, warning: Advisory },
    Fatal(RetreatReason),
}

impl<T> StageOutcome<T> {
    pub const fn is_fatal(&self) -> bool {
        matches!(self, StageOutcome::Fatal(_))
    }
}

impl From<PowerError> for StageOutcome<()> {
    fn from(error: PowerError) -> Self {
        StageOutcome::Fatal(RetreatReason::UnhandledFault(Fault::from_display(
            BootPhase::ConfigurePower,
            &error,
        )))
    }
}

/// How the boot attempt ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BootOutcome {
    Running,
    /// Capture taken, sleeping until the next capture.
    Dozing(Duration),
    Retreat(RetreatReason),
}

impl fmt::Display for BootOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootOutcome::Running => f.write_str("running"),
            BootOutcome::Dozing(interval) => write!(f, "dozing for {} s", interval.as_secs()),
            BootOutcome::Retreat(reason) => write!(f, "retreat: {reason}"),
        }
    }
}

/// Retreat carried out through the deep-sleep primitive.
pub type RetreatPlan = SleepRecord<RetreatReason>;

/// Illegal change of [`NetworkMode`] within one boot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NetworkModeError {
    pub from: NetworkMode,
    pub to: NetworkMode,
}

impl fmt::Display for NetworkModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "network mode {} -> {}", self.from, self.to)
    }
}

/// Returned when the outcome of a boot is set a second time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct OutcomeAlreadySet;

impl fmt::Display for OutcomeAlreadySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("boot outcome already set")
    }
}

/// Per-boot state, created at `Start` and owned by the orchestrator.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BootContext {
    pub reset_cause: ResetCause,
    pub reset_code: ResetCode,
    pub boot_count: u32,
    pub time_valid: bool,
    pub storage_mounted: bool,
    network_mode: NetworkMode,
    phase: BootPhase,
    outcome: Option<BootOutcome>,
}

impl BootContext {
    pub const fn new() -> Self {
        Self {
            reset_cause: ResetCause::Other,
            reset_code: ResetCode(0),
            boot_count: 0,
            time_valid: false,
            storage_mounted: false,
            network_mode: NetworkMode::Unassociated,
            phase: BootPhase::Start,
            outcome: None,
        }
    }

    pub const fn phase(&self) -> BootPhase {
        self.phase
    }

    pub const fn network_mode(&self) -> NetworkMode {
        self.network_mode
    }

    pub const fn outcome(&self) -> Option<&BootOutcome> {
        self.outcome.as_ref()
    }

    /// Moves to `next` if the edge is legal.
    pub fn advance(&mut self, next: BootPhase) -> Result<(), TransitionError> {
        if !self.phase.can_transition_to(next) {
            return Err(TransitionError::new(self.phase, next));
        }
        self.phase = next;
        Ok(())
    }

    /// Records the association mode; the mode never leaves access point for
    /// client within a boot.
    pub fn set_network_mode(&mut self, mode: NetworkMode) -> Result<(), NetworkModeError> {
        if !self.network_mode.can_transition_to(mode) {
            return Err(NetworkModeError {
                from: self.network_mode,
                to: mode,
            });
        }
        self.network_mode = mode;
        Ok(())
    }

    /// Sets the terminal outcome. Only the first call succeeds.
    pub fn set_outcome(&mut self, outcome: BootOutcome) -> Result<(), OutcomeAlreadySet> {
        if self.outcome.is_some() {
            return Err(OutcomeAlreadySet);
        }
        self.outcome = Some(outcome);
        Ok(())
    }
}

impl Default for BootContext {
    fn default() -> Self {
        Self::new()
    }
}
