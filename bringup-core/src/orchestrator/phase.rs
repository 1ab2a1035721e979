use core::fmt;

/// Bring-up state machine phases, in execution order.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BootPhase {
    Start,
    ClassifyReset,
    AntiLoopRetreat,
    MountStorage,
    LoadConfig,
    ResumeCapture,
    NetworkAcquire,
    SyncTime,
    StartCollaborators,
    ConfigurePower,
    Running,
    Dozing,
    Retreat,
}

impl BootPhase {
    /// Returns `true` for phases that end the boot attempt.
    pub const fn is_terminal(self) -> bool {
        matches!(self, BootPhase::Running | BootPhase::Dozing | BootPhase::Retreat)
    }

    /// Returns `true` when `next` is a legal successor of `self`.
    ///
    /// Every non-terminal phase may fall through to [`BootPhase::Retreat`].
    pub const fn can_transition_to(self, next: BootPhase) -> bool {
        if matches!(next, BootPhase::Retreat) {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (BootPhase::Start, BootPhase::ClassifyReset)
                | (
                    BootPhase::ClassifyReset,
                    BootPhase::AntiLoopRetreat | BootPhase::MountStorage
                )
                | (BootPhase::MountStorage, BootPhase::LoadConfig)
                | (
                    BootPhase::LoadConfig,
                    BootPhase::NetworkAcquire | BootPhase::ResumeCapture
                )
                | (BootPhase::ResumeCapture, BootPhase::Dozing)
                | (BootPhase::NetworkAcquire, BootPhase::SyncTime)
                | (BootPhase::SyncTime, BootPhase::StartCollaborators)
                | (BootPhase::StartCollaborators, BootPhase::ConfigurePower)
                | (BootPhase::ConfigurePower, BootPhase::Running)
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            BootPhase::Start => "start",
            BootPhase::ClassifyReset => "classify-reset",
            BootPhase::AntiLoopRetreat => "anti-loop-retreat",
            BootPhase::MountStorage => "mount-storage",
            BootPhase::LoadConfig => "load-config",
            BootPhase::ResumeCapture => "resume-capture",
            BootPhase::NetworkAcquire => "network-acquire",
            BootPhase::SyncTime => "sync-time",
            BootPhase::StartCollaborators => "start-collaborators",
            BootPhase::ConfigurePower => "configure-power",
            BootPhase::Running => "running",
            BootPhase::Dozing => "dozing",
            BootPhase::Retreat => "retreat",
        }
    }
}

impl fmt::Display for BootPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported when attempting an invalid phase transition.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TransitionError {
    pub from: BootPhase,
    pub to: BootPhase,
}

impl TransitionError {
    pub const fn new(from: BootPhase, to: BootPhase) -> Self {
        Self { from, to }
    }
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal transition {} -> {}", self.from, self.to)
    }
}
