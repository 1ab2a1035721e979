//! Steady-state tick loop.
//!
//! Once bring-up reaches `Running` the device only wakes periodically to look
//! for faults raised by the collaborator tasks. A fault takes the same retreat
//! path as a failed bring-up.

use core::fmt;
use core::time::Duration;

use crate::clock::Clock;
use crate::journal::{self, BootEventKind, BootJournal};
use crate::orchestrator::{
    Board, BootPhase, Collaborators, Fault, InstantOf, RetreatPlan, RetreatReason,
};
use crate::power::PowerPolicy;

/// Default period between supervisor ticks.
pub const DEFAULT_SUPERVISOR_INTERVAL: Duration = Duration::from_secs(60);

/// Result of a single [`LoopSupervisor::tick`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TickOutcome {
    Healthy,
    Retreat(RetreatPlan),
}

/// Owns the parts of the board that outlive bring-up.
pub struct LoopSupervisor<B: Board> {
    clock: B::Clock,
    collaborators: B::Collaborators,
    power: PowerPolicy<B::Power>,
    log: B::Log,
    journal: BootJournal<InstantOf<B>>,
    interval: Duration,
    ticks: u32,
}

impl<B: Board> LoopSupervisor<B> {
    pub(crate) fn new(
        clock: B::Clock,
        collaborators: B::Collaborators,
        power: PowerPolicy<B::Power>,
        log: B::Log,
        journal: BootJournal<InstantOf<B>>,
        interval: Duration,
    ) -> Self {
        Self {
            clock,
            collaborators,
            power,
            log,
            journal,
            interval,
            ticks: 0,
        }
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn journal(&self) -> &BootJournal<InstantOf<B>> {
        &self.journal
    }

    /// Waits one interval, then checks the collaborators for a fault.
    pub async fn tick(&mut self) -> TickOutcome {
        self.clock.sleep(self.interval).await;
        self.ticks = self.ticks.wrapping_add(1);
        self.record(BootEventKind::SupervisorTick(self.ticks));

        match self.collaborators.poll_fault() {
            None => TickOutcome::Healthy,
            Some(message) => TickOutcome::Retreat(self.retreat(Fault {
                phase: BootPhase::Running,
                message,
            })),
        }
    }

    /// Ticks until a fault forces a retreat.
    ///
    /// On hardware the retreat never returns, so this only completes under
    /// test doubles.
    pub async fn run(&mut self) -> RetreatPlan {
        loop {
            if let TickOutcome::Retreat(plan) = self.tick().await {
                return plan;
            }
        }
    }

    fn retreat(&mut self, fault: Fault) -> RetreatPlan {
        let reason = RetreatReason::UnhandledFault(fault);
        self.record(BootEventKind::Retreat(reason.kind()));
        self.log_line(format_args!(
            "Retreat: {reason}. Sleeping {} s",
            self.power.retreat_duration().as_secs()
        ));
        self.power.retreat(reason)
    }

    fn record(&mut self, event: BootEventKind) {
        let now = self.clock.now();
        self.journal.record(event, now);
    }

    fn log_line(&mut self, args: fmt::Arguments<'_>) {
        journal::append_fmt(&mut self.log, args);
    }
}
