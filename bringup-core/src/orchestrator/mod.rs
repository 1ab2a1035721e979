//! Bring-up state machine.
//!
//! [`BootOrchestrator`] runs every stage in a fixed order against the
//! collaborators supplied by a [`Board`]. Each stage reports a
//! [`StageOutcome`]; the orchestrator is the only place that decides whether
//! an outcome is fatal and the only place that asks [`PowerPolicy`] to
//! retreat. Firmware, the emulator, and the tests all drive the same code
//! with different boards.

mod context;
mod phase;

use core::fmt;
use core::time::Duration;

pub use context::{
    Advisory, BootContext, BootOutcome, Fault, FaultMessage, MAX_FAULT_MESSAGE, NetworkModeError,
    OutcomeAlreadySet, RetreatKind, RetreatPlan, RetreatReason, StageOutcome, fault_message,
};
pub use phase::{BootPhase, TransitionError};

use crate::clock::Clock;
use crate::config::{CameraConfig, ConfigStore, DEFAULT_CONFIG_FILE, WifiCredentials};
use crate::counter::{BootCounterStore, PersistentBootCounter};
use crate::journal::{self, BootEventKind, BootJournal, BootLog, DEFAULT_LOG_FILE, NetworkAttempt};
use crate::network::{self, AcquisitionPlan, NetworkInterface, NetworkMode, NetworkOutcome};
use crate::power::{DEFAULT_RETREAT_DURATION, FrequencyBounds, PowerControl, PowerPolicy};
use crate::reset::{self, ResetCause, ResetReasonSource};
use crate::storage::{DEFAULT_MOUNT_POINT, StorageDevice, capacity_mib};
use crate::supervisor::{DEFAULT_SUPERVISOR_INTERVAL, LoopSupervisor};
use crate::timesync::{self, TimeSource, TimeSyncOutcome, TimeSyncPlan};

/// Everything the collaborators need once bring-up hands over.
pub struct Launch<V> {
    /// The mounted volume; ownership moves to the collaborators.
    pub volume: V,
    pub config: CameraConfig,
    pub network_mode: NetworkMode,
    pub time_valid: bool,
}

/// Camera, upload and server tasks, seen only through their start and fault
/// surfaces.
pub trait Collaborators<V> {
    /// Starts the background tasks. Called at most once per boot.
    fn start_tasks(&mut self, launch: Launch<V>) -> Result<(), FaultMessage>;

    /// Takes one capture onto `volume` before the device dozes again.
    fn capture_before_sleep(
        &mut self,
        volume: &mut V,
        config: &CameraConfig,
    ) -> Result<(), FaultMessage>;

    /// Returns a fault raised by a running task since the last call.
    fn poll_fault(&mut self) -> Option<FaultMessage>;
}

/// Concrete collaborator types for one target.
pub trait Board {
    type Clock: Clock;
    type Reset: ResetReasonSource;
    type Counter: BootCounterStore;
    type Storage: StorageDevice;
    type Config: ConfigStore<<Self::Storage as StorageDevice>::Volume>;
    type Network: NetworkInterface;
    type Time: TimeSource;
    type Power: PowerControl;
    type Collaborators: Collaborators<<Self::Storage as StorageDevice>::Volume>;
    type Log: BootLog;
}

/// Volume type produced by a board's storage device.
pub type VolumeOf<B> = <<B as Board>::Storage as StorageDevice>::Volume;

/// Instant type of a board's clock.
pub type InstantOf<B> = <<B as Board>::Clock as Clock>::Instant;

/// Collaborator instances handed to [`BootOrchestrator::new`].
pub struct BoardComponents<B: Board> {
    pub clock: B::Clock,
    pub reset: B::Reset,
    pub counter: B::Counter,
    pub storage: B::Storage,
    pub config: B::Config,
    pub network: B::Network,
    pub time: B::Time,
    pub power: B::Power,
    pub collaborators: B::Collaborators,
    pub log: B::Log,
}

/// Every bring-up tunable.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BringupSettings {
    pub retreat_duration: Duration,
    pub mount_point: &'static str,
    pub config_file: &'static str,
    pub log_file: &'static str,
    pub acquisition: AcquisitionPlan,
    pub time_sync: TimeSyncPlan,
    pub frequency: FrequencyBounds,
    pub supervisor_interval: Duration,
}

impl Default for BringupSettings {
    fn default() -> Self {
        Self {
            retreat_duration: DEFAULT_RETREAT_DURATION,
            mount_point: DEFAULT_MOUNT_POINT,
            config_file: DEFAULT_CONFIG_FILE,
            log_file: DEFAULT_LOG_FILE,
            acquisition: AcquisitionPlan::default(),
            time_sync: TimeSyncPlan::default(),
            frequency: FrequencyBounds::default(),
            supervisor_interval: DEFAULT_SUPERVISOR_INTERVAL,
        }
    }
}

/// Snapshot returned by [`BootOrchestrator::bring_up`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BootReport {
    pub context: BootContext,
    /// Set when the boot ended in a retreat.
    pub retreat: Option<RetreatPlan>,
    /// Active config, once `LoadConfig` has run.
    pub config: Option<CameraConfig>,
}

impl BootReport {
    pub fn outcome(&self) -> Option<&BootOutcome> {
        self.context.outcome()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.outcome(), Some(BootOutcome::Running))
    }
}

/// Runs the bring-up sequence for one boot.
pub struct BootOrchestrator<B: Board> {
    clock: B::Clock,
    reset: B::Reset,
    counter: PersistentBootCounter<B::Counter>,
    storage: B::Storage,
    config_store: B::Config,
    network: B::Network,
    time: B::Time,
    power: PowerPolicy<B::Power>,
    collaborators: B::Collaborators,
    log: B::Log,
    journal: BootJournal<InstantOf<B>>,
    settings: BringupSettings,
    context: BootContext,
    config: Option<CameraConfig>,
    retreat: Option<RetreatPlan>,
}

impl<B: Board> BootOrchestrator<B> {
    pub fn new(components: BoardComponents<B>, settings: BringupSettings) -> Self {
        Self {
            clock: components.clock,
            reset: components.reset,
            counter: PersistentBootCounter::new(components.counter),
            storage: components.storage,
            config_store: components.config,
            network: components.network,
            time: components.time,
            power: PowerPolicy::new(components.power, settings.retreat_duration),
            collaborators: components.collaborators,
            log: components.log,
            journal: BootJournal::new(),
            settings,
            context: BootContext::new(),
            config: None,
            retreat: None,
        }
    }

    pub fn context(&self) -> &BootContext {
        &self.context
    }

    pub fn journal(&self) -> &BootJournal<InstantOf<B>> {
        &self.journal
    }

    pub fn settings(&self) -> &BringupSettings {
        &self.settings
    }

    /// Runs bring-up to a terminal outcome.
    ///
    /// On `Retreat` and `Dozing` the deep-sleep primitive has already been
    /// invoked when this returns; on hardware it does not return at all.
    /// Calling this again after an outcome exists returns the same report.
    pub async fn bring_up(&mut self) -> BootReport {
        if self.context.outcome().is_none() {
            self.record(BootEventKind::PhaseEntered(BootPhase::Start));
            match self.run_stages().await {
                Ok(outcome) => self.finish(outcome),
                Err(reason) => self.retreat(reason),
            }
        }
        self.report()
    }

    /// Hands the long-lived parts to the loop supervisor. Fails unless the
    /// boot reached `Running`.
    pub fn into_supervisor(self) -> Result<LoopSupervisor<B>, Self> {
        if !matches!(self.context.outcome(), Some(BootOutcome::Running)) {
            return Err(self);
        }
        Ok(LoopSupervisor::new(
            self.clock,
            self.collaborators,
            self.power,
            self.log,
            self.journal,
            self.settings.supervisor_interval,
        ))
    }

    async fn run_stages(&mut self) -> Result<BootOutcome, RetreatReason> {
        let boot_count = self.counter.increment_and_get();
        self.context.boot_count = boot_count;
        self.record(BootEventKind::BootCounted(boot_count));
        self.log_line(format_args!("boot:{boot_count}"));

        self.enter(BootPhase::ClassifyReset)?;
        let classification = reset::classify(&self.reset);
        self.context.reset_code = classification.code;
        self.context.reset_cause = classification.cause;
        self.record(BootEventKind::ResetClassified(classification.cause));
        if classification.cause.is_unstable() {
            self.enter(BootPhase::AntiLoopRetreat)?;
            self.log_line(format_args!(
                "Reset reason {} points at an unstable supply",
                classification.code
            ));
            return Err(RetreatReason::UnstableReset(classification.cause));
        }

        self.enter(BootPhase::MountStorage)?;
        let outcome = self.mount_storage();
        let mut volume = self.settle(outcome)?;
        self.log_line(format_args!(
            "Starting. Reset reason: {}",
            classification.code.name()
        ));

        self.enter(BootPhase::LoadConfig)?;
        let outcome = self.load_config(&mut volume);
        let config = self.settle(outcome)?;
        self.config = Some(config.clone());

        if classification.cause == ResetCause::DeepSleepWake && config.sleepy {
            self.enter(BootPhase::ResumeCapture)?;
            let outcome = self.resume_capture(&mut volume, &config);
            let interval = self.settle(outcome)?;
            self.enter(BootPhase::Dozing)?;
            return Ok(BootOutcome::Dozing(interval));
        }

        self.enter(BootPhase::NetworkAcquire)?;
        let outcome = self.acquire_network(&config.wifi).await;
        let network_mode = self.settle(outcome)?;

        self.enter(BootPhase::SyncTime)?;
        let outcome = self.sync_time().await;
        self.context.time_valid = self.settle(outcome)?;

        self.enter(BootPhase::StartCollaborators)?;
        self.log_line(format_args!("Config: {config}"));
        let launch = Launch {
            volume,
            config,
            network_mode,
            time_valid: self.context.time_valid,
        };
        let outcome = self.start_collaborators(launch);
        self.settle(outcome)?;

        self.enter(BootPhase::ConfigurePower)?;
        let outcome = self.configure_power();
        self.settle(outcome)?;

        self.enter(BootPhase::Running)?;
        Ok(BootOutcome::Running)
    }

    fn mount_storage(&mut self) -> StageOutcome<VolumeOf<B>> {
        let mount_point = self.settings.mount_point;
        match self.storage.mount(mount_point) {
            Ok(volume) => {
                self.context.storage_mounted = true;
                self.record(BootEventKind::StorageMounted);
                match capacity_mib(&volume) {
                    Some(mib) => self.log_line(format_args!(
                        "SD card mounted at {mount_point}: {mib} MB"
                    )),
                    None => self.log_line(format_args!("SD card mounted at {mount_point}")),
                }
                StageOutcome::Ok(volume)
            }
            Err(error) => {
                self.log_line(format_args!("SD card mount failed: {error}"));
                StageOutcome::Fatal(RetreatReason::StorageMountFailed)
            }
        }
    }

    fn load_config(&mut self, volume: &mut VolumeOf<B>) -> StageOutcome<CameraConfig> {
        let warning = match self.config_store.load(volume) {
            Ok(Some(config)) => {
                self.record(BootEventKind::ConfigLoaded);
                return StageOutcome::Ok(config);
            }
            Ok(None) => Advisory::ConfigMissing,
            Err(error) => Advisory::ConfigUnreadable(error),
        };

        let defaults = self.config_store.defaults();
        self.record(BootEventKind::ConfigDefaulted);
        // An unreadable file still holds the operator's settings; only a
        // missing one is replaced.
        if warning == Advisory::ConfigMissing
            && let Err(error) = self.config_store.save(volume, &defaults)
        {
            self.log_line(format_args!("Config write-back failed: {error}"));
        }
        StageOutcome::Advisory {
            value: defaults,
            warning,
        }
    }

    fn resume_capture(
        &mut self,
        volume: &mut VolumeOf<B>,
        config: &CameraConfig,
    ) -> StageOutcome<Duration> {
        match self.collaborators.capture_before_sleep(volume, config) {
            Ok(()) => StageOutcome::Ok(config.capture_interval),
            Err(message) => StageOutcome::Fatal(RetreatReason::UnhandledFault(Fault {
                phase: BootPhase::ResumeCapture,
                message,
            })),
        }
    }

    async fn acquire_network(
        &mut self,
        credentials: &WifiCredentials,
    ) -> StageOutcome<NetworkMode> {
        let started = self.clock.now();
        self.journal.record(
            BootEventKind::NetworkAttemptStarted(NetworkAttempt::Client),
            started,
        );
        let report = network::acquire(
            &mut self.network,
            &mut self.clock,
            credentials,
            &self.settings.acquisition,
        )
        .await;

        if let Some(access_point_elapsed) = report.access_point_elapsed {
            let client_done = started + report.client_elapsed;
            self.journal.record(
                BootEventKind::NetworkAttemptFailed(NetworkAttempt::Client),
                client_done,
            );
            match report.client_error {
                Some(error) => self.log_line(format_args!(
                    "Wi-Fi client '{}' failed: {error}",
                    credentials.ssid
                )),
                None => self.log_line(format_args!(
                    "Wi-Fi client '{}' not connected after {} s",
                    credentials.ssid,
                    report.client_elapsed.as_secs()
                )),
            }

            self.journal.record(
                BootEventKind::NetworkAttemptStarted(NetworkAttempt::AccessPoint),
                client_done,
            );
            if report.outcome == NetworkOutcome::Failed {
                self.journal.record(
                    BootEventKind::NetworkAttemptFailed(NetworkAttempt::AccessPoint),
                    client_done + access_point_elapsed,
                );
                let ssid = self.settings.acquisition.access_point.ssid;
                match report.access_point_error {
                    Some(error) => {
                        self.log_line(format_args!("Access point '{ssid}' failed: {error}"));
                    }
                    None => self.log_line(format_args!(
                        "Access point '{ssid}' not up after {} s",
                        access_point_elapsed.as_secs()
                    )),
                }
            }
        }

        let Some(mode) = report.outcome.mode() else {
            return StageOutcome::Fatal(RetreatReason::NetworkAcquisitionFailed);
        };
        if let Err(error) = self.context.set_network_mode(mode) {
            return StageOutcome::Fatal(RetreatReason::UnhandledFault(Fault::from_display(
                BootPhase::NetworkAcquire,
                &error,
            )));
        }
        self.record(BootEventKind::NetworkAssociated(mode));
        self.log_line(format_args!("Network up in {mode} mode"));
        StageOutcome::Ok(mode)
    }

    async fn sync_time(&mut self) -> StageOutcome<bool> {
        let report =
            timesync::synchronize(&mut self.time, &mut self.clock, &self.settings.time_sync).await;
        match report.outcome {
            TimeSyncOutcome::Synced => {
                self.record(BootEventKind::TimeSynced {
                    polls: report.polls,
                });
                self.log_line(format_args!("Time synced after {} polls", report.polls));
                StageOutcome::Ok(true)
            }
            TimeSyncOutcome::TimedOut => {
                self.record(BootEventKind::TimeSyncTimedOut {
                    polls: report.polls,
                });
                StageOutcome::Advisory {
                    value: false,
                    warning: Advisory::TimeSyncTimedOut {
                        polls: report.polls,
                    },
                }
            }
        }
    }

    fn start_collaborators(&mut self, launch: Launch<VolumeOf<B>>) -> StageOutcome<()> {
        match self.collaborators.start_tasks(launch) {
            Ok(()) => {
                self.record(BootEventKind::CollaboratorsStarted);
                StageOutcome::Ok(())
            }
            Err(message) => StageOutcome::Fatal(RetreatReason::UnhandledFault(Fault {
                phase: BootPhase::StartCollaborators,
                message,
            })),
        }
    }

    fn configure_power(&mut self) -> StageOutcome<()> {
        let bounds = self.settings.frequency;
        if let Err(error) = self.power.configure_steady_state(bounds) {
            self.log_line(format_args!("Power configuration failed: {error}"));
            return error.into();
        }

        self.record(BootEventKind::PowerConfigured);
        self.log_line(format_args!("Power: {bounds}"));
        if bounds.light_sleep {
            StageOutcome::Advisory {
                value: (),
                warning: Advisory::LightSleepEnabled,
            }
        } else {
            StageOutcome::Ok(())
        }
    }

    /// Unwraps a stage outcome, logging advisories and surfacing fatal reasons.
    fn settle<T>(&mut self, outcome: StageOutcome<T>) -> Result<T, RetreatReason> {
        match outcome {
            StageOutcome::Ok(value) => Ok(value),
            StageOutcome::Advisory { value, warning } => {
                self.log_line(format_args!("Warning: {warning}"));
                Ok(value)
            }
            StageOutcome::Fatal(reason) => Err(reason),
        }
    }

    fn enter(&mut self, phase: BootPhase) -> Result<(), TransitionError> {
        self.context.advance(phase)?;
        self.record(BootEventKind::PhaseEntered(phase));
        Ok(())
    }

    fn finish(&mut self, outcome: BootOutcome) {
        match outcome {
            BootOutcome::Dozing(interval) => {
                self.log_line(format_args!(
                    "Capture stored, sleeping {} s",
                    interval.as_secs()
                ));
                self.set_outcome(BootOutcome::Dozing(interval));
                self.power.doze(interval);
            }
            other => {
                self.log_line(format_args!("Bring-up complete: {other}"));
                self.set_outcome(other);
            }
        }
    }

    fn retreat(&mut self, reason: RetreatReason) {
        if self.context.advance(BootPhase::Retreat).is_ok() {
            self.record(BootEventKind::PhaseEntered(BootPhase::Retreat));
        }
        self.record(BootEventKind::Retreat(reason.kind()));
        self.log_line(format_args!(
            "Retreat: {reason}. Sleeping {} s",
            self.power.retreat_duration().as_secs()
        ));
        self.set_outcome(BootOutcome::Retreat(reason.clone()));
        self.retreat = Some(self.power.retreat(reason));
    }

    fn set_outcome(&mut self, outcome: BootOutcome) {
        if let Err(error) = self.context.set_outcome(outcome) {
            self.log_line(format_args!("{error}"));
        }
    }

    fn report(&self) -> BootReport {
        BootReport {
            context: self.context.clone(),
            retreat: self.retreat.clone(),
            config: self.config.clone(),
        }
    }

    fn record(&mut self, event: BootEventKind) {
        let now = self.clock.now();
        self.journal.record(event, now);
    }

    fn log_line(&mut self, args: fmt::Arguments<'_>) {
        journal::append_fmt(&mut self.log, args);
    }
}
