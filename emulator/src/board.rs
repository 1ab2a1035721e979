//! Simulated camera board.
//!
//! Every component shares one [`SimState`], which owns the virtual clock, the
//! retained boot counter, the file on the simulated card and the set of
//! injected faults. State survives between boots the same way the hardware's
//! does: the counter until `power-loss`, the card contents forever. Deep
//! sleep is recorded but does not advance the virtual clock.

use std::cell::RefCell;
use std::fmt;
use std::ops::Add;
use std::rc::Rc;
use std::time::Duration;

use bringup_core::clock::{Clock, MonotonicInstant};
use bringup_core::config::{CameraConfig, ConfigError, ConfigStore, WifiCredentials};
use bringup_core::counter::{BootCounterStore, InMemoryBootCounterStore};
use bringup_core::journal::BootLog;
use bringup_core::network::{AccessPointIdentity, NetworkError, NetworkInterface};
use bringup_core::orchestrator::{
    Board, BoardComponents, Collaborators, FaultMessage, Launch, fault_message,
};
use bringup_core::power::{FrequencyBounds, PowerControl, PowerError};
use bringup_core::reset::{ResetCode, ResetReasonSource};
use bringup_core::storage::{MountedVolume, StorageDevice, StorageError};
use bringup_core::timesync::{TimeSource, civil_year_from_unix};

/// Unix time the simulated NTP server hands out at virtual time zero.
const SIM_EPOCH_UNIX_SECS: u64 = 1_735_689_600;

/// Client association succeeds on this link check.
const CLIENT_UP_ON_CHECK: u32 = 3;

/// Time sync lands on this plausibility check.
const TIME_SYNCED_ON_READ: u32 = 2;

const CARD_CAPACITY_BYTES: u64 = 32 * 1024 * 1024 * 1024;

/// Virtual monotonic timestamp in microseconds.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SimInstant(u64);

impl SimInstant {
    pub fn since_start(self) -> Duration {
        Duration::from_micros(self.0)
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        let micros = u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(micros))
    }
}

impl MonotonicInstant for SimInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

/// Subsystems whose failure can be injected from the console.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FaultTarget {
    Storage,
    Client,
    AccessPoint,
    Time,
    Config,
    Collaborators,
    Power,
    Runtime,
}

impl FaultTarget {
    pub const ALL: [FaultTarget; 8] = [
        FaultTarget::Storage,
        FaultTarget::Client,
        FaultTarget::AccessPoint,
        FaultTarget::Time,
        FaultTarget::Config,
        FaultTarget::Collaborators,
        FaultTarget::Power,
        FaultTarget::Runtime,
    ];

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|target| target.tag().eq_ignore_ascii_case(tag))
    }

    pub const fn tag(self) -> &'static str {
        match self {
            FaultTarget::Storage => "storage",
            FaultTarget::Client => "client",
            FaultTarget::AccessPoint => "ap",
            FaultTarget::Time => "time",
            FaultTarget::Config => "config",
            FaultTarget::Collaborators => "collaborators",
            FaultTarget::Power => "power",
            FaultTarget::Runtime => "runtime",
        }
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for FaultTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Set of injected faults.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FaultSet(u8);

impl FaultSet {
    pub fn insert(&mut self, target: FaultTarget) {
        self.0 |= target.bit();
    }

    pub fn remove(&mut self, target: FaultTarget) {
        self.0 &= !target.bit();
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    pub fn contains(self, target: FaultTarget) -> bool {
        self.0 & target.bit() != 0
    }

    pub fn iter(self) -> impl Iterator<Item = FaultTarget> {
        FaultTarget::ALL
            .into_iter()
            .filter(move |target| self.contains(*target))
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum RadioMode {
    Client,
    AccessPoint,
}

/// Shared simulator state.
pub struct SimState {
    pub now: SimInstant,
    pub reset_code: ResetCode,
    pub counter: InMemoryBootCounterStore,
    pub faults: FaultSet,
    /// Contents of the config file on the simulated card.
    pub config_file: Option<String>,
    pub log: Vec<String>,
    pub sleeps: Vec<Duration>,
    pub captures: u32,
    pub tasks_running: bool,
    radio: Option<RadioMode>,
    radio_checks: u32,
    time_synced_at: Option<SimInstant>,
    time_reads: u32,
}

pub type SharedSim = Rc<RefCell<SimState>>;

impl SimState {
    pub fn new() -> SharedSim {
        Rc::new(RefCell::new(Self {
            now: SimInstant::default(),
            reset_code: ResetCode::POWER_ON,
            counter: InMemoryBootCounterStore::new(),
            faults: FaultSet::default(),
            config_file: None,
            log: Vec::new(),
            sleeps: Vec::new(),
            captures: 0,
            tasks_running: false,
            radio: None,
            radio_checks: 0,
            time_synced_at: None,
            time_reads: 0,
        }))
    }

    /// Prepares for a new boot with `reset_code` latched.
    pub fn reset(&mut self, reset_code: ResetCode) {
        self.reset_code = reset_code;
        self.tasks_running = false;
        self.radio = None;
        self.radio_checks = 0;
        self.time_reads = 0;
        self.time_synced_at = None;
    }

    /// Removes and returns the log lines written since the last call.
    pub fn drain_log(&mut self) -> Vec<String> {
        std::mem::take(&mut self.log)
    }

    pub fn stored_count(&self) -> Option<u32> {
        self.counter.read()
    }

    fn wall_clock_year(&self) -> Option<i32> {
        let synced_at = self.time_synced_at?;
        let secs = SIM_EPOCH_UNIX_SECS + self.now.saturating_duration_since(synced_at).as_secs();
        Some(civil_year_from_unix(i64::try_from(secs).unwrap_or(i64::MAX)))
    }
}

pub struct SimClock(SharedSim);

impl Clock for SimClock {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        self.0.borrow().now
    }

    async fn sleep(&mut self, duration: Duration) {
        let mut sim = self.0.borrow_mut();
        sim.now = sim.now + duration;
    }
}

pub struct SimResetRegister(SharedSim);

impl ResetReasonSource for SimResetRegister {
    fn read(&self) -> ResetCode {
        self.0.borrow().reset_code
    }
}

pub struct SimRetainedMemory(SharedSim);

impl BootCounterStore for SimRetainedMemory {
    fn read(&self) -> Option<u32> {
        self.0.borrow().counter.read()
    }

    fn write(&mut self, value: u32) {
        self.0.borrow_mut().counter.write(value);
    }
}

/// Handle to the mounted simulated card.
pub struct SimVolume {
    sim: SharedSim,
}

impl MountedVolume for SimVolume {
    fn capacity_bytes(&self) -> Option<u64> {
        Some(CARD_CAPACITY_BYTES)
    }
}

pub struct SimCardSlot(SharedSim);

impl StorageDevice for SimCardSlot {
    type Volume = SimVolume;

    fn mount(&mut self, _: &str) -> Result<SimVolume, StorageError> {
        if self.0.borrow().faults.contains(FaultTarget::Storage) {
            return Err(StorageError::NoMedia);
        }
        Ok(SimVolume {
            sim: Rc::clone(&self.0),
        })
    }
}

/// Config store reading and writing the card's config file.
pub struct SimConfigFile {
    defaults: CameraConfig,
}

impl ConfigStore<SimVolume> for SimConfigFile {
    fn load(&mut self, volume: &mut SimVolume) -> Result<Option<CameraConfig>, ConfigError> {
        let sim = volume.sim.borrow();
        if sim.faults.contains(FaultTarget::Config) {
            return Err(ConfigError::Io);
        }
        match &sim.config_file {
            Some(text) => Ok(Some(CameraConfig::parse(text)?)),
            None => Ok(None),
        }
    }

    fn save(&mut self, volume: &mut SimVolume, config: &CameraConfig) -> Result<(), ConfigError> {
        let mut sim = volume.sim.borrow_mut();
        if sim.faults.contains(FaultTarget::Config) {
            return Err(ConfigError::Io);
        }
        let rendered = config.render().map_err(|_| ConfigError::TooLarge)?;
        sim.config_file = Some(rendered.as_str().to_owned());
        Ok(())
    }

    fn defaults(&self) -> CameraConfig {
        self.defaults.clone()
    }
}

pub struct SimRadio(SharedSim);

impl NetworkInterface for SimRadio {
    fn begin_client(&mut self, credentials: &WifiCredentials) -> Result<(), NetworkError> {
        let mut sim = self.0.borrow_mut();
        sim.log.push(format!("[radio] client mode, ssid '{}'", credentials.ssid));
        sim.radio = Some(RadioMode::Client);
        sim.radio_checks = 0;
        Ok(())
    }

    fn begin_access_point(&mut self, identity: &AccessPointIdentity) -> Result<(), NetworkError> {
        let mut sim = self.0.borrow_mut();
        sim.log.push(format!("[radio] access point '{}'", identity.ssid));
        sim.radio = Some(RadioMode::AccessPoint);
        sim.radio_checks = 0;
        Ok(())
    }

    fn is_up(&mut self) -> bool {
        let mut sim = self.0.borrow_mut();
        sim.radio_checks += 1;
        match sim.radio {
            Some(RadioMode::Client) => {
                !sim.faults.contains(FaultTarget::Client) && sim.radio_checks >= CLIENT_UP_ON_CHECK
            }
            Some(RadioMode::AccessPoint) => !sim.faults.contains(FaultTarget::AccessPoint),
            None => false,
        }
    }

    fn shutdown(&mut self) {
        self.0.borrow_mut().radio = None;
    }
}

pub struct SimTimeSource(SharedSim);

impl TimeSource for SimTimeSource {
    fn request_sync(&mut self, server: &str) {
        self.0
            .borrow_mut()
            .log
            .push(format!("[sntp] request to {server}"));
    }

    fn current_year(&self) -> Option<i32> {
        let mut sim = self.0.borrow_mut();
        sim.time_reads += 1;
        if sim.time_synced_at.is_none()
            && !sim.faults.contains(FaultTarget::Time)
            && sim.time_reads >= TIME_SYNCED_ON_READ
        {
            sim.time_synced_at = Some(sim.now);
        }
        sim.wall_clock_year()
    }
}

pub struct SimPower(SharedSim);

impl PowerControl for SimPower {
    fn deep_sleep(&mut self, duration: Duration) {
        let mut sim = self.0.borrow_mut();
        sim.sleeps.push(duration);
        sim.tasks_running = false;
    }

    fn configure_frequency_scaling(&mut self, bounds: FrequencyBounds) -> Result<(), PowerError> {
        let mut sim = self.0.borrow_mut();
        if sim.faults.contains(FaultTarget::Power) {
            return Err(PowerError::Unsupported);
        }
        sim.log.push(format!("[pm] {bounds}"));
        Ok(())
    }
}

pub struct SimTasks(SharedSim);

impl Collaborators<SimVolume> for SimTasks {
    fn start_tasks(&mut self, launch: Launch<SimVolume>) -> Result<(), FaultMessage> {
        let mut sim = self.0.borrow_mut();
        if sim.faults.contains(FaultTarget::Collaborators) {
            return Err(fault_message("camera init failed"));
        }
        sim.tasks_running = true;
        sim.log.push(format!(
            "[tasks] started, network {} time-valid {} upload {}",
            launch.network_mode,
            launch.time_valid,
            launch.config.upload_mode.as_str()
        ));
        Ok(())
    }

    fn capture_before_sleep(
        &mut self,
        _: &mut SimVolume,
        _: &CameraConfig,
    ) -> Result<(), FaultMessage> {
        let mut sim = self.0.borrow_mut();
        if sim.faults.contains(FaultTarget::Collaborators) {
            return Err(fault_message("capture failed"));
        }
        sim.captures += 1;
        let index = sim.captures;
        sim.log.push(format!("[camera] stored IMG{index:05}.JPG"));
        Ok(())
    }

    fn poll_fault(&mut self) -> Option<FaultMessage> {
        let sim = self.0.borrow();
        sim.faults
            .contains(FaultTarget::Runtime)
            .then(|| fault_message("capture task stalled"))
    }
}

pub struct SimLog(SharedSim);

impl BootLog for SimLog {
    fn append(&mut self, message: &str) {
        self.0.borrow_mut().log.push(message.to_owned());
    }
}

pub struct SimBoard;

impl Board for SimBoard {
    type Clock = SimClock;
    type Reset = SimResetRegister;
    type Counter = SimRetainedMemory;
    type Storage = SimCardSlot;
    type Config = SimConfigFile;
    type Network = SimRadio;
    type Time = SimTimeSource;
    type Power = SimPower;
    type Collaborators = SimTasks;
    type Log = SimLog;
}

/// Builds a fresh set of components over `sim`.
pub fn components(sim: &SharedSim, defaults: &CameraConfig) -> BoardComponents<SimBoard> {
    BoardComponents {
        clock: SimClock(Rc::clone(sim)),
        reset: SimResetRegister(Rc::clone(sim)),
        counter: SimRetainedMemory(Rc::clone(sim)),
        storage: SimCardSlot(Rc::clone(sim)),
        config: SimConfigFile {
            defaults: defaults.clone(),
        },
        network: SimRadio(Rc::clone(sim)),
        time: SimTimeSource(Rc::clone(sim)),
        power: SimPower(Rc::clone(sim)),
        collaborators: SimTasks(Rc::clone(sim)),
        log: SimLog(Rc::clone(sim)),
    }
}
