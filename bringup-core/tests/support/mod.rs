//! Simulated board shared by the integration tests.
//!
//! Every component holds a handle to the same [`Bench`], so a test can script
//! the hardware before a boot and inspect the recorded effects afterwards.

#![allow(dead_code)]

use core::cell::RefCell;
use core::ops::Add;
use core::time::Duration;
use std::rc::Rc;

use bringup_core::clock::{Clock, MonotonicInstant};
use bringup_core::config::{
    CameraConfig, ConfigError, ConfigParseError, ConfigParseErrorKind, ConfigStore,
    WifiCredentials,
};
use bringup_core::counter::{BootCounterStore, InMemoryBootCounterStore};
use bringup_core::journal::BootLog;
use bringup_core::network::{AccessPointIdentity, NetworkError, NetworkInterface, NetworkMode};
use bringup_core::orchestrator::{
    Board, BoardComponents, BootOrchestrator, BootReport, BringupSettings, Collaborators,
    FaultMessage, Launch, fault_message,
};
use bringup_core::power::{FrequencyBounds, PowerControl, PowerError};
use bringup_core::reset::{ResetCode, ResetReasonSource};
use bringup_core::storage::{MountedVolume, StorageDevice, StorageError};
use bringup_core::timesync::TimeSource;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MockInstant(u64);

impl MockInstant {
    pub const fn micros(value: u64) -> Self {
        Self(value)
    }

    pub const fn as_micros(self) -> u64 {
        self.0
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

/// Observable side effects, in the order they happened.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    Mount,
    ConfigLoad,
    ConfigSave,
    ClientBegin,
    AccessPointBegin,
    RadioShutdown,
    TimeSyncRequest,
    TasksStarted,
    CaptureTaken,
    FrequencyConfigured(FrequencyBounds),
    DeepSleep(Duration),
}

/// What the config store holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoredConfig {
    Present(CameraConfig),
    Missing,
    Corrupt,
    /// The file exists but reading it fails.
    Unreadable,
}

/// Scripted hardware behaviour. `None` for an `*_after` knob means "never".
#[derive(Clone, Debug)]
pub struct Script {
    pub reset_code: u8,
    pub storage_ok: bool,
    pub config: StoredConfig,
    pub config_save_ok: bool,
    pub client_up_after: Option<u32>,
    pub access_point_up_after: Option<u32>,
    pub time_synced_after: Option<u32>,
    pub tasks_fail: bool,
    pub capture_fail: bool,
    pub power_fail: bool,
    pub runtime_fault_on_poll: Option<u32>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            reset_code: ResetCode::POWER_ON.0,
            storage_ok: true,
            config: StoredConfig::Present(studio_config()),
            config_save_ok: true,
            client_up_after: Some(1),
            access_point_up_after: Some(1),
            time_synced_after: Some(2),
            tasks_fail: false,
            capture_fail: false,
            power_fail: false,
            runtime_fault_on_poll: None,
        }
    }
}

/// Launch payload as seen by the collaborators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchRecord {
    pub config: CameraConfig,
    pub network_mode: NetworkMode,
    pub time_valid: bool,
}

pub struct Bench {
    pub script: Script,
    pub now: MockInstant,
    pub counter: InMemoryBootCounterStore,
    pub effects: Vec<Effect>,
    pub log: Vec<String>,
    pub saved_configs: Vec<CameraConfig>,
    pub launch: Option<LaunchRecord>,
    radio_checks: u32,
    radio_mode: Option<Effect>,
    time_reads: u32,
    fault_polls: u32,
}

impl Bench {
    pub fn new(script: Script) -> Shared {
        Rc::new(RefCell::new(Self {
            script,
            now: MockInstant::micros(0),
            counter: InMemoryBootCounterStore::new(),
            effects: Vec::new(),
            log: Vec::new(),
            saved_configs: Vec::new(),
            launch: None,
            radio_checks: 0,
            radio_mode: None,
            time_reads: 0,
            fault_polls: 0,
        }))
    }

    /// Clears per-boot state and sets a new reset code; the retained counter
    /// survives.
    pub fn reset(&mut self, reset_code: u8) {
        self.script.reset_code = reset_code;
        self.effects.clear();
        self.log.clear();
        self.launch = None;
        self.radio_checks = 0;
        self.radio_mode = None;
        self.time_reads = 0;
        self.fault_polls = 0;
    }

    pub fn count(&self, effect: Effect) -> usize {
        self.effects.iter().filter(|seen| **seen == effect).count()
    }

    pub fn position(&self, effect: Effect) -> Option<usize> {
        self.effects.iter().position(|seen| *seen == effect)
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::DeepSleep(duration) => Some(*duration),
                _ => None,
            })
            .collect()
    }

    pub fn counter_value(&self) -> Option<u32> {
        self.counter.read()
    }

    pub fn logged(&self, needle: &str) -> bool {
        self.log.iter().any(|line| line.contains(needle))
    }
}

pub type Shared = Rc<RefCell<Bench>>;

pub fn studio_config() -> CameraConfig {
    CameraConfig {
        wifi: WifiCredentials::new("studio", "hunter22").unwrap(),
        ..CameraConfig::default()
    }
}

pub struct TestClock(Shared);

impl Clock for TestClock {
    type Instant = MockInstant;

    fn now(&self) -> MockInstant {
        self.0.borrow().now
    }

    async fn sleep(&mut self, duration: Duration) {
        let mut bench = self.0.borrow_mut();
        bench.now = bench.now + duration;
    }
}

pub struct TestReset(Shared);

impl ResetReasonSource for TestReset {
    fn read(&self) -> ResetCode {
        ResetCode(self.0.borrow().script.reset_code)
    }
}

pub struct TestCounter(Shared);

impl BootCounterStore for TestCounter {
    fn read(&self) -> Option<u32> {
        self.0.borrow().counter.read()
    }

    fn write(&mut self, value: u32) {
        self.0.borrow_mut().counter.write(value);
    }
}

#[derive(Debug)]
pub struct TestVolume;

impl MountedVolume for TestVolume {
    fn capacity_bytes(&self) -> Option<u64> {
        Some(16 * 1024 * 1024 * 1024)
    }
}

pub struct TestStorage(Shared);

impl StorageDevice for TestStorage {
    type Volume = TestVolume;

    fn mount(&mut self, mount_point: &str) -> Result<TestVolume, StorageError> {
        assert_eq!(mount_point, "/sdcard");
        let mut bench = self.0.borrow_mut();
        bench.effects.push(Effect::Mount);
        if bench.script.storage_ok {
            Ok(TestVolume)
        } else {
            Err(StorageError::NoMedia)
        }
    }
}

pub struct TestConfigStore(Shared);

impl ConfigStore<TestVolume> for TestConfigStore {
    fn load(&mut self, _: &mut TestVolume) -> Result<Option<CameraConfig>, ConfigError> {
        let mut bench = self.0.borrow_mut();
        bench.effects.push(Effect::ConfigLoad);
        match &bench.script.config {
            StoredConfig::Present(config) => Ok(Some(config.clone())),
            StoredConfig::Missing => Ok(None),
            StoredConfig::Corrupt => Err(ConfigError::Malformed(ConfigParseError::new(
                1,
                ConfigParseErrorKind::Syntax,
            ))),
            StoredConfig::Unreadable => Err(ConfigError::Io),
        }
    }

    fn save(&mut self, _: &mut TestVolume, config: &CameraConfig) -> Result<(), ConfigError> {
        let mut bench = self.0.borrow_mut();
        bench.effects.push(Effect::ConfigSave);
        if bench.script.config_save_ok {
            bench.saved_configs.push(config.clone());
            Ok(())
        } else {
            Err(ConfigError::Io)
        }
    }

    fn defaults(&self) -> CameraConfig {
        CameraConfig::default()
    }
}

pub struct TestRadio(Shared);

impl NetworkInterface for TestRadio {
    fn begin_client(&mut self, _: &WifiCredentials) -> Result<(), NetworkError> {
        let mut bench = self.0.borrow_mut();
        bench.effects.push(Effect::ClientBegin);
        bench.radio_mode = Some(Effect::ClientBegin);
        bench.radio_checks = 0;
        Ok(())
    }

    fn begin_access_point(&mut self, identity: &AccessPointIdentity) -> Result<(), NetworkError> {
        assert_eq!(identity.ssid, "tlc32");
        let mut bench = self.0.borrow_mut();
        bench.effects.push(Effect::AccessPointBegin);
        bench.radio_mode = Some(Effect::AccessPointBegin);
        bench.radio_checks = 0;
        Ok(())
    }

    fn is_up(&mut self) -> bool {
        let mut bench = self.0.borrow_mut();
        bench.radio_checks += 1;
        let target = match bench.radio_mode {
            Some(Effect::ClientBegin) => bench.script.client_up_after,
            Some(Effect::AccessPointBegin) => bench.script.access_point_up_after,
            _ => None,
        };
        target.is_some_and(|after| bench.radio_checks >= after)
    }

    fn shutdown(&mut self) {
        let mut bench = self.0.borrow_mut();
        bench.effects.push(Effect::RadioShutdown);
        bench.radio_mode = None;
    }
}

pub struct TestTime(Shared);

impl TimeSource for TestTime {
    fn request_sync(&mut self, server: &str) {
        assert_eq!(server, "pool.ntp.org");
        self.0.borrow_mut().effects.push(Effect::TimeSyncRequest);
    }

    fn current_year(&self) -> Option<i32> {
        let mut bench = self.0.borrow_mut();
        bench.time_reads += 1;
        match bench.script.time_synced_after {
            Some(after) if bench.time_reads >= after => Some(2025),
            _ => None,
        }
    }
}

pub struct TestPower(Shared);

impl PowerControl for TestPower {
    fn deep_sleep(&mut self, duration: Duration) {
        self.0.borrow_mut().effects.push(Effect::DeepSleep(duration));
    }

    fn configure_frequency_scaling(&mut self, bounds: FrequencyBounds) -> Result<(), PowerError> {
        let mut bench = self.0.borrow_mut();
        if bench.script.power_fail {
            return Err(PowerError::Unsupported);
        }
        bench.effects.push(Effect::FrequencyConfigured(bounds));
        Ok(())
    }
}

pub struct TestTasks(Shared);

impl Collaborators<TestVolume> for TestTasks {
    fn start_tasks(&mut self, launch: Launch<TestVolume>) -> Result<(), FaultMessage> {
        let mut bench = self.0.borrow_mut();
        if bench.script.tasks_fail {
            return Err(fault_message("camera sensor not detected"));
        }
        bench.effects.push(Effect::TasksStarted);
        bench.launch = Some(LaunchRecord {
            config: launch.config,
            network_mode: launch.network_mode,
            time_valid: launch.time_valid,
        });
        Ok(())
    }

    fn capture_before_sleep(
        &mut self,
        _: &mut TestVolume,
        _: &CameraConfig,
    ) -> Result<(), FaultMessage> {
        let mut bench = self.0.borrow_mut();
        if bench.script.capture_fail {
            return Err(fault_message("frame buffer timeout"));
        }
        bench.effects.push(Effect::CaptureTaken);
        Ok(())
    }

    fn poll_fault(&mut self) -> Option<FaultMessage> {
        let mut bench = self.0.borrow_mut();
        bench.fault_polls += 1;
        match bench.script.runtime_fault_on_poll {
            Some(poll) if bench.fault_polls >= poll => Some(fault_message("upload task panicked")),
            _ => None,
        }
    }
}

pub struct TestLog(Shared);

impl BootLog for TestLog {
    fn append(&mut self, message: &str) {
        self.0.borrow_mut().log.push(message.to_owned());
    }
}

pub struct TestBoard;

impl Board for TestBoard {
    type Clock = TestClock;
    type Reset = TestReset;
    type Counter = TestCounter;
    type Storage = TestStorage;
    type Config = TestConfigStore;
    type Network = TestRadio;
    type Time = TestTime;
    type Power = TestPower;
    type Collaborators = TestTasks;
    type Log = TestLog;
}

pub fn components(bench: &Shared) -> BoardComponents<TestBoard> {
    BoardComponents {
        clock: TestClock(bench.clone()),
        reset: TestReset(bench.clone()),
        counter: TestCounter(bench.clone()),
        storage: TestStorage(bench.clone()),
        config: TestConfigStore(bench.clone()),
        network: TestRadio(bench.clone()),
        time: TestTime(bench.clone()),
        power: TestPower(bench.clone()),
        collaborators: TestTasks(bench.clone()),
        log: TestLog(bench.clone()),
    }
}

pub fn orchestrator(bench: &Shared) -> BootOrchestrator<TestBoard> {
    BootOrchestrator::new(components(bench), BringupSettings::default())
}

/// Runs one full bring-up and returns the report plus the orchestrator for
/// journal inspection.
pub fn boot(bench: &Shared) -> (BootReport, BootOrchestrator<TestBoard>) {
    let mut orchestrator = orchestrator(bench);
    let report = embassy_futures::block_on(orchestrator.bring_up());
    (report, orchestrator)
}

pub fn elapsed(bench: &Shared) -> Duration {
    Duration::from_micros(bench.borrow().now.as_micros())
}
