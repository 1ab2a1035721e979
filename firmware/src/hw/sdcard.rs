//! SD card over SPI.
//!
//! Mounting moves the volume manager into [`CARD`]; the [`SdVolume`] handed
//! back is a token that the card is mounted. The config store, the boot log
//! and the capture task all reach the card through that static.

use core::cell::RefCell;

use bringup_core::config::{
    CameraConfig, ConfigError, ConfigParseError, ConfigParseErrorKind, ConfigStore,
};
use bringup_core::storage::{MountedVolume, StorageDevice, StorageError};
use defmt::{info, warn};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embedded_hal_bus::spi::ExclusiveDevice;
use embedded_sdmmc::{Mode, SdCard, TimeSource, Timestamp, VolumeIdx, VolumeManager};
use esp_hal::Blocking;
use esp_hal::delay::Delay;
use esp_hal::gpio::Output;
use esp_hal::spi::master::Spi;

pub type SdSpi = ExclusiveDevice<Spi<'static, Blocking>, Output<'static>, Delay>;
type Card = VolumeManager<SdCard<SdSpi, Delay>, FixedTime>;

/// Largest config file accepted on load. Hand-edited files carry comments,
/// so this is well above what `CameraConfig::render` produces.
const CONFIG_READ_LIMIT: usize = 2048;

static CARD: Mutex<CriticalSectionRawMutex, RefCell<Option<Card>>> =
    Mutex::new(RefCell::new(None));

/// Directory timestamps; the wall clock is not trusted this early in boot.
pub struct FixedTime;

impl TimeSource for FixedTime {
    fn get_timestamp(&self) -> Timestamp {
        // 2016-01-01 00:00:00
        Timestamp {
            year_since_1970: 46,
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}

#[derive(Debug)]
enum FileError {
    NotFound,
    TooLarge,
    Io,
}

fn with_card<R>(f: impl FnOnce(&mut Card) -> R) -> Option<R> {
    CARD.lock(|cell| cell.borrow_mut().as_mut().map(f))
}

fn read_file(name: &str, buf: &mut [u8]) -> Result<usize, FileError> {
    with_card(|card| {
        let mut volume = card
            .open_volume(VolumeIdx(0))
            .map_err(|_| FileError::Io)?;
        let mut root = volume.open_root_dir().map_err(|_| FileError::Io)?;
        let mut file = match root.open_file_in_dir(name, Mode::ReadOnly) {
            Ok(file) => file,
            Err(embedded_sdmmc::Error::NotFound) => return Err(FileError::NotFound),
            Err(_) => return Err(FileError::Io),
        };

        let mut total = 0;
        while total < buf.len() {
            let read = file.read(&mut buf[total..]).map_err(|_| FileError::Io)?;
            if read == 0 {
                break;
            }
            total += read;
        }
        let truncated = !file.is_eof();
        file.close().map_err(|_| FileError::Io)?;

        if truncated {
            Err(FileError::TooLarge)
        } else {
            Ok(total)
        }
    })
    .unwrap_or(Err(FileError::Io))
}

fn write_file(name: &str, mode: Mode, chunks: &[&[u8]]) -> Result<(), FileError> {
    with_card(|card| {
        let mut volume = card
            .open_volume(VolumeIdx(0))
            .map_err(|_| FileError::Io)?;
        let mut root = volume.open_root_dir().map_err(|_| FileError::Io)?;
        let mut file = root.open_file_in_dir(name, mode).map_err(|_| FileError::Io)?;
        for chunk in chunks {
            file.write(chunk).map_err(|_| FileError::Io)?;
        }
        file.close().map_err(|_| FileError::Io)
    })
    .unwrap_or(Err(FileError::Io))
}

/// Appends one line to `name`. Returns `false` when the card is not mounted
/// or the write failed.
pub fn append_line(name: &str, line: &str) -> bool {
    write_file(
        name,
        Mode::ReadWriteCreateOrAppend,
        &[line.as_bytes(), b"\n"],
    )
    .is_ok()
}

/// Proof that the card is mounted.
pub struct SdVolume {
    capacity_bytes: u64,
}

impl MountedVolume for SdVolume {
    fn capacity_bytes(&self) -> Option<u64> {
        Some(self.capacity_bytes)
    }
}

/// Card slot wired to SPI2. Can be mounted once per boot; `None` means the
/// SPI bus itself could not be set up.
pub struct SdCardStorage {
    device: Option<SdSpi>,
    delay: Delay,
}

impl SdCardStorage {
    pub fn new(device: Option<SdSpi>, delay: Delay) -> Self {
        Self { device, delay }
    }
}

impl StorageDevice for SdCardStorage {
    type Volume = SdVolume;

    fn mount(&mut self, mount_point: &str) -> Result<SdVolume, StorageError> {
        let device = self.device.take().ok_or(StorageError::Io)?;
        let card = SdCard::new(device, self.delay);
        let capacity_bytes = card.num_bytes().map_err(|err| {
            warn!("card init failed: {:?}", defmt::Debug2Format(&err));
            StorageError::NoMedia
        })?;

        let manager = VolumeManager::new(card, FixedTime);
        manager
            .open_volume(VolumeIdx(0))
            .map_err(|_| StorageError::Unformatted)?
            .close()
            .map_err(|_| StorageError::Io)?;

        CARD.lock(|cell| cell.replace(Some(manager)));
        info!("card mounted at {=str}", mount_point);
        Ok(SdVolume { capacity_bytes })
    }
}

/// Config file in the card's root directory.
pub struct SdConfigStore {
    file: &'static str,
    defaults: CameraConfig,
}

impl SdConfigStore {
    pub fn new(file: &'static str, defaults: CameraConfig) -> Self {
        Self { file, defaults }
    }
}

impl ConfigStore<SdVolume> for SdConfigStore {
    fn load(&mut self, _: &mut SdVolume) -> Result<Option<CameraConfig>, ConfigError> {
        let mut buf = [0u8; CONFIG_READ_LIMIT];
        let len = match read_file(self.file, &mut buf) {
            Ok(len) => len,
            Err(FileError::NotFound) => return Ok(None),
            Err(FileError::TooLarge) => return Err(ConfigError::TooLarge),
            Err(FileError::Io) => return Err(ConfigError::Io),
        };
        let text = core::str::from_utf8(&buf[..len]).map_err(|_| {
            ConfigError::Malformed(ConfigParseError::new(1, ConfigParseErrorKind::Syntax))
        })?;
        Ok(Some(CameraConfig::parse(text)?))
    }

    fn save(&mut self, _: &mut SdVolume, config: &CameraConfig) -> Result<(), ConfigError> {
        let rendered = config.render().map_err(|_| ConfigError::TooLarge)?;
        write_file(
            self.file,
            Mode::ReadWriteCreateOrTruncate,
            &[rendered.as_bytes()],
        )
        .map_err(|_| ConfigError::Io)
    }

    fn defaults(&self) -> CameraConfig {
        self.defaults.clone()
    }
}
