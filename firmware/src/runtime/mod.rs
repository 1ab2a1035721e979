use bringup_core::config::{CameraConfig, UploadMode, UploadTarget, WifiCredentials};
use bringup_core::orchestrator::{Board, BoardComponents, BootOrchestrator, BringupSettings};
use defmt::{error, info, warn};
use embassy_executor::Spawner;
use embassy_net::{Runner, StackResources};
use embassy_time::Timer;
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::clock::CpuClock;
use esp_hal::delay::Delay;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::rtc_cntl::Rtc;
use esp_hal::spi::Mode as SpiMode;
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use esp_println as _;
use esp_radio::wifi::WifiDevice;
use static_cell::StaticCell;

use crate::hw::clock::EmbassyClock;
use crate::hw::log::FirmwareLog;
use crate::hw::power::EspPower;
use crate::hw::reset::EspResetReason;
use crate::hw::retained::RtcBootCounter;
use crate::hw::sdcard::{SdCardStorage, SdConfigStore};
use crate::hw::sntp::{SntpTimeSource, sntp_task};
use crate::hw::wifi::EspWifi;

use collaborators::CameraTasks;

mod collaborators;

esp_bootloader_esp_idf::esp_app_desc!();

/// Card init clock; SD cards must be probed at or below 400 kHz.
const SD_SPI_KHZ: u32 = 400;
const NET_SEED: u64 = 0x7C32_5EED_0B00_7001;

static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
static NET_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();

struct EspBoard;

impl Board for EspBoard {
    type Clock = EmbassyClock;
    type Reset = EspResetReason;
    type Counter = RtcBootCounter;
    type Storage = SdCardStorage;
    type Config = SdConfigStore;
    type Network = EspWifi;
    type Time = SntpTimeSource;
    type Power = EspPower;
    type Collaborators = CameraTasks;
    type Log = FirmwareLog;
}

/// Build-time defaults, written to the card when it holds no config yet.
fn build_defaults() -> CameraConfig {
    let mut config = CameraConfig::default();
    match WifiCredentials::new(
        option_env!("TLC32_WIFI_SSID").unwrap_or(""),
        option_env!("TLC32_WIFI_PASSWORD").unwrap_or(""),
    ) {
        Ok(wifi) => config.wifi = wifi,
        Err(_) => warn!("build-time wifi credentials too long, ignored"),
    }
    let host = option_env!("TLC32_UPLOAD_HOST").unwrap_or("");
    match UploadTarget::new(
        host,
        option_env!("TLC32_UPLOAD_USER").unwrap_or(""),
        option_env!("TLC32_UPLOAD_PASSWORD").unwrap_or(""),
    ) {
        Ok(upload) => {
            config.upload = upload;
            if !host.is_empty() {
                config.upload_mode = UploadMode::On;
            }
        }
        Err(_) => warn!("build-time upload target too long, ignored"),
    }
    config
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) -> ! {
    runner.run().await
}

#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    let peripherals = esp_hal::init(esp_hal::Config::default().with_cpu_clock(CpuClock::max()));
    let reset = EspResetReason::latch();

    // esp-radio needs a heap.
    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 72 * 1024);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let delay = Delay::new();
    let sd_cs = Output::new(peripherals.GPIO13, Level::High, OutputConfig::default());
    let sd_device = Spi::new(
        peripherals.SPI2,
        SpiConfig::default()
            .with_frequency(Rate::from_khz(SD_SPI_KHZ))
            .with_mode(SpiMode::_0),
    )
    .ok()
    .map(|spi| {
        spi.with_sck(peripherals.GPIO14)
            .with_mosi(peripherals.GPIO15)
            .with_miso(peripherals.GPIO2)
    })
    .and_then(|bus| ExclusiveDevice::new(bus, sd_cs, delay).ok());
    if sd_device.is_none() {
        error!("SD SPI bus setup failed");
    }

    let controller = match esp_radio::init() {
        Ok(radio) => {
            let radio = RADIO.init(radio);
            match esp_radio::wifi::new(radio, peripherals.WIFI, esp_radio::wifi::Config::default())
            {
                Ok((controller, interfaces)) => {
                    let (stack, runner) = embassy_net::new(
                        interfaces.sta,
                        embassy_net::Config::dhcpv4(Default::default()),
                        NET_RESOURCES.init(StackResources::new()),
                        NET_SEED,
                    );
                    if spawner.spawn(net_task(runner)).is_err()
                        || spawner.spawn(sntp_task(stack)).is_err()
                    {
                        error!("network tasks could not be spawned");
                    }
                    Some(controller)
                }
                Err(err) => {
                    error!("wifi init failed: {:?}", defmt::Debug2Format(&err));
                    None
                }
            }
        }
        Err(err) => {
            error!("radio init failed: {:?}", defmt::Debug2Format(&err));
            None
        }
    };

    let settings = BringupSettings::default();
    let components = BoardComponents::<EspBoard> {
        clock: EmbassyClock,
        reset,
        counter: RtcBootCounter::new(),
        storage: SdCardStorage::new(sd_device, delay),
        config: SdConfigStore::new(settings.config_file, build_defaults()),
        network: EspWifi::new(controller),
        time: SntpTimeSource,
        power: EspPower::new(Rtc::new(peripherals.LPWR)),
        collaborators: CameraTasks::new(spawner),
        log: FirmwareLog::new(settings.log_file),
    };

    let mut orchestrator = BootOrchestrator::new(components, settings);
    let report = orchestrator.bring_up().await;
    info!(
        "bring-up finished after boot {}: {}",
        report.context.boot_count,
        report.outcome().map(defmt::Display2Format)
    );

    match orchestrator.into_supervisor() {
        Ok(mut supervisor) => {
            let plan = supervisor.run().await;
            error!(
                "retreat returned: {}",
                defmt::Display2Format(&plan.reason)
            );
        }
        Err(_) => error!("deep sleep returned"),
    }

    loop {
        Timer::after_secs(1).await;
    }
}
