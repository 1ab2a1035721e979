use bringup_core::config::CameraConfig;
use bringup_core::journal::DEFAULT_LOG_FILE;
use bringup_core::orchestrator::{Collaborators, FaultMessage, Launch, fault_message};
use core::fmt::Write as _;
use defmt::info;
use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::Ticker;
use heapless::String;

use crate::hw::clock::ticks;
use crate::hw::sdcard::{self, SdVolume};

/// Fault raised by a running task, picked up by the loop supervisor.
static FAULTS: Signal<CriticalSectionRawMutex, FaultMessage> = Signal::new();

/// Capture and upload tasks.
pub struct CameraTasks {
    spawner: Spawner,
}

impl CameraTasks {
    pub fn new(spawner: Spawner) -> Self {
        Self { spawner }
    }
}

impl Collaborators<SdVolume> for CameraTasks {
    fn start_tasks(&mut self, launch: Launch<SdVolume>) -> Result<(), FaultMessage> {
        info!(
            "starting capture task, time valid: {}",
            launch.time_valid
        );
        self.spawner
            .spawn(capture_task(launch))
            .map_err(|_| fault_message("capture task spawn failed"))
    }

    fn capture_before_sleep(
        &mut self,
        _: &mut SdVolume,
        config: &CameraConfig,
    ) -> Result<(), FaultMessage> {
        record_frame(0, config)
    }

    fn poll_fault(&mut self) -> Option<FaultMessage> {
        FAULTS.try_take()
    }
}

// Capture stand-in: the camera driver lives outside this crate, so each due
// frame is recorded as a line in the log file.
fn record_frame(index: u32, config: &CameraConfig) -> Result<(), FaultMessage> {
    let mut line: String<64> = String::new();
    let _ = write!(
        line,
        "frame {index} due, upload {}",
        config.upload_mode.as_str()
    );
    if sdcard::append_line(DEFAULT_LOG_FILE, &line) {
        Ok(())
    } else {
        Err(fault_message("card write failed"))
    }
}

#[embassy_executor::task]
async fn capture_task(launch: Launch<SdVolume>) {
    // The volume token stays alive for as long as the task writes to the card.
    let Launch {
        volume: _volume,
        config,
        ..
    } = launch;
    let mut ticker = Ticker::every(ticks(config.capture_interval));
    let mut index = 0u32;

    loop {
        ticker.next().await;
        index = index.wrapping_add(1);
        if let Err(message) = record_frame(index, &config) {
            FAULTS.signal(message);
            break;
        }
    }
}
