use bringup_core::journal::BootLog;
use defmt::info;

use super::sdcard;

/// Mirrors bring-up log lines to defmt and, once the card is mounted, to the
/// log file on it.
pub struct FirmwareLog {
    file: &'static str,
}

impl FirmwareLog {
    pub const fn new(file: &'static str) -> Self {
        Self { file }
    }
}

impl BootLog for FirmwareLog {
    fn append(&mut self, message: &str) {
        info!("{=str}", message);
        let _ = sdcard::append_line(self.file, message);
    }
}
