use core::time::Duration;

use bringup_core::power::{FrequencyBounds, PowerControl, PowerError};
use defmt::info;
use esp_hal::rtc_cntl::Rtc;
use esp_hal::rtc_cntl::sleep::TimerWakeupSource;

/// CPU clock steps the ESP32 PLL supports.
const SUPPORTED_MHZ: [u16; 3] = [80, 160, 240];

/// Deep sleep through the RTC timer. The CPU clock is fixed at init, so
/// frequency bounds are only checked against the PLL steps.
pub struct EspPower {
    rtc: Rtc<'static>,
}

impl EspPower {
    pub fn new(rtc: Rtc<'static>) -> Self {
        Self { rtc }
    }
}

impl PowerControl for EspPower {
    fn deep_sleep(&mut self, duration: Duration) {
        info!("deep sleep for {} s", duration.as_secs());
        let timer = TimerWakeupSource::new(duration);
        self.rtc.sleep_deep(&[&timer]);
    }

    /// Validates `bounds` against the PLL steps and logs them. Nothing is
    /// applied: the CPU stays at the clock chosen in `esp_hal::init` and
    /// light sleep is not enabled.
    fn configure_frequency_scaling(&mut self, bounds: FrequencyBounds) -> Result<(), PowerError> {
        if !SUPPORTED_MHZ.contains(&bounds.min_mhz) || !SUPPORTED_MHZ.contains(&bounds.max_mhz) {
            return Err(PowerError::Unsupported);
        }
        info!(
            "cpu clock {}-{} MHz, light sleep {}",
            bounds.min_mhz, bounds.max_mhz, bounds.light_sleep
        );
        Ok(())
    }
}
