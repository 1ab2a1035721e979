use core::panic::PanicInfo;

use bringup_core::power::DEFAULT_RETREAT_DURATION;
use defmt::error;
use esp_hal::peripherals::LPWR;
use esp_hal::rtc_cntl::Rtc;
use esp_hal::rtc_cntl::sleep::TimerWakeupSource;

/// A panic is an unhandled fault: log it and take the standard retreat.
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    error!("PANIC: {}", defmt::Display2Format(info));
    error!(
        "Retreat: unhandled fault. Sleeping {} s",
        DEFAULT_RETREAT_DURATION.as_secs()
    );

    // SAFETY: nothing else runs once the panic handler is entered.
    let mut rtc = Rtc::new(unsafe { LPWR::steal() });
    let timer = TimerWakeupSource::new(DEFAULT_RETREAT_DURATION);
    rtc.sleep_deep(&[&timer]);
}
