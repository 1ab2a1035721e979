use bringup_core::counter::{BootCounterStore, RetainedSlot};

/// Check word and count. RTC fast memory keeps these through deep sleep and
/// software resets, and powers up with garbage.
#[esp_hal::ram(unstable(rtc_fast, persistent))]
static mut BOOT_SLOT: [u32; 2] = [0; 2];

/// Boot counter in RTC fast memory. Create one per boot.
pub struct RtcBootCounter(());

impl RtcBootCounter {
    pub const fn new() -> Self {
        Self(())
    }
}

impl BootCounterStore for RtcBootCounter {
    fn read(&self) -> Option<u32> {
        // SAFETY: single-core access during bring-up; the slot is only
        // touched through this type.
        let [check, value] = unsafe { (&raw const BOOT_SLOT).read_volatile() };
        RetainedSlot { check, value }.unseal()
    }

    fn write(&mut self, value: u32) {
        let slot = RetainedSlot::seal(value);
        // SAFETY: see `read`.
        unsafe { (&raw mut BOOT_SLOT).write_volatile([slot.check, slot.value]) };
    }
}
