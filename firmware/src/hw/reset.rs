use bringup_core::reset::{ResetCode, ResetReasonSource};
use esp_hal::rtc_cntl::reset_reason;
use esp_hal::system::Cpu;

/// Reset reason latched from the PRO CPU at startup.
pub struct EspResetReason {
    code: ResetCode,
}

impl EspResetReason {
    pub fn latch() -> Self {
        // Codes the ROM reports match `ResetCode` one to one.
        let code = reset_reason(Cpu::ProCpu).map_or(ResetCode(0), |reason| ResetCode(reason as u8));
        Self { code }
    }
}

impl ResetReasonSource for EspResetReason {
    fn read(&self) -> ResetCode {
        self.code
    }
}
