//! Reset-cause classification.
//!
//! The chip latches a numeric reason for the most recent reset. Bring-up only
//! cares about a handful of them, so the raw [`ResetCode`] is folded into the
//! small [`ResetCause`] taxonomy that drives the anti-loop guard and the
//! sleep-resume branch.

use core::fmt;

/// Raw reset reason as latched by the RTC controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ResetCode(pub u8);

impl ResetCode {
    pub const POWER_ON: ResetCode = ResetCode(1);
    pub const SOFTWARE_SYSTEM: ResetCode = ResetCode(3);
    pub const LEGACY_WATCHDOG: ResetCode = ResetCode(4);
    pub const DEEP_SLEEP: ResetCode = ResetCode(5);
    pub const SDIO: ResetCode = ResetCode(6);
    pub const TIMER_GROUP0_WATCHDOG: ResetCode = ResetCode(7);
    pub const TIMER_GROUP1_WATCHDOG: ResetCode = ResetCode(8);
    pub const RTC_WATCHDOG_SYSTEM: ResetCode = ResetCode(9);
    pub const INTRUSION: ResetCode = ResetCode(10);
    pub const TIMER_GROUP_WATCHDOG_CPU: ResetCode = ResetCode(11);
    pub const SOFTWARE_CPU: ResetCode = ResetCode(12);
    pub const RTC_WATCHDOG_CPU: ResetCode = ResetCode(13);
    pub const APP_CPU_BY_PRO_CPU: ResetCode = ResetCode(14);
    pub const BROWNOUT: ResetCode = ResetCode(15);
    pub const RTC_WATCHDOG_RTC: ResetCode = ResetCode(16);

    /// Symbolic name used in the boot log.
    pub const fn name(self) -> &'static str {
        match self.0 {
            1 => "POWERON_RESET",
            3 => "SW_RESET",
            4 => "OWDT_RESET",
            5 => "DEEPSLEEP_RESET",
            6 => "SDIO_RESET",
            7 => "TG0WDT_SYS_RESET",
            8 => "TG1WDT_SYS_RESET",
            9 => "RTCWDT_SYS_RESET",
            10 => "INTRUSION_RESET",
            11 => "TGWDT_CPU_RESET",
            12 => "SW_CPU_RESET",
            13 => "RTCWDT_CPU_RESET",
            14 => "EXT_CPU_RESET",
            15 => "RTCWDT_BROWN_OUT_RESET",
            16 => "RTCWDT_RTC_RESET",
            _ => "NO_MEAN",
        }
    }
}

impl fmt::Display for ResetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

/// Bring-up's view of why the device restarted.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ResetCause {
    PowerOn,
    SoftwareReset,
    Brownout,
    DeepSleepWake,
    Other,
}

impl ResetCause {
    /// Returns `true` for resets that point at an unstable supply or an
    /// unhandled fault, which the anti-loop guard refuses to retry immediately.
    pub const fn is_unstable(self) -> bool {
        matches!(self, ResetCause::SoftwareReset | ResetCause::Brownout)
    }

    /// Short lowercase label used in logs and the emulator.
    pub const fn label(self) -> &'static str {
        match self {
            ResetCause::PowerOn => "power-on",
            ResetCause::SoftwareReset => "software",
            ResetCause::Brownout => "brownout",
            ResetCause::DeepSleepWake => "deep-sleep",
            ResetCause::Other => "other",
        }
    }
}

impl From<ResetCode> for ResetCause {
    fn from(code: ResetCode) -> Self {
        match code {
            ResetCode::POWER_ON => ResetCause::PowerOn,
            ResetCode::DEEP_SLEEP => ResetCause::DeepSleepWake,
            ResetCode::SOFTWARE_CPU => ResetCause::SoftwareReset,
            ResetCode::BROWNOUT => ResetCause::Brownout,
            _ => ResetCause::Other,
        }
    }
}

impl fmt::Display for ResetCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Read-only access to the hardware reset-reason register.
pub trait ResetReasonSource {
    /// Reads the latched reason for the current boot.
    fn read(&self) -> ResetCode;
}

/// Raw code plus the cause derived from it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ResetClassification {
    pub code: ResetCode,
    pub cause: ResetCause,
}

/// Reads the reset register and maps it into the bring-up taxonomy.
pub fn classify<S>(source: &S) -> ResetClassification
where
    S: ResetReasonSource + ?Sized,
{
    let code = source.read();
    ResetClassification {
        code,
        cause: ResetCause::from(code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedReason(ResetCode);

    impl ResetReasonSource for FixedReason {
        fn read(&self) -> ResetCode {
            self.0
        }
    }

    #[test]
    fn guarded_codes_map_to_unstable_causes() {
        let software = classify(&FixedReason(ResetCode(12)));
        assert_eq!(software.cause, ResetCause::SoftwareReset);
        assert!(software.cause.is_unstable());

        let brownout = classify(&FixedReason(ResetCode(15)));
        assert_eq!(brownout.cause, ResetCause::Brownout);
        assert!(brownout.cause.is_unstable());
    }

    #[test]
    fn wake_and_power_on_are_stable() {
        assert_eq!(
            classify(&FixedReason(ResetCode::POWER_ON)).cause,
            ResetCause::PowerOn
        );
        assert_eq!(
            classify(&FixedReason(ResetCode::DEEP_SLEEP)).cause,
            ResetCause::DeepSleepWake
        );
        assert!(!ResetCause::PowerOn.is_unstable());
        assert!(!ResetCause::DeepSleepWake.is_unstable());
    }

    #[test]
    fn system_software_reset_and_watchdogs_fall_into_other() {
        for raw in [3u8, 4, 7, 8, 9, 13, 16, 0, 42] {
            let classification = classify(&FixedReason(ResetCode(raw)));
            assert_eq!(classification.cause, ResetCause::Other, "code {raw}");
            assert!(!classification.cause.is_unstable());
        }
    }

    #[test]
    fn unknown_codes_have_placeholder_name() {
        assert_eq!(ResetCode(0).name(), "NO_MEAN");
        assert_eq!(ResetCode::BROWNOUT.name(), "RTCWDT_BROWN_OUT_RESET");
    }
}
