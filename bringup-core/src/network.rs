//! Network acquisition with access-point fallback.
//!
//! Client (station) association is always tried first because normal operation
//! needs outbound connectivity. If it does not come up within its timeout the
//! radio is reconfigured as a standalone access point, which only exists so an
//! operator can reach the device for maintenance.

use core::fmt;
use core::time::Duration;

use crate::clock::{Clock, poll_until};
use crate::config::WifiCredentials;

/// Default time allowed for client association.
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default time allowed for the access point to come up.
pub const DEFAULT_ACCESS_POINT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between link-state checks.
pub const DEFAULT_LINK_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Network name advertised in access-point mode.
pub const DEFAULT_ACCESS_POINT_SSID: &str = "tlc32";

/// Access-point passphrase; empty means an open network.
pub const DEFAULT_ACCESS_POINT_PASSWORD: &str = "";

/// Reasons the radio driver can refuse to start an association.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NetworkError {
    /// The driver rejected the supplied configuration.
    InvalidConfiguration,
    /// The radio did not respond.
    Radio,
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::InvalidConfiguration => f.write_str("configuration rejected"),
            NetworkError::Radio => f.write_str("radio not responding"),
        }
    }
}

/// Identity advertised when running as an access point.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AccessPointIdentity {
    pub ssid: &'static str,
    pub password: &'static str,
}

impl Default for AccessPointIdentity {
    fn default() -> Self {
        Self {
            ssid: DEFAULT_ACCESS_POINT_SSID,
            password: DEFAULT_ACCESS_POINT_PASSWORD,
        }
    }
}

/// Radio driver as seen by bring-up.
pub trait NetworkInterface {
    /// Configures client mode and starts associating with `credentials`.
    fn begin_client(&mut self, credentials: &WifiCredentials) -> Result<(), NetworkError>;

    /// Configures standalone access-point mode.
    fn begin_access_point(&mut self, identity: &AccessPointIdentity) -> Result<(), NetworkError>;

    /// Returns `true` once the most recently started mode is usable.
    fn is_up(&mut self) -> bool;

    /// Abandons the current mode before switching to another one.
    fn shutdown(&mut self);
}

/// Association state tracked in the boot context.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum NetworkMode {
    #[default]
    Unassociated,
    Client,
    AccessPoint,
}

impl NetworkMode {
    /// Returns `true` when the mode may move from `self` to `next` within one boot.
    pub const fn can_transition_to(self, next: NetworkMode) -> bool {
        matches!(
            (self, next),
            (NetworkMode::Unassociated, NetworkMode::Client | NetworkMode::AccessPoint)
                | (NetworkMode::Client, NetworkMode::Client)
                | (NetworkMode::AccessPoint, NetworkMode::AccessPoint)
        )
    }

    pub const fn is_associated(self) -> bool {
        !matches!(self, NetworkMode::Unassociated)
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkMode::Unassociated => f.write_str("unassociated"),
            NetworkMode::Client => f.write_str("client"),
            NetworkMode::AccessPoint => f.write_str("access-point"),
        }
    }
}

/// Result of [`acquire`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NetworkOutcome {
    Client,
    AccessPoint,
    Failed,
}

impl NetworkOutcome {
    /// Mode the device ends up in, or `None` when acquisition failed.
    pub const fn mode(self) -> Option<NetworkMode> {
        match self {
            NetworkOutcome::Client => Some(NetworkMode::Client),
            NetworkOutcome::AccessPoint => Some(NetworkMode::AccessPoint),
            NetworkOutcome::Failed => None,
        }
    }
}

/// Outcome plus the time spent on each attempt.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NetworkReport {
    pub outcome: NetworkOutcome,
    pub client_elapsed: Duration,
    /// `None` when the access point was never tried.
    pub access_point_elapsed: Option<Duration>,
    pub client_error: Option<NetworkError>,
    pub access_point_error: Option<NetworkError>,
}

/// Timeouts and identity used by [`acquire`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AcquisitionPlan {
    pub client_timeout: Duration,
    pub access_point_timeout: Duration,
    pub poll_interval: Duration,
    pub access_point: AccessPointIdentity,
}

impl AcquisitionPlan {
    pub const fn new(client_timeout: Duration, access_point_timeout: Duration) -> Self {
        Self {
            client_timeout,
            access_point_timeout,
            poll_interval: DEFAULT_LINK_POLL_INTERVAL,
            access_point: AccessPointIdentity {
                ssid: DEFAULT_ACCESS_POINT_SSID,
                password: DEFAULT_ACCESS_POINT_PASSWORD,
            },
        }
    }
}

impl Default for AcquisitionPlan {
    fn default() -> Self {
        Self::new(DEFAULT_CLIENT_TIMEOUT, DEFAULT_ACCESS_POINT_TIMEOUT)
    }
}

/// Outcome of a single attempt, consumed by [`acquire`] and by callers that
/// want to journal each attempt.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AttemptResult {
    pub up: bool,
    pub elapsed: Duration,
    pub error: Option<NetworkError>,
}

/// Starts client mode and waits up to `plan.client_timeout` for association.
pub async fn attempt_client<N, C>(
    network: &mut N,
    clock: &mut C,
    credentials: &WifiCredentials,
    plan: &AcquisitionPlan,
) -> AttemptResult
where
    N: NetworkInterface + ?Sized,
    C: Clock,
{
    if let Err(error) = network.begin_client(credentials) {
        return AttemptResult {
            up: false,
            elapsed: Duration::ZERO,
            error: Some(error),
        };
    }
    let outcome = poll_until(clock, plan.client_timeout, plan.poll_interval, || {
        network.is_up()
    })
    .await;
    AttemptResult {
        up: outcome.is_ready(),
        elapsed: outcome.elapsed(),
        error: None,
    }
}

/// Starts access-point mode and waits up to `plan.access_point_timeout`.
pub async fn attempt_access_point<N, C>(
    network: &mut N,
    clock: &mut C,
    plan: &AcquisitionPlan,
) -> AttemptResult
where
    N: NetworkInterface + ?Sized,
    C: Clock,
{
    if let Err(error) = network.begin_access_point(&plan.access_point) {
        return AttemptResult {
            up: false,
            elapsed: Duration::ZERO,
            error: Some(error),
        };
    }
    let outcome = poll_until(clock, plan.access_point_timeout, plan.poll_interval, || {
        network.is_up()
    })
    .await;
    AttemptResult {
        up: outcome.is_ready(),
        elapsed: outcome.elapsed(),
        error: None,
    }
}

/// Client first, then access point. A driver error on `begin_*` counts as a
/// failed attempt.
pub async fn acquire<N, C>(
    network: &mut N,
    clock: &mut C,
    credentials: &WifiCredentials,
    plan: &AcquisitionPlan,
) -> NetworkReport
where
    N: NetworkInterface + ?Sized,
    C: Clock,
{
    let client = attempt_client(network, clock, credentials, plan).await;
    if client.up {
        return NetworkReport {
            outcome: NetworkOutcome::Client,
            client_elapsed: client.elapsed,
            access_point_elapsed: None,
            client_error: None,
            access_point_error: None,
        };
    }

    network.shutdown();
    let access_point = attempt_access_point(network, clock, plan).await;
    let outcome = if access_point.up {
        NetworkOutcome::AccessPoint
    } else {
        network.shutdown();
        NetworkOutcome::Failed
    };

    NetworkReport {
        outcome,
        client_elapsed: client.elapsed,
        access_point_elapsed: Some(access_point.elapsed),
        client_error: client.error,
        access_point_error: access_point.error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockClock;
    use embassy_futures::block_on;

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    enum Started {
        Client,
        AccessPoint,
    }

    /// `None` never comes up; `Some(n)` comes up on the n-th `is_up` check.
    struct ScriptedRadio {
        client_up_after: Option<u32>,
        access_point_up_after: Option<u32>,
        reject_client: bool,
        started: heapless::Vec<Started, 4>,
        checks: u32,
        shutdowns: u32,
    }

    impl ScriptedRadio {
        fn new(client_up_after: Option<u32>, access_point_up_after: Option<u32>) -> Self {
            Self {
                client_up_after,
                access_point_up_after,
                reject_client: false,
                started: heapless::Vec::new(),
                checks: 0,
                shutdowns: 0,
            }
        }
    }

    impl NetworkInterface for ScriptedRadio {
        fn begin_client(&mut self, _: &WifiCredentials) -> Result<(), NetworkError> {
            self.started.push(Started::Client).unwrap();
            self.checks = 0;
            if self.reject_client {
                Err(NetworkError::InvalidConfiguration)
            } else {
                Ok(())
            }
        }

        fn begin_access_point(&mut self, identity: &AccessPointIdentity) -> Result<(), NetworkError> {
            assert_eq!(identity.ssid, "tlc32");
            assert!(identity.password.is_empty());
            self.started.push(Started::AccessPoint).unwrap();
            self.checks = 0;
            Ok(())
        }

        fn is_up(&mut self) -> bool {
            self.checks += 1;
            let target = match self.started.last() {
                Some(Started::Client) => self.client_up_after,
                Some(Started::AccessPoint) => self.access_point_up_after,
                None => None,
            };
            target.is_some_and(|after| self.checks >= after)
        }

        fn shutdown(&mut self) {
            self.shutdowns += 1;
        }
    }

    fn credentials() -> WifiCredentials {
        WifiCredentials::new("studio", "hunter22").unwrap()
    }

    #[test]
    fn client_success_skips_access_point() {
        let mut radio = ScriptedRadio::new(Some(1), Some(1));
        let mut clock = MockClock::new();
        let report = block_on(acquire(
            &mut radio,
            &mut clock,
            &credentials(),
            &AcquisitionPlan::default(),
        ));

        assert_eq!(report.outcome, NetworkOutcome::Client);
        assert_eq!(report.access_point_elapsed, None);
        assert_eq!(radio.started.as_slice(), &[Started::Client]);
        assert_eq!(radio.shutdowns, 0);
    }

    #[test]
    fn client_timeout_falls_back_to_access_point() {
        let mut radio = ScriptedRadio::new(None, Some(3));
        let mut clock = MockClock::new();
        let report = block_on(acquire(
            &mut radio,
            &mut clock,
            &credentials(),
            &AcquisitionPlan::default(),
        ));

        assert_eq!(report.outcome, NetworkOutcome::AccessPoint);
        assert_eq!(report.client_elapsed, DEFAULT_CLIENT_TIMEOUT);
        assert_eq!(report.access_point_elapsed, Some(Duration::from_millis(1_000)));
        assert_eq!(
            radio.started.as_slice(),
            &[Started::Client, Started::AccessPoint]
        );
        assert_eq!(radio.shutdowns, 1);
    }

    #[test]
    fn both_attempts_failing_is_bounded_by_both_timeouts() {
        let mut radio = ScriptedRadio::new(None, None);
        let mut clock = MockClock::new();
        let report = block_on(acquire(
            &mut radio,
            &mut clock,
            &credentials(),
            &AcquisitionPlan::default(),
        ));

        assert_eq!(report.outcome, NetworkOutcome::Failed);
        assert_eq!(report.outcome.mode(), None);
        assert_eq!(
            clock.elapsed(),
            DEFAULT_CLIENT_TIMEOUT + DEFAULT_ACCESS_POINT_TIMEOUT
        );
    }

    #[test]
    fn rejected_client_configuration_counts_as_failed_attempt() {
        let mut radio = ScriptedRadio::new(Some(1), Some(1));
        radio.reject_client = true;
        let mut clock = MockClock::new();
        let report = block_on(acquire(
            &mut radio,
            &mut clock,
            &credentials(),
            &AcquisitionPlan::default(),
        ));

        assert_eq!(report.outcome, NetworkOutcome::AccessPoint);
        assert_eq!(report.client_error, Some(NetworkError::InvalidConfiguration));
        assert_eq!(report.client_elapsed, Duration::ZERO);
    }

    #[test]
    fn empty_credentials_still_try_client_first() {
        let mut radio = ScriptedRadio::new(None, Some(1));
        let mut clock = MockClock::new();
        let report = block_on(acquire(
            &mut radio,
            &mut clock,
            &WifiCredentials::default(),
            &AcquisitionPlan::new(Duration::from_secs(1), Duration::from_secs(1)),
        ));

        assert_eq!(radio.started.first(), Some(&Started::Client));
        assert_eq!(report.outcome, NetworkOutcome::AccessPoint);
    }

    #[test]
    fn mode_never_moves_from_access_point_to_client() {
        assert!(NetworkMode::Unassociated.can_transition_to(NetworkMode::Client));
        assert!(NetworkMode::Unassociated.can_transition_to(NetworkMode::AccessPoint));
        assert!(NetworkMode::Client.can_transition_to(NetworkMode::Client));
        assert!(!NetworkMode::AccessPoint.can_transition_to(NetworkMode::Client));
        assert!(!NetworkMode::Client.can_transition_to(NetworkMode::AccessPoint));
        assert!(!NetworkMode::Client.can_transition_to(NetworkMode::Unassociated));
    }
}
