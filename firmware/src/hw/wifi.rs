use bringup_core::config::WifiCredentials;
use bringup_core::network::{AccessPointIdentity, NetworkError, NetworkInterface};
use defmt::warn;
use esp_radio::wifi::{AccessPointConfig, AuthMethod, ClientConfig, ModeConfig, WifiController};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum RadioMode {
    Client,
    AccessPoint,
}

/// Wi-Fi radio driven through `esp-radio`. Without a controller (radio init
/// failed) every attempt fails with [`NetworkError::Radio`].
pub struct EspWifi {
    controller: Option<WifiController<'static>>,
    mode: Option<RadioMode>,
}

impl EspWifi {
    pub fn new(controller: Option<WifiController<'static>>) -> Self {
        Self {
            controller,
            mode: None,
        }
    }

    fn controller(&mut self) -> Result<&mut WifiController<'static>, NetworkError> {
        self.controller.as_mut().ok_or(NetworkError::Radio)
    }

    fn apply(&mut self, config: &ModeConfig, mode: RadioMode) -> Result<(), NetworkError> {
        let controller = self.controller()?;
        controller.set_config(config).map_err(|err| {
            warn!("wifi config rejected: {:?}", defmt::Debug2Format(&err));
            NetworkError::InvalidConfiguration
        })?;
        controller.start().map_err(|err| {
            warn!("wifi start failed: {:?}", defmt::Debug2Format(&err));
            NetworkError::Radio
        })?;
        self.mode = Some(mode);
        Ok(())
    }
}

impl NetworkInterface for EspWifi {
    fn begin_client(&mut self, credentials: &WifiCredentials) -> Result<(), NetworkError> {
        if credentials.ssid.is_empty() {
            return Err(NetworkError::InvalidConfiguration);
        }
        let config = ModeConfig::Client(
            ClientConfig::default()
                .with_ssid(credentials.ssid.as_str().into())
                .with_password(credentials.password.as_str().into()),
        );
        self.apply(&config, RadioMode::Client)?;
        self.controller()?.connect().map_err(|err| {
            warn!("wifi connect failed: {:?}", defmt::Debug2Format(&err));
            NetworkError::Radio
        })
    }

    fn begin_access_point(&mut self, identity: &AccessPointIdentity) -> Result<(), NetworkError> {
        let auth_method = if identity.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::Wpa2Personal
        };
        let config = ModeConfig::AccessPoint(
            AccessPointConfig::default()
                .with_ssid(identity.ssid.into())
                .with_password(identity.password.into())
                .with_auth_method(auth_method),
        );
        self.apply(&config, RadioMode::AccessPoint)
    }

    fn is_up(&mut self) -> bool {
        let Some(controller) = self.controller.as_ref() else {
            return false;
        };
        match self.mode {
            Some(RadioMode::Client) => matches!(controller.is_connected(), Ok(true)),
            Some(RadioMode::AccessPoint) => matches!(controller.is_started(), Ok(true)),
            None => false,
        }
    }

    fn shutdown(&mut self) {
        if self.mode.take().is_some()
            && let Some(controller) = self.controller.as_mut()
        {
            let _ = controller.stop();
        }
    }
}
