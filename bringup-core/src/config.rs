//! Camera configuration record and its on-volume text format.
//!
//! The config file is collaborator-owned data, but bring-up needs the Wi-Fi
//! credentials from it and writes defaults back when it is missing, so the
//! format lives here. One `key = value` pair per line; blank lines and lines
//! starting with `#` are ignored.

use core::fmt::{self, Write as _};
use core::time::Duration;

use heapless::String;
use winnow::ascii::space0;
use winnow::combinator::separated_pair;
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::{rest, take_while};

/// File name of the camera configuration on the volume root.
pub const DEFAULT_CONFIG_FILE: &str = "TLC32.CFG";
/// Capture interval used when the file does not set one.
pub const DEFAULT_CAPTURE_INTERVAL: Duration = Duration::from_secs(300);

pub const MAX_SSID_LEN: usize = 32;
pub const MAX_PASSWORD_LEN: usize = 64;
pub const MAX_HOST_LEN: usize = 64;
pub const MAX_USER_LEN: usize = 32;
/// Upper bound on the rendered config file.
pub const MAX_RENDERED_CONFIG: usize = 512;

/// Credentials for client-mode association.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WifiCredentials {
    pub ssid: String<MAX_SSID_LEN>,
    pub password: String<MAX_PASSWORD_LEN>,
}

impl WifiCredentials {
    /// Builds credentials, rejecting values that exceed the field limits.
    pub fn new(ssid: &str, password: &str) -> Result<Self, ConfigParseErrorKind> {
        Ok(Self {
            ssid: bounded(ssid)?,
            password: bounded(password)?,
        })
    }

    /// Returns `true` when no SSID is configured.
    pub fn is_empty(&self) -> bool {
        self.ssid.is_empty()
    }
}

/// Remote endpoint for image uploads.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UploadTarget {
    pub host: String<MAX_HOST_LEN>,
    pub user: String<MAX_USER_LEN>,
    pub password: String<MAX_PASSWORD_LEN>,
}

impl UploadTarget {
    /// Builds an upload target, rejecting values that exceed the field limits.
    pub fn new(host: &str, user: &str, password: &str) -> Result<Self, ConfigParseErrorKind> {
        Ok(Self {
            host: bounded(host)?,
            user: bounded(user)?,
            password: bounded(password)?,
        })
    }
}

/// Whether captured images are pushed to the upload target.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum UploadMode {
    #[default]
    Off,
    On,
}

impl UploadMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            UploadMode::Off => "off",
            UploadMode::On => "on",
        }
    }
}

/// Camera configuration as stored on the volume.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CameraConfig {
    pub wifi: WifiCredentials,
    pub upload: UploadTarget,
    pub upload_mode: UploadMode,
    pub capture_interval: Duration,
    /// Sleep between captures instead of staying online.
    pub sleepy: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            wifi: WifiCredentials::default(),
            upload: UploadTarget::default(),
            upload_mode: UploadMode::Off,
            capture_interval: DEFAULT_CAPTURE_INTERVAL,
            sleepy: false,
        }
    }
}

impl CameraConfig {
    /// Parses the line-oriented config format.
    pub fn parse(text: &str) -> Result<Self, ConfigParseError> {
        let mut config = CameraConfig::default();

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = entry
                .parse(line)
                .map_err(|_| ConfigParseError::new(line_no, ConfigParseErrorKind::Syntax))?;
            config
                .apply(key, unquote(value))
                .map_err(|kind| ConfigParseError::new(line_no, kind))?;
        }

        Ok(config)
    }

    /// Renders the config back into the on-volume format.
    pub fn render(&self) -> Result<String<MAX_RENDERED_CONFIG>, fmt::Error> {
        let mut out = String::new();
        writeln!(out, "# tlc32 camera configuration")?;
        writeln!(out, "wifi.ssid = {}", Quoted(&self.wifi.ssid))?;
        writeln!(out, "wifi.password = {}", Quoted(&self.wifi.password))?;
        writeln!(out, "upload.host = {}", Quoted(&self.upload.host))?;
        writeln!(out, "upload.user = {}", Quoted(&self.upload.user))?;
        writeln!(out, "upload.password = {}", Quoted(&self.upload.password))?;
        writeln!(out, "upload.mode = {}", self.upload_mode.as_str())?;
        writeln!(
            out,
            "capture.interval_secs = {}",
            self.capture_interval.as_secs()
        )?;
        writeln!(out, "capture.sleepy = {}", self.sleepy)?;
        Ok(out)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigParseErrorKind> {
        match key {
            "wifi.ssid" => self.wifi.ssid = bounded(value)?,
            "wifi.password" => self.wifi.password = bounded(value)?,
            "upload.host" => self.upload.host = bounded(value)?,
            "upload.user" => self.upload.user = bounded(value)?,
            "upload.password" => self.upload.password = bounded(value)?,
            "upload.mode" => {
                self.upload_mode = if parse_flag(value)? {
                    UploadMode::On
                } else {
                    UploadMode::Off
                }
            }
            "capture.interval_secs" => {
                let secs = value
                    .parse::<u32>()
                    .map_err(|_| ConfigParseErrorKind::InvalidValue)?;
                if secs == 0 {
                    return Err(ConfigParseErrorKind::InvalidValue);
                }
                self.capture_interval = Duration::from_secs(u64::from(secs));
            }
            "capture.sleepy" => self.sleepy = parse_flag(value)?,
            _ => return Err(ConfigParseErrorKind::UnknownKey),
        }
        Ok(())
    }
}

/// Log-safe summary; passwords are never printed.
impl fmt::Display for CameraConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ssid={} upload={} host={} user={} interval={}s sleepy={}",
            self.wifi.ssid,
            self.upload_mode.as_str(),
            self.upload.host,
            self.upload.user,
            self.capture_interval.as_secs(),
            self.sleepy
        )
    }
}

/// Category of a config parse failure.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigParseErrorKind {
    Syntax,
    UnknownKey,
    ValueTooLong,
    InvalidValue,
}

/// Parse failure with the offending line number (1-based).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ConfigParseError {
    pub line: usize,
    pub kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub const fn new(line: usize, kind: ConfigParseErrorKind) -> Self {
        Self { line, kind }
    }
}

impl fmt::Display for ConfigParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            ConfigParseErrorKind::Syntax => "expected `key = value`",
            ConfigParseErrorKind::UnknownKey => "unknown key",
            ConfigParseErrorKind::ValueTooLong => "value too long",
            ConfigParseErrorKind::InvalidValue => "invalid value",
        };
        write!(f, "line {}: {what}", self.line)
    }
}

/// Failure reported by a [`ConfigStore`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    Io,
    TooLarge,
    Malformed(ConfigParseError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io => f.write_str("config i/o error"),
            ConfigError::TooLarge => f.write_str("config file too large"),
            ConfigError::Malformed(err) => write!(f, "config malformed at {err}"),
        }
    }
}

impl From<ConfigParseError> for ConfigError {
    fn from(value: ConfigParseError) -> Self {
        ConfigError::Malformed(value)
    }
}

/// Collaborator that persists the camera configuration on the mounted volume.
pub trait ConfigStore<V> {
    /// Loads the config. `Ok(None)` means no config file exists.
    fn load(&mut self, volume: &mut V) -> Result<Option<CameraConfig>, ConfigError>;

    /// Writes `config` to the volume, replacing any previous file.
    fn save(&mut self, volume: &mut V, config: &CameraConfig) -> Result<(), ConfigError>;

    /// Built-in defaults used when nothing usable is stored.
    fn defaults(&self) -> CameraConfig;
}

fn entry<'a>(input: &mut &'a str) -> Result<(&'a str, &'a str), ContextError> {
    separated_pair(take_while(1.., is_key_char), (space0, '=', space0), rest)
        .map(|(key, value): (&'a str, &'a str)| (key, value.trim_end()))
        .parse_next(input)
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == '_'
}

/// Renders a value so that [`CameraConfig::parse`] reads it back unchanged.
/// Edge whitespace would be trimmed and a leading quote would be stripped,
/// so those values get wrapped in quotes.
struct Quoted<'a>(&'a str);

impl fmt::Display for Quoted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.0;
        let needs_quotes = value.starts_with('"')
            || value.starts_with(char::is_whitespace)
            || value.ends_with(char::is_whitespace);
        if needs_quotes {
            write!(f, "\"{value}\"")
        } else {
            f.write_str(value)
        }
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(value)
}

fn parse_flag(value: &str) -> Result<bool, ConfigParseErrorKind> {
    match value {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => Err(ConfigParseErrorKind::InvalidValue),
    }
}

fn bounded<const N: usize>(value: &str) -> Result<String<N>, ConfigParseErrorKind> {
    let mut out = String::new();
    out.push_str(value)
        .map_err(|_| ConfigParseErrorKind::ValueTooLong)?;
    Ok(out)
}
