//! Configuration management.
//!
//! Two INI files drive a run, loaded with the `config` crate:
//!
//! ```ini
//! ; gauge.ini
//! [Serial]
//! port = /dev/ttyUSB0
//! baudrate = 19200
//! address = 01
//! timeout = 1.0
//! min_delay = 0.05
//! model = 354
//!
//! ; recording.ini
//! [Logging]
//! store_data = true
//! h5file = ${VIPER_DIR}/data/vacuum_data.h5
//! interval = 5.0
//! duration = 300
//! ```
//!
//! Files are parsed into raw serde structs with defaults, then validated into the
//! typed [`GaugeConfig`] / [`RecordingConfig`] that the rest of the crate receives
//! by reference.

use crate::error::{AppResult, GaugeError};
use crate::protocol::{DeviceAddress, GaugeModel};
use config::{Config, File, FileFormat};
use regex::{Captures, Regex};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// Raw file layout
// =============================================================================

#[derive(Debug, Deserialize, Default)]
struct GaugeFile {
    #[serde(rename = "Serial", alias = "serial", default)]
    serial: SerialSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SerialSection {
    port: String,
    baudrate: u32,
    address: String,
    timeout: f64,
    min_delay: f64,
    model: String,
}

impl Default for SerialSection {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baudrate: 19200,
            address: "01".to_string(),
            timeout: 1.0,
            min_delay: 0.05,
            model: "354".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct RecordingFile {
    #[serde(rename = "Logging", alias = "logging", default)]
    logging: LoggingSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct LoggingSection {
    store_data: bool,
    h5file: Option<String>,
    interval: f64,
    duration: u64,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            store_data: true,
            h5file: None,
            interval: 5.0,
            duration: 300,
        }
    }
}

// =============================================================================
// Validated configuration
// =============================================================================

/// Serial link and device settings for the gauge.
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeConfig {
    /// Serial device path (e.g. `/dev/ttyUSB0`, `COM3`).
    pub port: String,
    /// Baud rate; must match the gauge.
    pub baudrate: u32,
    /// RS-485 device address.
    pub address: DeviceAddress,
    /// How long to wait for each response.
    pub timeout: Duration,
    /// Minimum spacing between consecutive commands.
    pub min_delay: Duration,
    /// Device family, selects the protocol codec.
    pub model: GaugeModel,
}

impl GaugeConfig {
    /// Load and validate a gauge configuration file.
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw: GaugeFile = read_ini(File::from(path).format(FileFormat::Ini))?;
        Self::from_section(raw.serial)
    }

    /// Parse a gauge configuration from INI text.
    pub fn from_ini_str(text: &str) -> AppResult<Self> {
        let raw: GaugeFile = read_ini(File::from_str(text, FileFormat::Ini))?;
        Self::from_section(raw.serial)
    }

    fn from_section(section: SerialSection) -> AppResult<Self> {
        if section.port.trim().is_empty() {
            return Err(GaugeError::Configuration("port must not be empty".into()));
        }
        if section.baudrate == 0 {
            return Err(GaugeError::Configuration("baudrate must be positive".into()));
        }
        if section.timeout <= 0.0 {
            return Err(GaugeError::Configuration(format!(
                "timeout must be positive, got {}",
                section.timeout
            )));
        }

        Ok(Self {
            port: section.port.trim().to_string(),
            baudrate: section.baudrate,
            address: section.address.parse()?,
            timeout: seconds("timeout", section.timeout)?,
            min_delay: seconds("min_delay", section.min_delay)?,
            model: section.model.parse()?,
        })
    }
}

/// Recording loop and storage settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingConfig {
    /// When false, readings are only printed, never stored.
    pub store_data: bool,
    /// Store path after environment-variable expansion.
    pub h5file: Option<PathBuf>,
    /// Time between cycle starts.
    pub interval: Duration,
    /// Number of cycles to record; 0 runs until cancelled.
    pub duration: u64,
}

impl RecordingConfig {
    /// Load and validate a recording configuration file.
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw: RecordingFile = read_ini(File::from(path).format(FileFormat::Ini))?;
        Self::from_section(raw.logging)
    }

    /// Parse a recording configuration from INI text.
    pub fn from_ini_str(text: &str) -> AppResult<Self> {
        let raw: RecordingFile = read_ini(File::from_str(text, FileFormat::Ini))?;
        Self::from_section(raw.logging)
    }

    /// Path of the append store, or `None` when storage is disabled.
    pub fn store_path(&self) -> Option<&Path> {
        if self.store_data {
            self.h5file.as_deref()
        } else {
            None
        }
    }

    /// Whether the run stops on its own after `duration` cycles.
    pub fn is_bounded(&self) -> bool {
        self.duration != 0
    }

    fn from_section(section: LoggingSection) -> AppResult<Self> {
        if section.interval <= 0.0 {
            return Err(GaugeError::Configuration(format!(
                "interval must be positive, got {}",
                section.interval
            )));
        }

        let h5file = match section.h5file.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(PathBuf::from(expand_env_vars(raw)?)),
            _ => None,
        };
        if section.store_data && h5file.is_none() {
            return Err(GaugeError::Configuration(
                "h5file is required when store_data is enabled".into(),
            ));
        }

        Ok(Self {
            store_data: section.store_data,
            h5file,
            interval: seconds("interval", section.interval)?,
            duration: section.duration,
        })
    }
}

/// Both configuration files of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Gauge and serial settings.
    pub gauge: GaugeConfig,
    /// Recording loop settings.
    pub recording: RecordingConfig,
}

impl AppConfig {
    /// Load both files given on the command line.
    pub fn load(gauge_path: &Path, recording_path: &Path) -> AppResult<Self> {
        Ok(Self {
            gauge: GaugeConfig::load(gauge_path)?,
            recording: RecordingConfig::load(recording_path)?,
        })
    }
}

fn read_ini<T, S>(source: S) -> AppResult<T>
where
    T: for<'de> Deserialize<'de>,
    S: config::Source + Send + Sync + 'static,
{
    let settings = Config::builder().add_source(source).build()?;
    Ok(settings.try_deserialize()?)
}

fn seconds(key: &str, value: f64) -> AppResult<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        GaugeError::Configuration(format!("{key} must be a non-negative number of seconds, got {value}"))
    })
}

/// Expand `$VAR` and `${VAR}` references from the process environment.
///
/// Unknown variables are left untouched, matching shell-style `expandvars`.
pub fn expand_env_vars(input: &str) -> AppResult<String> {
    let pattern = Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
        .map_err(|e| GaugeError::Configuration(e.to_string()))?;

    let expanded = pattern.replace_all(input, |caps: &Captures| {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
    });
    Ok(expanded.into_owned())
}
