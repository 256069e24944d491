//! TOML-based configuration persistence for the agent.
//!
//! Reads and writes [`AppConfig`] at `$XDG_CONFIG_HOME/ipkvm/config.toml`,
//! falling back to `~/.config/ipkvm/config.toml`.
//!
//! ```toml
//! [agent]
//! log_level = "info"
//!
//! [capture]
//! device = "/dev/video0"
//! width = 1280
//! height = 720
//! format = "YUYV"
//! fps = 30
//!
//! [network]
//! enabled = true
//! port = 8080
//!
//! [hid]
//! serial_port = "/dev/ttyUSB0"
//! baud_rate = 9600
//! pointer_mode = "absolute"
//! ```
//!
//! # Serde default values
//!
//! Every field carries `#[serde(default = "...")]`, so a partial file (or
//! one written by an older version) loads with the remaining fields at their
//! defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::hid_translator::PointerMode;
use crate::application::orchestrator::HardwareConfig;
use crate::infrastructure::capture::FourCc;
use crate::infrastructure::hid::ch9329::DEFAULT_BAUD_RATE;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level agent configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub hid: HidConfig,
}

/// General agent behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Capture device and requested stream parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureConfig {
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Four-character pixel format code, e.g. `"YUYV"` or `"MJPG"`.
    #[serde(default = "default_format")]
    pub format: FourCc,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

/// Viewer stream server settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// HID injection chip settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HidConfig {
    /// Serial port of the CH9329; absent selects the dry-run driver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_pointer_mode")]
    pub pointer_mode: PointerMode,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_device() -> String {
    "/dev/video0".to_string()
}
fn default_width() -> u32 {
    HardwareConfig::default().width
}
fn default_height() -> u32 {
    HardwareConfig::default().height
}
fn default_format() -> FourCc {
    FourCc::YUYV
}
fn default_fps() -> u32 {
    HardwareConfig::default().fps
}
fn default_true() -> bool {
    true
}
fn default_port() -> u16 {
    HardwareConfig::default().network_port
}
fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}
fn default_pointer_mode() -> PointerMode {
    PointerMode::Absolute
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            width: default_width(),
            height: default_height(),
            format: default_format(),
            fps: default_fps(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            port: default_port(),
        }
    }
}

impl Default for HidConfig {
    fn default() -> Self {
        Self {
            serial_port: None,
            baud_rate: default_baud_rate(),
            pointer_mode: default_pointer_mode(),
        }
    }
}

impl AppConfig {
    /// The desired orchestrator state described by this file.
    pub fn hardware_config(&self) -> HardwareConfig {
        HardwareConfig {
            width: self.capture.width,
            height: self.capture.height,
            fourcc: self.capture.format,
            fps: self.capture.fps,
            network_enabled: self.network.enabled,
            network_port: self.network.port,
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if neither
/// `XDG_CONFIG_HOME` nor `HOME` is set.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok_or(ConfigError::NoPlatformConfigDir)?;
    Ok(base.join("ipkvm").join("config.toml"))
}

/// Loads [`AppConfig`] from the default location.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads [`AppConfig`] from `path`, returning the defaults if the file does
/// not exist yet.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to the default location.
///
/// # Errors
///
/// See [`save_config_to`].
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
