//! Configuration system for the oxidized-xenon emulator

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
///
/// The emulator reads this once at construction; nothing consults
/// ambient process state afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    pub general: GeneralConfig,
    pub cpu: CpuConfig,
    pub gpu: GpuConfig,
    pub audio: AudioConfig,
    pub paths: PathConfig,
    pub debug: DebugConfig,
}

/// General emulator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Scalar used to speed or slow guest time (1x, 2x, 1/2x, etc)
    pub time_scalar: f64,
    pub confirm_exit: bool,
}

/// CPU emulation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuConfig {
    /// Size of the generated-code cache in bytes
    pub code_cache_size: u64,
}

/// GPU settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuConfig {
    pub backend: GpuBackend,
    pub vsync: bool,
}

/// GPU backend type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum GpuBackend {
    #[default]
    Null,
}

/// Audio settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub enable: bool,
    pub volume: f32,
}

/// Path configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub content: PathBuf,
    pub cache: PathBuf,
}

/// Debug settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Start an internal debugger session during setup
    pub enabled: bool,
    pub log_level: LogLevel,
    pub break_on_start: bool,
}

/// Logging level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// The `tracing` filter directive this level corresponds to
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

// Default implementations

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            time_scalar: 1.0,
            confirm_exit: true,
        }
    }
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            // 64MB of generated code is plenty for a single title.
            code_cache_size: 64 * 1024 * 1024,
        }
    }
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            backend: GpuBackend::default(),
            vsync: true,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enable: true,
            volume: 1.0,
        }
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        let base = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("oxidized-xenon");

        Self {
            content: base.join("content"),
            cache: base.join("cache"),
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_level: LogLevel::default(),
            break_on_start: false,
        }
    }
}

impl Config {
    /// Load configuration from file, or create default if it doesn't exist
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = Self::config_path();

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            Ok(toml::from_str(&content)?)
        } else {
            let config = Self::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("oxidized-xenon")
            .join("config.toml")
    }
}
