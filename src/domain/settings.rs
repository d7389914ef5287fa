use crate::domain::models::{ScanMode, SortOrder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "bluing";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

/// Capture peripheral settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnifferSettings {
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Advertising channels to sniff, at most one per peripheral
    #[serde(default = "default_channels")]
    pub channels: Vec<u8>,
    /// Explicit serial device paths; empty means auto-detect
    #[serde(default)]
    pub device_paths: Vec<String>,
    #[serde(default = "default_usb_vid")]
    pub usb_vid: u16,
    #[serde(default = "default_usb_pid")]
    pub usb_pid: u16,
}

impl Default for SnifferSettings {
    fn default() -> Self {
        Self {
            baud_rate: default_baud_rate(),
            channels: default_channels(),
            device_paths: Vec::new(),
            usb_vid: default_usb_vid(),
            usb_pid: default_usb_pid(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    #[serde(default = "default_scan_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub mode: ScanMode,
    #[serde(default)]
    pub sort: SortOrder,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_scan_timeout_secs(),
            mode: ScanMode::default(),
            sort: SortOrder::default(),
        }
    }
}

impl ScanSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GattSettings {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Upper bound for every other transport call
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
    /// Reconnect once after reading characteristic values. Some stacks answer
    /// the next request with a malformed response otherwise.
    #[serde(default = "default_true")]
    pub reconnect_before_descriptors: bool,
    #[serde(default = "default_io_capability")]
    pub io_capability: String,
}

impl Default for GattSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            op_timeout_ms: default_op_timeout_ms(),
            reconnect_before_descriptors: default_true(),
            io_capability: default_io_capability(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "bluing".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}
fn default_baud_rate() -> u32 {
    115_200
}
fn default_channels() -> Vec<u8> {
    vec![37, 38, 39]
}
// micro:bit DAPLink interface
fn default_usb_vid() -> u16 {
    0x0D28
}
fn default_usb_pid() -> u16 {
    0x0204
}
fn default_scan_timeout_secs() -> u64 {
    8
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_op_timeout_ms() -> u64 {
    5_000
}
fn default_io_capability() -> String {
    "NoInputNoOutput".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub log_settings: LogSettings,
    #[serde(default)]
    pub sniffer: SnifferSettings,
    #[serde(default)]
    pub scan: ScanSettings,
    #[serde(default)]
    pub gatt: GattSettings,
    /// Where scan results are cached; defaults to the user cache directory
    #[serde(default)]
    pub cache_dir: Option<String>,
}

impl Settings {
    pub fn cache_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Ok(PathBuf::from(dir));
        }
        let mut path = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine cache directory"))?;
        path.push(APP_DIR);
        Ok(path)
    }
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Load from an explicit file, falling back to defaults
    pub fn with_path(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!(
                    "Using default settings ({}): {}",
                    settings_path.display(),
                    e
                );
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push(APP_DIR);
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}
