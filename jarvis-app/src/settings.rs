//! Persistent host settings (JSON file in the user data directory).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use jarvis_core::engine::EngineConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub preferred_input_device: Option<String>,
    pub preferred_output_device: Option<String>,
    pub speaking_grace_ms: u64,
    pub capture_block_size: usize,
    /// Where `wav` writes when no output path is given.
    pub download_dir: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            preferred_input_device: None,
            preferred_output_device: None,
            speaking_grace_ms: 500,
            capture_block_size: 4096,
            download_dir: None,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.preferred_input_device = normalize_device_name(self.preferred_input_device.take());
        self.preferred_output_device = normalize_device_name(self.preferred_output_device.take());
        self.speaking_grace_ms = self.speaking_grace_ms.min(5_000);
        self.capture_block_size = self.capture_block_size.clamp(256, 16_384);
        self.download_dir = self
            .download_dir
            .take()
            .filter(|d| !d.as_os_str().is_empty());
    }

    /// Engine configuration with these settings applied over the defaults.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            capture_block_size: self.capture_block_size,
            speaking_grace: Duration::from_millis(self.speaking_grace_ms),
            preferred_input_device: self.preferred_input_device.clone(),
            preferred_output_device: self.preferred_output_device.clone(),
            ..EngineConfig::default()
        }
    }
}

fn normalize_device_name(raw: Option<String>) -> Option<String> {
    raw.map(|d| d.trim().to_string()).filter(|d| !d.is_empty())
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Jarvis")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("jarvis")
            .join("settings.json")
    }
}

/// Missing or unreadable files fall back to defaults.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
