//! Audio device enumeration and selection.
//!
//! Selection order: the preferred device by exact name, then the host
//! default, then the first device the host lists. A stale preference (device
//! unplugged since the setting was saved) falls through with a warning.

use serde::{Deserialize, Serialize};

/// Metadata about an audio device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Human-readable device name reported by the OS.
    pub name: String,
    /// Whether this is the host's default device for its direction.
    pub is_default: bool,
}

/// Default device first, then case-insensitive name order.
pub fn sort_devices(devices: &mut [DeviceInfo]) {
    devices.sort_by_key(|d| (!d.is_default, d.name.to_ascii_lowercase()));
}

#[cfg(feature = "audio-cpal")]
pub(crate) use selection::{select_input_device, select_output_device};

#[cfg(feature = "audio-cpal")]
mod selection {
    use cpal::traits::{DeviceTrait, HostTrait};
    use tracing::{info, warn};

    use crate::error::{JarvisError, Result};

    pub(crate) fn select_input_device(
        host: &cpal::Host,
        preferred: Option<&str>,
    ) -> Result<cpal::Device> {
        let device = select(
            preferred,
            || host.input_devices().map(|d| d.collect()),
            || host.default_input_device(),
            JarvisError::NoDefaultInputDevice,
        )?;
        info!(device = device.name().unwrap_or_default().as_str(), "input device selected");
        Ok(device)
    }

    pub(crate) fn select_output_device(
        host: &cpal::Host,
        preferred: Option<&str>,
    ) -> Result<cpal::Device> {
        let device = select(
            preferred,
            || host.output_devices().map(|d| d.collect()),
            || host.default_output_device(),
            JarvisError::NoDefaultOutputDevice,
        )?;
        info!(device = device.name().unwrap_or_default().as_str(), "output device selected");
        Ok(device)
    }

    fn select(
        preferred: Option<&str>,
        list: impl Fn() -> std::result::Result<Vec<cpal::Device>, cpal::DevicesError>,
        default: impl Fn() -> Option<cpal::Device>,
        none: JarvisError,
    ) -> Result<cpal::Device> {
        if let Some(name) = preferred {
            match list() {
                Ok(devices) => {
                    if let Some(found) = devices
                        .into_iter()
                        .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                    {
                        return Ok(found);
                    }
                    warn!("preferred device '{name}' not found, falling back");
                }
                Err(e) => warn!("failed to list devices while resolving preference: {e}"),
            }
        }

        if let Some(device) = default() {
            return Ok(device);
        }

        let mut devices = list().map_err(|e| JarvisError::AudioDevice(e.to_string()))?;
        if devices.is_empty() {
            return Err(none);
        }
        warn!("no default device, falling back to first available");
        Ok(devices.swap_remove(0))
    }
}

/// List all audio input devices.
#[cfg(feature = "audio-cpal")]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());
    collect(host.input_devices().map(|d| d.collect()), default_name, "Input")
}

/// List all audio output devices.
#[cfg(feature = "audio-cpal")]
pub fn list_output_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());
    collect(host.output_devices().map(|d| d.collect()), default_name, "Output")
}

#[cfg(feature = "audio-cpal")]
fn collect(
    devices: std::result::Result<Vec<cpal::Device>, cpal::DevicesError>,
    default_name: Option<String>,
    label: &str,
) -> Vec<DeviceInfo> {
    use cpal::traits::DeviceTrait;

    match devices {
        Ok(devices) => {
            let mut list: Vec<DeviceInfo> = devices
                .iter()
                .enumerate()
                .map(|(idx, device)| {
                    let name = device
                        .name()
                        .unwrap_or_else(|_| format!("{label} Device {}", idx + 1));
                    let is_default = default_name.as_deref() == Some(name.as_str());
                    DeviceInfo { name, is_default }
                })
                .collect();
            sort_devices(&mut list);
            list
        }
        Err(e) => {
            tracing::warn!("failed to enumerate {label} devices: {e}");
            default_name
                .map(|name| {
                    vec![DeviceInfo {
                        name,
                        is_default: true,
                    }]
                })
                .unwrap_or_default()
        }
    }
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    vec![]
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_output_devices() -> Vec<DeviceInfo> {
    vec![]
}
