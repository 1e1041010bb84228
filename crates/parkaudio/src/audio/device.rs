//! Audio device enumeration
//!
//! Lists output devices from ALL available audio hosts (ALSA, PipeWire,
//! WASAPI, CoreAudio, etc.) so the options window can offer every device the
//! system knows about, and resolves a configured `DeviceId` back to a cpal
//! device when the mixer opens its stream.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use super::config::DeviceId;
use super::error::{AudioError, AudioResult};

/// Get a human-readable name for a host ID
fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

/// Get a host by its name string
fn get_host_by_name(name: &str) -> Option<Host> {
    for host_id in cpal::available_hosts() {
        if host_name(host_id) == name {
            return cpal::host_from_id(host_id).ok();
        }
    }
    None
}

/// An audio output device as shown in the options window
#[derive(Debug, Clone)]
pub struct OutputDevice {
    /// Device identifier for configuration (includes host info)
    pub id: DeviceId,
    /// Human-readable device name
    pub name: String,
    /// Host backend name (e.g., "ALSA", "WASAPI")
    pub host: String,
    /// Whether this is the system default device for its host
    pub is_default: bool,
}

impl std::fmt::Display for OutputDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.host, self.name)
    }
}

/// Get all available audio output devices from ALL hosts.
///
/// Devices that report no usable output configuration are skipped. Defaults
/// sort first, then by host and name.
pub fn get_output_devices() -> AudioResult<Vec<OutputDevice>> {
    let mut all_devices: Vec<OutputDevice> = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };

        let host_name_str = host_name(host_id);

        let default_device_name = host
            .default_output_device()
            .and_then(|d: cpal::Device| d.name().ok());

        let devices_iter = match host.output_devices() {
            Ok(d) => d,
            Err(e) => {
                log::debug!("Could not enumerate devices for {:?}: {}", host_id, e);
                continue;
            }
        };

        for device in devices_iter {
            let name = match device.name() {
                Ok(n) => n,
                Err(_) => continue,
            };

            let has_output = device
                .supported_output_configs()
                .map(|mut c| c.next().is_some())
                .unwrap_or(false);
            if !has_output {
                continue;
            }

            let is_default = default_device_name.as_ref() == Some(&name);

            all_devices.push(OutputDevice {
                id: DeviceId::with_host(&name, &host_name_str),
                name: name.clone(),
                host: host_name_str.clone(),
                is_default,
            });
        }
    }

    if all_devices.is_empty() {
        return Err(AudioError::NoDevices);
    }

    all_devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.host.cmp(&b.host))
            .then_with(|| a.name.cmp(&b.name))
    });

    log::info!(
        "Enumerated {} audio devices from {} hosts",
        all_devices.len(),
        cpal::available_hosts().len()
    );

    Ok(all_devices)
}

/// Get available output devices, swallowing enumeration failures.
/// For UI code that treats "no devices" the same as "enumeration failed".
pub fn get_available_output_devices() -> Vec<OutputDevice> {
    match get_output_devices() {
        Ok(devices) => devices,
        Err(e) => {
            log::warn!("Failed to enumerate audio devices: {}", e);
            Vec::new()
        }
    }
}

/// Find a cpal device by its configured ID.
///
/// Uses the host recorded in the `DeviceId` if present, otherwise searches
/// every available host by name.
pub fn find_device_by_id(id: &DeviceId) -> AudioResult<cpal::Device> {
    if let Some(ref host_name) = id.host {
        if let Some(host) = get_host_by_name(host_name) {
            return host
                .output_devices()
                .map_err(|e| AudioError::ConfigError(e.to_string()))?
                .find(|d: &cpal::Device| d.name().ok().as_ref() == Some(&id.name))
                .ok_or_else(|| AudioError::DeviceNotFound(id.name.clone()));
        }
    }

    for host_id in cpal::available_hosts() {
        if let Ok(host) = cpal::host_from_id(host_id) {
            if let Ok(mut devices) = host.output_devices() {
                if let Some(device) =
                    devices.find(|d: &cpal::Device| d.name().ok().as_ref() == Some(&id.name))
                {
                    return Ok(device);
                }
            }
        }
    }

    Err(AudioError::DeviceNotFound(id.name.clone()))
}

/// Get the cpal default output device from the default host
pub fn get_cpal_default_device() -> AudioResult<cpal::Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| AudioError::NoDefaultDevice("No default output device".to_string()))
}
