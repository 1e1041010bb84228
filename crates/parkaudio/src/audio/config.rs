//! Audio configuration
//!
//! Device selection and stream parameters for the output backend, plus the
//! game-facing volume settings the mixer reads every pass.

use serde::{Deserialize, Serialize};

/// Default sample rate requested from the device (44.1kHz).
/// All bundled game sounds are stored at this rate.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Default stream buffer size in frames (~23ms at 44.1kHz)
pub const DEFAULT_BUFFER_FRAMES: u32 = 1024;

/// Audio device identifier
///
/// Includes both the device name and the host backend (ALSA, WASAPI, etc.)
/// so devices from different hosts can be told apart on systems with more
/// than one backend available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Audio host identifier (e.g., "ALSA", "CoreAudio")
    /// If None, uses the default/preferred host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// Get a display label that includes the host if available
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Configuration for the output stream
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Output device (None = system default)
    pub device: Option<DeviceId>,

    /// Preferred sample rate (None = DEFAULT_SAMPLE_RATE)
    pub sample_rate: Option<u32>,

    /// Preferred buffer size in frames (None = DEFAULT_BUFFER_FRAMES)
    pub buffer_frames: Option<u32>,
}

impl AudioConfig {
    /// Set the output device
    pub fn with_device(mut self, device: DeviceId) -> Self {
        self.device = Some(device);
        self
    }

    /// Set the preferred sample rate
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    /// Set the preferred buffer size in frames
    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_frames = Some(frames);
        self
    }
}

/// Player-facing volume settings, as shown in the options window.
///
/// Volumes are percentages (0..=100); the mixer maps them onto a power
/// curve so the slider feels linear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSettings {
    /// Master toggle; when off every group is silent
    pub master_enabled: bool,
    /// Master volume percentage
    pub master_volume: u8,
    /// Sound effects toggle
    pub sound_enabled: bool,
    /// Sound effects volume percentage
    pub sound_volume: u8,
    /// Ride music volume percentage
    pub ride_music_volume: u8,
}

impl Default for VolumeSettings {
    fn default() -> Self {
        Self {
            master_enabled: true,
            master_volume: 100,
            sound_enabled: true,
            sound_volume: 100,
            ride_music_volume: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_display_label() {
        let plain = DeviceId::new("default");
        assert_eq!(plain.display_label(), "default");

        let hosted = DeviceId::with_host("hw:0,0", "ALSA");
        assert_eq!(hosted.display_label(), "[ALSA] hw:0,0");
    }

    #[test]
    fn test_config_builders() {
        let config = AudioConfig::default()
            .with_sample_rate(22050)
            .with_buffer_frames(512);
        assert_eq!(config.sample_rate, Some(22050));
        assert_eq!(config.buffer_frames, Some(512));
        assert!(config.device.is_none());
    }
}
