//! Audio device layer
//!
//! Device enumeration, stream configuration and the output driver the mixer
//! renders into. Everything above this module works in terms of
//! [`AudioFormat`](crate::types::AudioFormat) byte buffers; this module is
//! the only place that talks to cpal.

mod config;
mod device;
mod error;
mod output;

pub use config::{
    AudioConfig, DeviceId, VolumeSettings, DEFAULT_BUFFER_FRAMES, DEFAULT_SAMPLE_RATE,
};
pub use device::{
    find_device_by_id, get_available_output_devices, get_cpal_default_device, get_output_devices,
    OutputDevice,
};
pub use error::{AudioError, AudioResult};
pub use output::{CpalOutput, FillFn, OutputDriver};
