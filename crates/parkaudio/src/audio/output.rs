//! Output stream driver
//!
//! `OutputDriver` abstracts the device stream so the mixer can run without
//! hardware (tests drive its fill callback directly). `CpalOutput` is the
//! real implementation: it negotiates an i16 stereo stream where possible,
//! falls back to f32 with an in-callback conversion, and reports the format
//! the mixer must produce.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use super::config::{AudioConfig, DEFAULT_BUFFER_FRAMES, DEFAULT_SAMPLE_RATE};
use super::device::{find_device_by_id, get_cpal_default_device};
use super::error::{AudioError, AudioResult};
use crate::types::{AudioFormat, SampleEncoding};

/// Callback that fills a device-sized byte buffer with mixed PCM.
/// Called on the audio thread; must not block beyond the mixer lock.
pub type FillFn = Box<dyn FnMut(&mut [u8]) + Send>;

/// A destination for mixed audio
pub trait OutputDriver {
    /// Open the stream described by `config`, wiring `fill` as its data
    /// callback. Returns the PCM format the callback must produce.
    fn open(&mut self, config: &AudioConfig, fill: FillFn) -> AudioResult<AudioFormat>;

    /// Stop and drop the stream. Safe to call when no stream is open.
    fn close(&mut self);
}

/// cpal-backed output stream
pub struct CpalOutput {
    stream: Option<Stream>,
}

impl CpalOutput {
    pub fn new() -> Self {
        Self { stream: None }
    }
}

impl Default for CpalOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputDriver for CpalOutput {
    fn open(&mut self, config: &AudioConfig, mut fill: FillFn) -> AudioResult<AudioFormat> {
        self.close();

        let device = match &config.device {
            Some(id) => find_device_by_id(id)?,
            None => get_cpal_default_device()?,
        };

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Using audio device: {}", device_name);

        let supported = get_output_config(&device, config)?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        let buffer_frames = config.buffer_frames.unwrap_or(DEFAULT_BUFFER_FRAMES);

        let stream_config = StreamConfig {
            channels,
            sample_rate: supported.sample_rate(),
            buffer_size: CpalBufferSize::Fixed(buffer_frames),
        };

        log::info!(
            "Audio config: {} channels, {}Hz, {} frames ({:?} stream)",
            channels,
            sample_rate,
            buffer_frames,
            supported.sample_format()
        );

        let err_fn = |err| log::error!("Audio stream error: {}", err);

        let stream = match supported.sample_format() {
            SampleFormat::I16 => device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [i16], _info: &cpal::OutputCallbackInfo| {
                        fill(bytemuck::cast_slice_mut(data));
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| AudioError::StreamBuildError(e.to_string()))?,
            SampleFormat::F32 => {
                // Mix in s16 and widen per callback
                let mut scratch: Vec<u8> = Vec::new();
                device
                    .build_output_stream(
                        &stream_config,
                        move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                            let bytes = data.len() * 2;
                            if scratch.len() < bytes {
                                scratch.resize(bytes, 0);
                            }
                            fill(&mut scratch[..bytes]);
                            for (out, pair) in data.iter_mut().zip(scratch.chunks_exact(2)) {
                                let s = i16::from_le_bytes([pair[0], pair[1]]);
                                *out = s as f32 / 32768.0;
                            }
                        },
                        err_fn,
                        None,
                    )
                    .map_err(|e| AudioError::StreamBuildError(e.to_string()))?
            }
            other => {
                return Err(AudioError::UnsupportedFormat(format!("{:?}", other)));
            }
        };

        stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

        self.stream = Some(stream);

        Ok(AudioFormat::new(
            sample_rate,
            SampleEncoding::S16Le,
            channels as u32,
        ))
    }

    fn close(&mut self) {
        // Dropping the stream stops playback
        self.stream = None;
    }
}

/// Pick the best supported output configuration for a device.
///
/// Prefers i16 stereo at the requested rate (the mixer's native output),
/// then f32 stereo, then anything with at least 2 channels.
fn get_output_config(
    device: &cpal::Device,
    config: &AudioConfig,
) -> AudioResult<cpal::SupportedStreamConfig> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    if supported_configs.is_empty() {
        return Err(AudioError::ConfigError(
            "No supported output configurations".to_string(),
        ));
    }

    let target_sample_rate = config.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);

    let rate_in_range = |c: &&cpal::SupportedStreamConfigRange| {
        target_sample_rate >= c.min_sample_rate().0 && target_sample_rate <= c.max_sample_rate().0
    };

    let best_config = supported_configs
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::I16)
        .filter(|c| c.channels() >= 2)
        .find(rate_in_range)
        .or_else(|| {
            supported_configs
                .iter()
                .filter(|c| c.sample_format() == SampleFormat::F32)
                .filter(|c| c.channels() >= 2)
                .find(rate_in_range)
        })
        .or_else(|| supported_configs.iter().find(|c| c.channels() >= 2))
        .or_else(|| supported_configs.first())
        .ok_or_else(|| {
            AudioError::ConfigError("No suitable output configuration found".to_string())
        })?;

    let sample_rate = if target_sample_rate >= best_config.min_sample_rate().0
        && target_sample_rate <= best_config.max_sample_rate().0
    {
        cpal::SampleRate(target_sample_rate)
    } else {
        let fallback = best_config.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz",
            target_sample_rate,
            fallback.0
        );
        fallback
    };

    Ok(best_config.clone().with_sample_rate(sample_rate))
}
