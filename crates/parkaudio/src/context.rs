//! Game-facing audio context
//!
//! `AudioContext` is the facade the rest of the game talks to: it owns the
//! mixer, loads sounds from disk or the bundled archive, and keeps a
//! registry of live sources. When no output device can be opened it runs in
//! dummy mode with the same interface; playback requests simply produce no
//! channel, so callers never special-case missing audio.

use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::audio::{
    get_available_output_devices, AudioConfig, AudioResult, DeviceId, OutputDevice,
    VolumeSettings,
};
use crate::mixer::{AudioMixer, ChannelHandle};
use crate::source::{self, into_handle, AudioSource, MemorySource, SourceHandle};
use crate::types::{LoopCount, MixerGroup};

/// Sources whose decoded length stays under this are converted up front to
/// a memory buffer in the device format; larger ones keep streaming.
const STREAM_THRESHOLD: usize = 2 * 1024 * 1024;

pub struct AudioContext {
    mixer: AudioMixer,
    config: AudioConfig,
    /// Live sources; entries stay until released and collected
    sources: Mutex<Vec<SourceHandle>>,
    dummy: bool,
}

impl AudioContext {
    /// Open the context on a real output device
    pub fn new(config: AudioConfig) -> AudioResult<Self> {
        let mixer = AudioMixer::open(&config)?;
        Ok(Self {
            mixer,
            config,
            sources: Mutex::new(Vec::new()),
            dummy: false,
        })
    }

    /// A context with no output device. Same interface, never any sound.
    pub fn dummy() -> Self {
        Self {
            mixer: AudioMixer::for_output(crate::types::AudioFormat::default_output()),
            config: AudioConfig::default(),
            sources: Mutex::new(Vec::new()),
            dummy: true,
        }
    }

    /// Open a real context, falling back to the dummy one when the device
    /// cannot be opened. The game keeps running either way.
    pub fn open_or_dummy(config: AudioConfig) -> Self {
        match Self::new(config) {
            Ok(context) => context,
            Err(e) => {
                log::error!("Audio device unavailable, running silent: {}", e);
                Self::dummy()
            }
        }
    }

    pub fn is_dummy(&self) -> bool {
        self.dummy
    }

    pub fn mixer(&self) -> &AudioMixer {
        &self.mixer
    }

    /// Load a sound file, detecting WAV/OGG/FLAC from its magic bytes.
    /// None means the sound will simply never play; the error is logged.
    pub fn create_source_from_path(&self, path: &Path) -> Option<SourceHandle> {
        match source::create_source_from_path(path) {
            Ok(boxed) => Some(self.adopt(boxed)),
            Err(e) => {
                log::warn!("Failed to load {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Load one entry of the bundled CSS sound archive
    pub fn create_source_from_css(&self, path: &Path, index: u32) -> Option<SourceHandle> {
        match source::load_css_sound(path, index) {
            Ok(sample) => Some(self.adopt(Box::new(sample))),
            Err(e) => {
                log::warn!("Failed to load sound {} from {}: {}", index, path.display(), e);
                None
            }
        }
    }

    /// Register a source, converting short sounds to a memory buffer in the
    /// device format so the mix pass can skip per-pass conversion.
    fn adopt(&self, mut boxed: Box<dyn AudioSource>) -> SourceHandle {
        let length = boxed.length();
        if length > 0 && length < STREAM_THRESHOLD {
            let native = boxed.format();
            let target = self.mixer.format();
            if native != target {
                let mut data = vec![0u8; length];
                let read = boxed.read(0, &mut data);
                data.truncate(read);
                if let Some(converted) = MemorySource::convert(&data, native, target) {
                    boxed = Box::new(converted);
                }
            }
        }

        let handle = into_handle(boxed);
        if let Ok(mut sources) = self.sources.lock() {
            sources.push(Arc::clone(&handle));
        }
        handle
    }

    /// Release a source. Takes the mixer lock first so the mix pass never
    /// observes the source half-released; channels using it are dropped at
    /// the next pass.
    pub fn release_source(&self, handle: &SourceHandle) {
        let _mix_guard = self.mixer.lock_state();
        if let Ok(mut source) = handle.lock() {
            source.release();
        }
    }

    /// Drop registry entries for released sources
    pub fn collect_released(&self) {
        if let Ok(mut sources) = self.sources.lock() {
            sources.retain(|s| s.lock().map(|s| !s.is_released()).unwrap_or(false));
        }
    }

    /// Number of live (not yet released) sources in the registry
    pub fn source_count(&self) -> usize {
        self.sources.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn get_output_devices(&self) -> Vec<OutputDevice> {
        get_available_output_devices()
    }

    /// Switch output device and reinitialize the stream. Playing channels
    /// do not survive; previously obtained channel handles report done.
    pub fn set_output_device(&mut self, device: Option<DeviceId>) -> AudioResult<()> {
        self.config.device = device;
        self.mixer.reopen(&self.config)?;
        self.dummy = false;
        Ok(())
    }

    pub fn set_volume_settings(&self, settings: VolumeSettings) {
        self.mixer.set_volume_settings(settings);
    }

    /// Play a one-shot sound effect
    pub fn play_effect(
        &self,
        source: &SourceHandle,
        volume: i32,
        pan: f32,
        rate: f64,
    ) -> Option<ChannelHandle> {
        if self.dummy {
            return None;
        }
        let handle = self
            .mixer
            .play(Arc::clone(source), LoopCount::ONCE, true, false);
        handle.set_volume(volume);
        handle.set_pan(pan);
        handle.set_rate(rate);
        Some(handle)
    }

    /// Play ride music on its own mixer group
    pub fn play_music(&self, source: &SourceHandle, loop_count: LoopCount) -> Option<ChannelHandle> {
        if self.dummy {
            return None;
        }
        let handle = self.mixer.play(Arc::clone(source), loop_count, false, false);
        handle.set_group(MixerGroup::RideMusic);
        Some(handle)
    }

    /// Pause every channel in a group; playback positions are kept
    pub fn pause_group(&self, group: MixerGroup) {
        self.mixer.pause_group(group);
    }

    /// Resume a paused group at the positions it was paused at
    pub fn resume_group(&self, group: MixerGroup) {
        self.mixer.resume_group(group);
    }

    /// Stop every channel in a group
    pub fn stop_group(&self, group: MixerGroup) {
        self.mixer.stop_group(group);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AudioFormat, SampleEncoding};
    use std::io::Write;

    fn write_wav(path: &Path, sample_rate: u32, frames: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..frames {
            writer.write_sample(1000i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_dummy_context_is_silent_and_playless() {
        let ctx = AudioContext::dummy();
        assert!(ctx.is_dummy());

        let data = vec![0u8; 64];
        let src = into_handle(Box::new(MemorySource::new(
            data,
            AudioFormat::default_output(),
        )));
        assert!(ctx.play_effect(&src, 128, 0.5, 1.0).is_none());
        assert!(ctx.play_music(&src, LoopCount::Infinite).is_none());

        let mut buf = vec![0xFFu8; 32];
        ctx.mixer().fill(&mut buf);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_short_wav_is_converted_to_device_format() {
        let ctx = AudioContext::dummy();
        let file = tempfile::NamedTempFile::new().unwrap();
        write_wav(file.path(), 22050, 100);

        let source = ctx.create_source_from_path(file.path()).unwrap();
        let mut guard = source.lock().unwrap();
        assert_eq!(guard.format(), AudioFormat::default_output());
        // 100 mono frames at 22050 become 200 stereo s16 frames at 44100
        assert_eq!(guard.length(), 200 * 4);
    }

    #[test]
    fn test_group_pause_resume_and_stop_through_context() {
        let ctx = AudioContext::dummy();
        let src = into_handle(Box::new(MemorySource::new(
            vec![0u8; 4096],
            AudioFormat::default_output(),
        )));
        let handle = ctx.mixer().play(Arc::clone(&src), LoopCount::Infinite, false, false);
        handle.set_group(MixerGroup::RideMusic);

        let mut buf = vec![0u8; 64];
        ctx.mixer().fill(&mut buf);
        let at = handle.offset().unwrap();

        ctx.pause_group(MixerGroup::RideMusic);
        ctx.mixer().fill(&mut buf);
        assert_eq!(handle.offset().unwrap(), at, "pause keeps the position");

        ctx.resume_group(MixerGroup::RideMusic);
        ctx.mixer().fill(&mut buf);
        assert!(handle.offset().unwrap() > at);

        ctx.stop_group(MixerGroup::RideMusic);
        ctx.mixer().fill(&mut buf);
        assert!(handle.is_done());
    }

    #[test]
    fn test_unloadable_file_yields_none() {
        let ctx = AudioContext::dummy();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not an audio file at all").unwrap();
        assert!(ctx.create_source_from_path(file.path()).is_none());
        assert_eq!(ctx.source_count(), 0);
    }

    #[test]
    fn test_release_and_collect() {
        let ctx = AudioContext::dummy();
        let file = tempfile::NamedTempFile::new().unwrap();
        write_wav(file.path(), 44100, 16);

        let source = ctx.create_source_from_path(file.path()).unwrap();
        assert_eq!(ctx.source_count(), 1);

        ctx.release_source(&source);
        assert!(source.lock().unwrap().is_released());

        ctx.collect_released();
        assert_eq!(ctx.source_count(), 0);
    }

    #[test]
    fn test_css_sound_loads_through_context() {
        let ctx = AudioContext::dummy();

        let mut archive = Vec::new();
        archive.extend_from_slice(&1u32.to_le_bytes());
        archive.extend_from_slice(&8u32.to_le_bytes());
        archive.extend_from_slice(&8u32.to_le_bytes()); // pcm length
        archive.extend_from_slice(&1u16.to_le_bytes());
        archive.extend_from_slice(&2u16.to_le_bytes()); // stereo
        archive.extend_from_slice(&44100u32.to_le_bytes());
        archive.extend_from_slice(&176400u32.to_le_bytes());
        archive.extend_from_slice(&4u16.to_le_bytes());
        archive.extend_from_slice(&16u16.to_le_bytes());
        archive.extend_from_slice(&[0u8; 8]);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&archive).unwrap();

        let source = ctx.create_source_from_css(file.path(), 0).unwrap();
        let mut guard = source.lock().unwrap();
        assert_eq!(
            guard.format(),
            AudioFormat::new(44100, SampleEncoding::S16Le, 2)
        );
        assert_eq!(guard.length(), 8);

        assert!(ctx.create_source_from_css(file.path(), 1).is_none());
    }
}
