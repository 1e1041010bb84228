//! The mixer engine
//!
//! `MixerState` owns the channel list and every scratch buffer the mix pass
//! needs; it lives behind one mutex shared between the game thread and the
//! device callback. `AudioMixer` is the owning handle that opens the output
//! stream, and `ChannelHandle` is the weak per-channel handle handed back to
//! game code.
//!
//! The mix pass itself is a pipeline per channel: pull bytes from the
//! source (loop policy applied by the channel), convert to the device
//! format, resample for the playback rate, pan, fade, then saturating
//! mix-add into the destination.

mod channel;
mod resampler;

pub use channel::ChannelId;

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use channel::AudioChannel;
use resampler::LinearResampler;

use crate::audio::{
    AudioConfig, AudioResult, CpalOutput, FillFn, OutputDriver, VolumeSettings,
};
use crate::source::{convert, SourceHandle};
use crate::types::{AudioFormat, LoopCount, MixerGroup, SampleEncoding, MIX_MAX_VOLUME};

/// Sentinel forcing the cached volume curves to be computed on first use
const VOLUME_CACHE_DIRTY: u8 = u8::MAX;

/// Scratch buffers reused across passes; they grow to the size the pass
/// needs and keep their capacity
#[derive(Default)]
struct Scratch {
    /// Raw source bytes in the source's native format
    channel_buffer: Vec<u8>,
    /// Source bytes converted to the device format
    convert_buffer: Vec<u8>,
    /// Per-channel working copy for pan/fade effects
    effect_buffer: Vec<u8>,
    /// Interleaved samples in and out of the resampler
    resample_in: Vec<i16>,
    resample_out: Vec<i16>,
}

impl Scratch {
    fn shrink(&mut self) {
        *self = Scratch::default();
    }
}

/// Per-pass constants derived from the volume settings
struct MixPass {
    format: AudioFormat,
    /// Master gain: master scalar x configured master volume
    master: f32,
    sound_adjust: f32,
    music_adjust: f32,
    sound_enabled: bool,
}

/// Everything the mixer mutates, guarded by one mutex.
///
/// The device callback locks it for the whole pass; client mutations (play,
/// stop, channel setters) lock it briefly in between.
pub struct MixerState {
    format: AudioFormat,
    channels: Vec<AudioChannel>,
    next_channel_id: u64,
    /// Application-level master gain, 0.0..=1.0
    master_volume: f32,
    settings: VolumeSettings,
    cached_sound_volume: u8,
    adjust_sound: f32,
    cached_music_volume: u8,
    adjust_music: f32,
    scratch: Scratch,
}

impl MixerState {
    fn new(format: AudioFormat) -> Self {
        Self {
            format,
            channels: Vec::new(),
            next_channel_id: 0,
            master_volume: 1.0,
            settings: VolumeSettings::default(),
            cached_sound_volume: VOLUME_CACHE_DIRTY,
            adjust_sound: 1.0,
            cached_music_volume: VOLUME_CACHE_DIRTY,
            adjust_music: 1.0,
            scratch: Scratch::default(),
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Run one mix pass into `dst`. Always leaves `dst` fully written;
    /// silence is all-zero bytes regardless of encoding.
    pub fn fill(&mut self, dst: &mut [u8]) {
        dst.fill(0);

        self.refresh_volume_adjustments();
        self.remove_dead_channels();

        if !self.settings.master_enabled || self.settings.master_volume == 0 {
            return;
        }

        let pass = MixPass {
            format: self.format,
            master: self.master_volume * self.settings.master_volume as f32 / 100.0,
            sound_adjust: self.adjust_sound,
            music_adjust: self.adjust_music,
            sound_enabled: self.settings.sound_enabled,
        };

        let Self {
            channels, scratch, ..
        } = self;
        for ch in channels.iter_mut() {
            if ch.done || ch.paused {
                continue;
            }
            if ch.group == MixerGroup::Sound && !pass.sound_enabled {
                continue;
            }
            mix_channel(&pass, ch, scratch, dst);
        }
    }

    /// Drop channels that will never sound again: source gone or released,
    /// stop requested, or finished with delete-on-done set. Removal happens
    /// before mixing, so a stopped channel is never mixed again.
    fn remove_dead_channels(&mut self) {
        self.channels.retain_mut(|ch| {
            let source_gone = match &ch.source {
                None => true,
                Some(handle) => handle.lock().map(|s| s.is_released()).unwrap_or(true),
            };
            let remove = source_gone || ch.stopping || (ch.done && ch.delete_on_done);
            if remove {
                if ch.delete_source_on_done && !source_gone {
                    if let Some(handle) = &ch.source {
                        if let Ok(mut source) = handle.lock() {
                            source.release();
                        }
                    }
                }
                ch.done = true;
            }
            !remove
        });
    }

    /// Volume percentages map onto a power curve so the sliders feel
    /// linear; recomputed only when a setting changes.
    fn refresh_volume_adjustments(&mut self) {
        if self.cached_sound_volume != self.settings.sound_volume {
            self.cached_sound_volume = self.settings.sound_volume;
            self.adjust_sound = volume_curve(self.settings.sound_volume);
        }
        if self.cached_music_volume != self.settings.ride_music_volume {
            self.cached_music_volume = self.settings.ride_music_volume;
            self.adjust_music = volume_curve(self.settings.ride_music_volume);
        }
    }

    fn channel_mut(&mut self, id: ChannelId) -> Option<&mut AudioChannel> {
        self.channels.iter_mut().find(|c| c.id == id)
    }

    fn for_group(&mut self, group: MixerGroup, f: impl Fn(&mut AudioChannel)) {
        for ch in self.channels.iter_mut().filter(|c| c.group == group) {
            f(ch);
        }
    }
}

fn volume_curve(percent: u8) -> f32 {
    (percent.min(100) as f32 / 100.0).powf(10.0 / 6.0)
}

/// Mix one channel into `dst`. Any failure along the pipeline skips the
/// channel for this pass only.
fn mix_channel(pass: &MixPass, ch: &mut AudioChannel, scratch: &mut Scratch, dst: &mut [u8]) {
    enum Stage {
        Channel,
        Convert,
        Effect,
    }

    let out_format = pass.format;
    let out_byte_rate = out_format.byte_rate() as usize;
    if out_byte_rate == 0 {
        return;
    }
    let out_frames = dst.len() / out_byte_rate;
    if out_frames == 0 {
        return;
    }

    let src_format = {
        let Some(handle) = &ch.source else {
            return;
        };
        let Ok(source) = handle.lock() else {
            return;
        };
        if source.is_released() {
            return;
        }
        source.format()
    };

    // Rate adjustment only makes sense on the s16 pipeline
    let rate = if out_format.encoding == SampleEncoding::S16Le {
        ch.rate
    } else {
        1.0
    };

    let needs_convert = src_format != out_format;
    if needs_convert && !convert::compatible(&src_format, &out_format) {
        return;
    }

    // How much source data this pass consumes, scaled by the playback rate
    // and the sample-rate ratio
    let ratio = rate * src_format.sample_rate as f64 / out_format.sample_rate as f64;
    let src_frames = ((out_frames as f64 * ratio).ceil() as usize).max(1);
    let src_bytes = src_frames * src_format.byte_rate() as usize;

    let Scratch {
        channel_buffer,
        convert_buffer,
        effect_buffer,
        resample_in,
        resample_out,
    } = scratch;

    if channel_buffer.len() < src_bytes {
        channel_buffer.resize(src_bytes, 0);
    }
    let read = ch.read(&mut channel_buffer[..src_bytes]);
    if read == 0 {
        return;
    }
    let full_read = read == src_bytes;

    let mut stage = Stage::Channel;
    let mut len = read;

    if needs_convert {
        if !convert::convert_into(
            &channel_buffer[..read],
            src_format,
            out_format,
            convert_buffer,
        ) {
            return;
        }
        len = convert_buffer.len();
        stage = Stage::Convert;
    }

    // Resample away the rate multiplier; the resampler keeps its state on
    // the channel so interpolation is continuous between passes
    if rate != 1.0 && out_format.encoding == SampleEncoding::S16Le {
        let chans = out_format.channels as usize;
        let data = match stage {
            Stage::Channel => &channel_buffer[..len],
            Stage::Convert => &convert_buffer[..len],
            Stage::Effect => &effect_buffer[..len],
        };
        resample_in.clear();
        resample_in.extend(
            data.chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]])),
        );

        if ch
            .resampler
            .as_ref()
            .map_or(true, |r| r.channels() != chans)
        {
            ch.resampler = Some(LinearResampler::new(chans));
        }
        let Some(resampler) = ch.resampler.as_mut() else {
            return;
        };
        if full_read {
            resampler.set_ratio(resample_in.len() / chans, out_frames);
        } else {
            resampler.set_rate(rate);
        }

        resample_out.clear();
        resample_out.resize(out_frames * chans, 0);
        let frames = resampler.process(resample_in, resample_out);

        effect_buffer.clear();
        for &sample in &resample_out[..frames * chans] {
            effect_buffer.extend_from_slice(&sample.to_le_bytes());
        }
        len = effect_buffer.len();
        stage = Stage::Effect;
    }

    if len == 0 {
        return;
    }

    let mut volume_adjust = pass.master;
    volume_adjust *= match ch.group {
        MixerGroup::Sound => pass.sound_adjust,
        MixerGroup::RideMusic => pass.music_adjust,
        MixerGroup::TitleMusic => 1.0,
    };
    let start_volume = (ch.old_volume as f32 * volume_adjust) as i32;
    let end_volume = if ch.stopping {
        0
    } else {
        (ch.volume as f32 * volume_adjust) as i32
    };

    let needs_pan = ch.pan != 0.5 && out_format.channels == 2;
    let fading = start_volume != end_volume;

    if (needs_pan || fading) && !matches!(stage, Stage::Effect) {
        let data = match stage {
            Stage::Channel => &channel_buffer[..len],
            Stage::Convert => &convert_buffer[..len],
            Stage::Effect => unreachable!(),
        };
        effect_buffer.clear();
        effect_buffer.extend_from_slice(data);
        stage = Stage::Effect;
    }

    if needs_pan {
        let panned = &mut effect_buffer[..len];
        match out_format.encoding {
            SampleEncoding::S16Le => effect_pan_s16(
                panned,
                ch.old_volume_l,
                ch.volume_l,
                ch.old_volume_r,
                ch.volume_r,
            ),
            SampleEncoding::U8 => effect_pan_u8(
                panned,
                ch.old_volume_l,
                ch.volume_l,
                ch.old_volume_r,
                ch.volume_r,
            ),
        }
    }

    let mix_len = len.min(dst.len());
    let mix_volume = if fading {
        // Sample-by-sample fade from the previous pass's volume; the mix
        // itself then runs at unity
        let faded = &mut effect_buffer[..mix_len];
        match out_format.encoding {
            SampleEncoding::S16Le => effect_fade_s16(faded, start_volume, end_volume),
            SampleEncoding::U8 => effect_fade_u8(faded, start_volume, end_volume),
        }
        MIX_MAX_VOLUME
    } else {
        end_volume
    };

    let data = match stage {
        Stage::Channel => &channel_buffer[..mix_len],
        Stage::Convert => &convert_buffer[..mix_len],
        Stage::Effect => &effect_buffer[..mix_len],
    };
    match out_format.encoding {
        SampleEncoding::S16Le => mix_add_s16(&mut dst[..mix_len], data, mix_volume),
        SampleEncoding::U8 => mix_add_u8(&mut dst[..mix_len], data, mix_volume),
    }

    ch.update_old_volume();
}

/// Ramp the per-side gains from last pass's values to the current ones
/// across the buffer, stereo s16
fn effect_pan_s16(data: &mut [u8], old_l: f32, new_l: f32, old_r: f32, new_r: f32) {
    let frames = data.len() / 4;
    if frames == 0 {
        return;
    }
    let step_l = (new_l - old_l) / frames as f32;
    let step_r = (new_r - old_r) / frames as f32;
    let mut gain_l = old_l;
    let mut gain_r = old_r;
    for frame in data.chunks_exact_mut(4) {
        let l = i16::from_le_bytes([frame[0], frame[1]]) as f32 * gain_l;
        let r = i16::from_le_bytes([frame[2], frame[3]]) as f32 * gain_r;
        frame[..2].copy_from_slice(&(l as i16).to_le_bytes());
        frame[2..].copy_from_slice(&(r as i16).to_le_bytes());
        gain_l += step_l;
        gain_r += step_r;
    }
}

/// Same ramp for stereo u8
fn effect_pan_u8(data: &mut [u8], old_l: f32, new_l: f32, old_r: f32, new_r: f32) {
    let frames = data.len() / 2;
    if frames == 0 {
        return;
    }
    for (i, frame) in data.chunks_exact_mut(2).enumerate() {
        let t = i as f32 / frames as f32;
        let gain_l = old_l + (new_l - old_l) * t;
        let gain_r = old_r + (new_r - old_r) * t;
        frame[0] = (frame[0] as f32 * gain_l) as u8;
        frame[1] = (frame[1] as f32 * gain_r) as u8;
    }
}

/// Linear volume fade across the buffer, per sample
fn effect_fade_s16(data: &mut [u8], start_volume: i32, end_volume: i32) {
    let samples = data.len() / 2;
    if samples == 0 {
        return;
    }
    let start = start_volume as f32 / MIX_MAX_VOLUME as f32;
    let end = end_volume as f32 / MIX_MAX_VOLUME as f32;
    for (i, chunk) in data.chunks_exact_mut(2).enumerate() {
        let gain = start + (end - start) * (i as f32 / samples as f32);
        let s = i16::from_le_bytes([chunk[0], chunk[1]]) as f32 * gain;
        chunk.copy_from_slice(&(s as i16).to_le_bytes());
    }
}

fn effect_fade_u8(data: &mut [u8], start_volume: i32, end_volume: i32) {
    let samples = data.len();
    if samples == 0 {
        return;
    }
    let start = start_volume as f32 / MIX_MAX_VOLUME as f32;
    let end = end_volume as f32 / MIX_MAX_VOLUME as f32;
    for (i, byte) in data.iter_mut().enumerate() {
        let gain = start + (end - start) * (i as f32 / samples as f32);
        *byte = (*byte as f32 * gain) as u8;
    }
}

/// Saturating mix-add of s16le samples scaled by `volume` (0..=128)
fn mix_add_s16(dst: &mut [u8], src: &[u8], volume: i32) {
    for (d, s) in dst.chunks_exact_mut(2).zip(src.chunks_exact(2)) {
        let sample = i16::from_le_bytes([s[0], s[1]]) as i32;
        let base = i16::from_le_bytes([d[0], d[1]]) as i32;
        let sum = base + sample * volume / MIX_MAX_VOLUME;
        let clamped = sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        d.copy_from_slice(&clamped.to_le_bytes());
    }
}

/// Saturating mix-add of u8 samples; the source is re-centered before
/// scaling so mixing doesn't stack the DC offset
fn mix_add_u8(dst: &mut [u8], src: &[u8], volume: i32) {
    for (d, &s) in dst.iter_mut().zip(src) {
        let sum = *d as i32 + (s as i32 - 128) * volume / MIX_MAX_VOLUME;
        *d = sum.clamp(0, u8::MAX as i32) as u8;
    }
}

/// Weak handle to a playing channel.
///
/// Every accessor takes the mixer lock itself, so handle calls are always
/// safe against the device callback. Once the channel finishes (or the
/// mixer is gone) setters become no-ops and `is_done` reports true.
#[derive(Clone)]
pub struct ChannelHandle {
    id: ChannelId,
    state: Weak<Mutex<MixerState>>,
}

impl ChannelHandle {
    fn with_channel<T>(&self, f: impl FnOnce(&mut AudioChannel) -> T) -> Option<T> {
        let state = self.state.upgrade()?;
        let mut state = state.lock().ok()?;
        let ch = state.channel_mut(self.id)?;
        Some(f(ch))
    }

    pub fn set_volume(&self, volume: i32) {
        self.with_channel(|ch| ch.set_volume(volume));
    }

    pub fn volume(&self) -> Option<i32> {
        self.with_channel(|ch| ch.volume)
    }

    pub fn set_pan(&self, pan: f32) {
        self.with_channel(|ch| ch.set_pan(pan));
    }

    pub fn pan(&self) -> Option<f32> {
        self.with_channel(|ch| ch.pan)
    }

    pub fn set_rate(&self, rate: f64) {
        self.with_channel(|ch| ch.set_rate(rate));
    }

    pub fn rate(&self) -> Option<f64> {
        self.with_channel(|ch| ch.rate)
    }

    pub fn set_group(&self, group: MixerGroup) {
        self.with_channel(|ch| ch.group = group);
    }

    pub fn group(&self) -> Option<MixerGroup> {
        self.with_channel(|ch| ch.group)
    }

    pub fn set_loop(&self, loop_count: LoopCount) {
        self.with_channel(|ch| ch.loop_count = loop_count);
    }

    pub fn loop_count(&self) -> Option<LoopCount> {
        self.with_channel(|ch| ch.loop_count)
    }

    /// Seek the channel; false when the channel is gone, has no source, or
    /// the offset is out of range
    pub fn set_offset(&self, offset: usize) -> bool {
        self.with_channel(|ch| ch.set_offset(offset)).unwrap_or(false)
    }

    pub fn offset(&self) -> Option<usize> {
        self.with_channel(|ch| ch.offset)
    }

    /// Request the channel to stop; it is removed at the next mix pass
    pub fn stop(&self) {
        self.with_channel(|ch| ch.stopping = true);
    }

    pub fn is_playing(&self) -> bool {
        self.with_channel(|ch| !ch.done).unwrap_or(false)
    }

    pub fn is_done(&self) -> bool {
        self.with_channel(|ch| ch.done).unwrap_or(true)
    }
}

/// The mixer: owns the shared state and the output stream driving it.
pub struct AudioMixer {
    state: Arc<Mutex<MixerState>>,
    driver: Option<Box<dyn OutputDriver>>,
}

impl AudioMixer {
    /// Mixer without an output stream. Used by tests and the dummy audio
    /// context; `fill` must be driven by the caller.
    pub fn for_output(format: AudioFormat) -> Self {
        Self {
            state: Arc::new(Mutex::new(MixerState::new(format))),
            driver: None,
        }
    }

    /// Open the default cpal-backed output stream
    pub fn open(config: &AudioConfig) -> AudioResult<Self> {
        Self::with_driver(Box::new(CpalOutput::new()), config)
    }

    /// Open with a caller-supplied driver
    pub fn with_driver(
        mut driver: Box<dyn OutputDriver>,
        config: &AudioConfig,
    ) -> AudioResult<Self> {
        let state = Arc::new(Mutex::new(MixerState::new(AudioFormat::default_output())));
        let format = driver.open(config, fill_callback(&state))?;
        if let Ok(mut state) = state.lock() {
            state.format = format;
        }
        Ok(Self {
            state,
            driver: Some(driver),
        })
    }

    /// Tear down and reopen the output stream, e.g. after a device change.
    /// All playing channels are dropped; previously obtained channel
    /// handles report done afterwards.
    pub fn reopen(&mut self, config: &AudioConfig) -> AudioResult<()> {
        self.close();
        let driver = self
            .driver
            .get_or_insert_with(|| Box::new(CpalOutput::new()));
        let format = driver.open(config, fill_callback(&self.state))?;
        if let Ok(mut state) = self.state.lock() {
            state.format = format;
        }
        Ok(())
    }

    /// Stop the stream and drop all channels and scratch memory
    pub fn close(&mut self) {
        if let Some(driver) = &mut self.driver {
            driver.close();
        }
        if let Ok(mut state) = self.state.lock() {
            state.channels.clear();
            state.scratch.shrink();
        }
    }

    /// Start playing a source. `delete_on_done` removes the channel when it
    /// finishes; `delete_source_on_done` additionally releases the source
    /// when the channel goes away.
    pub fn play(
        &self,
        source: SourceHandle,
        loop_count: LoopCount,
        delete_on_done: bool,
        delete_source_on_done: bool,
    ) -> ChannelHandle {
        let id;
        {
            let mut state = match self.state.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            id = ChannelId(state.next_channel_id);
            state.next_channel_id += 1;

            let mut ch = AudioChannel::new(id);
            ch.play(source, loop_count);
            ch.delete_on_done = delete_on_done;
            ch.delete_source_on_done = delete_source_on_done;
            state.channels.push(ch);
        }
        ChannelHandle {
            id,
            state: Arc::downgrade(&self.state),
        }
    }

    /// Negotiated output format
    pub fn format(&self) -> AudioFormat {
        match self.state.lock() {
            Ok(state) => state.format,
            Err(poisoned) => poisoned.into_inner().format,
        }
    }

    /// Application-level master gain, 0.0..=1.0
    pub fn set_master_volume(&self, volume: f32) {
        if let Ok(mut state) = self.state.lock() {
            state.master_volume = volume.clamp(0.0, 1.0);
        }
    }

    pub fn set_volume_settings(&self, settings: VolumeSettings) {
        if let Ok(mut state) = self.state.lock() {
            state.settings = settings;
        }
    }

    pub fn volume_settings(&self) -> VolumeSettings {
        match self.state.lock() {
            Ok(state) => state.settings,
            Err(poisoned) => poisoned.into_inner().settings,
        }
    }

    /// Pause every channel in a group. Paused channels are skipped by the
    /// mix pass without advancing, so `resume_group` picks playback up at
    /// the same offset.
    pub fn pause_group(&self, group: MixerGroup) {
        if let Ok(mut state) = self.state.lock() {
            state.for_group(group, |ch| ch.paused = true);
        }
    }

    pub fn resume_group(&self, group: MixerGroup) {
        if let Ok(mut state) = self.state.lock() {
            state.for_group(group, |ch| ch.paused = false);
        }
    }

    /// Stop every channel in a group; they are removed at the next pass
    pub fn stop_group(&self, group: MixerGroup) {
        if let Ok(mut state) = self.state.lock() {
            state.for_group(group, |ch| ch.stopping = true);
        }
    }

    /// Run one mix pass directly. Drives driver-less mixers; with a live
    /// stream the callback does this instead.
    pub fn fill(&self, dst: &mut [u8]) {
        if let Ok(mut state) = self.state.lock() {
            state.fill(dst);
        }
    }

    pub(crate) fn lock_state(&self) -> Option<MutexGuard<'_, MixerState>> {
        self.state.lock().ok()
    }
}

impl Drop for AudioMixer {
    fn drop(&mut self) {
        self.close();
    }
}

fn fill_callback(state: &Arc<Mutex<MixerState>>) -> FillFn {
    let state = Arc::clone(state);
    Box::new(move |dst: &mut [u8]| match state.lock() {
        Ok(mut state) => state.fill(dst),
        Err(_) => dst.fill(0),
    })
}
