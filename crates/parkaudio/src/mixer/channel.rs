//! Mixer channel
//!
//! A playing instance of a source: playback cursor, loop policy, gains and
//! lifecycle flags. Channels are plain data owned by the mixer state and are
//! only ever touched under the mixer lock, so nothing here locks.

use super::resampler::LinearResampler;
use crate::source::SourceHandle;
use crate::types::{LoopCount, MixerGroup, MIX_MAX_VOLUME};

/// Stable identifier for a channel within one mixer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub(crate) u64);

pub struct AudioChannel {
    pub(crate) id: ChannelId,
    pub(crate) source: Option<SourceHandle>,
    pub(crate) group: MixerGroup,

    /// Playback rate multiplier, clamped to at least 0.001
    pub(crate) rate: f64,
    /// Byte offset into the source, always frame-aligned
    pub(crate) offset: usize,
    pub(crate) loop_count: LoopCount,

    /// Mix volume 0..=128
    pub(crate) volume: i32,
    /// Pan position, 0.0 = hard left, 0.5 = center, 1.0 = hard right
    pub(crate) pan: f32,
    pub(crate) volume_l: f32,
    pub(crate) volume_r: f32,

    // Snapshots from the previous mix pass, used for fades and pan ramps
    pub(crate) old_volume: i32,
    pub(crate) old_volume_l: f32,
    pub(crate) old_volume_r: f32,

    pub(crate) stopping: bool,
    /// Skipped by the mix pass without advancing; cleared on resume
    pub(crate) paused: bool,
    pub(crate) done: bool,
    pub(crate) delete_on_done: bool,
    pub(crate) delete_source_on_done: bool,

    pub(crate) resampler: Option<LinearResampler>,
}

impl AudioChannel {
    pub(crate) fn new(id: ChannelId) -> Self {
        Self {
            id,
            source: None,
            group: MixerGroup::Sound,
            rate: 1.0,
            offset: 0,
            loop_count: LoopCount::ONCE,
            volume: MIX_MAX_VOLUME,
            pan: 0.5,
            volume_l: 1.0,
            volume_r: 1.0,
            old_volume: 0,
            old_volume_l: 0.0,
            old_volume_r: 0.0,
            stopping: false,
            paused: false,
            done: true,
            delete_on_done: false,
            delete_source_on_done: false,
            resampler: None,
        }
    }

    /// Attach a source and start playing from the beginning
    pub(crate) fn play(&mut self, source: SourceHandle, loop_count: LoopCount) {
        self.source = Some(source);
        self.loop_count = loop_count;
        self.offset = 0;
        self.done = false;
        self.stopping = false;
        self.paused = false;
        self.resampler = None;
    }

    /// Pull bytes from the source, advancing the cursor and applying the
    /// loop policy at end of data. Returns the number of bytes produced.
    pub(crate) fn read(&mut self, dst: &mut [u8]) -> usize {
        let Some(handle) = self.source.clone() else {
            return 0;
        };
        let Ok(mut source) = handle.lock() else {
            return 0;
        };
        if source.is_released() {
            return 0;
        }
        let length = source.length();
        if length == 0 {
            return 0;
        }

        let mut total = 0;
        while total < dst.len() {
            if self.offset >= length {
                match self.loop_count {
                    LoopCount::Finite(0) => {
                        self.done = true;
                        break;
                    }
                    LoopCount::Finite(n) => {
                        self.loop_count = LoopCount::Finite(n - 1);
                        self.offset = 0;
                    }
                    LoopCount::Infinite => {
                        self.offset = 0;
                    }
                }
            }
            let read = source.read(self.offset, &mut dst[total..]);
            if read == 0 {
                // Source delivered less than its reported length
                break;
            }
            self.offset += read;
            total += read;
        }
        total
    }

    /// Seek to a byte offset, rounded down to a frame boundary. Rejected
    /// when there is no source or the offset is at/past the end.
    pub(crate) fn set_offset(&mut self, offset: usize) -> bool {
        let Some(handle) = self.source.clone() else {
            return false;
        };
        let Ok(mut source) = handle.lock() else {
            return false;
        };
        if offset >= source.length() {
            return false;
        }
        self.offset = source.format().align_offset(offset);
        true
    }

    pub(crate) fn set_volume(&mut self, volume: i32) {
        self.volume = volume.clamp(0, MIX_MAX_VOLUME);
    }

    /// Set the pan position and derive the per-side gains.
    ///
    /// The louder side stays at 1.0; the quieter side is attenuated on a dB
    /// curve, 100dB at full deflection.
    pub(crate) fn set_pan(&mut self, pan: f32) {
        self.pan = pan.clamp(0.0, 1.0);
        let decibels = ((self.pan - 0.5).abs() * 2.0) as f64 * 100.0;
        let attenuation = 10f64.powf(decibels / 20.0);
        if self.pan <= 0.5 {
            self.volume_l = 1.0;
            self.volume_r = (1.0 / attenuation) as f32;
        } else {
            self.volume_r = 1.0;
            self.volume_l = (1.0 / attenuation) as f32;
        }
    }

    pub(crate) fn set_rate(&mut self, rate: f64) {
        self.rate = rate.max(0.001);
    }

    /// Snapshot current gains for the next pass's fades and pan ramps
    pub(crate) fn update_old_volume(&mut self) {
        self.old_volume = self.volume;
        self.old_volume_l = self.volume_l;
        self.old_volume_r = self.volume_r;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{into_handle, MemorySource};
    use crate::types::{AudioFormat, SampleEncoding};

    fn channel_with_source(bytes: usize) -> AudioChannel {
        let data: Vec<u8> = (0..bytes).map(|i| i as u8).collect();
        let source = MemorySource::new(data, AudioFormat::new(44100, SampleEncoding::S16Le, 2));
        let mut ch = AudioChannel::new(ChannelId(1));
        ch.play(into_handle(Box::new(source)), LoopCount::ONCE);
        ch
    }

    #[test]
    fn test_pan_gains_center_and_sides() {
        let mut ch = AudioChannel::new(ChannelId(0));

        ch.set_pan(0.5);
        assert_eq!(ch.volume_l, 1.0);
        assert_eq!(ch.volume_r, 1.0);

        ch.set_pan(0.25);
        assert_eq!(ch.volume_l, 1.0);
        assert!(ch.volume_r > 0.0 && ch.volume_r < 1.0);

        ch.set_pan(0.75);
        assert_eq!(ch.volume_r, 1.0);
        assert!(ch.volume_l > 0.0 && ch.volume_l < 1.0);
    }

    #[test]
    fn test_pan_attenuation_is_monotonic_and_positive() {
        let mut ch = AudioChannel::new(ChannelId(0));
        let mut last = 1.0f32;
        for step in 1..=10 {
            ch.set_pan(0.5 + step as f32 * 0.05);
            assert!(ch.volume_l < last, "left gain must fall as pan moves right");
            assert!(ch.volume_l > 0.0, "gain never reaches zero");
            last = ch.volume_l;
        }
    }

    #[test]
    fn test_pan_is_clamped() {
        let mut ch = AudioChannel::new(ChannelId(0));
        ch.set_pan(2.0);
        assert_eq!(ch.pan, 1.0);
        ch.set_pan(-1.0);
        assert_eq!(ch.pan, 0.0);
    }

    #[test]
    fn test_rate_clamp() {
        let mut ch = AudioChannel::new(ChannelId(0));
        ch.set_rate(0.0);
        assert_eq!(ch.rate, 0.001);
        ch.set_rate(-5.0);
        assert_eq!(ch.rate, 0.001);
        ch.set_rate(2.5);
        assert_eq!(ch.rate, 2.5);
    }

    #[test]
    fn test_volume_clamp() {
        let mut ch = AudioChannel::new(ChannelId(0));
        ch.set_volume(500);
        assert_eq!(ch.volume, MIX_MAX_VOLUME);
        ch.set_volume(-3);
        assert_eq!(ch.volume, 0);
    }

    #[test]
    fn test_set_offset_rounds_down_and_rejects_past_end() {
        let mut ch = channel_with_source(64);

        assert!(ch.set_offset(7));
        assert_eq!(ch.offset, 4); // stereo s16 frames are 4 bytes

        assert!(!ch.set_offset(64));
        assert!(!ch.set_offset(1000));
        assert_eq!(ch.offset, 4);

        let mut empty = AudioChannel::new(ChannelId(2));
        assert!(!empty.set_offset(0));
    }

    #[test]
    fn test_read_once_sets_done_at_end() {
        let mut ch = channel_with_source(16);
        let mut buf = [0u8; 32];

        assert_eq!(ch.read(&mut buf), 16);
        assert!(ch.done);
        assert_eq!(ch.read(&mut buf), 0);
    }

    #[test]
    fn test_read_finite_loop_rewinds_then_finishes() {
        let mut ch = channel_with_source(16);
        ch.loop_count = LoopCount::Finite(1);

        let mut buf = [0u8; 48];
        assert_eq!(ch.read(&mut buf), 32);
        assert!(ch.done);
        assert_eq!(&buf[16..20], &buf[0..4], "second play-through rewinds");
    }

    #[test]
    fn test_read_infinite_loop_never_finishes() {
        let mut ch = channel_with_source(8);
        ch.loop_count = LoopCount::Infinite;

        let mut buf = [0u8; 64];
        assert_eq!(ch.read(&mut buf), 64);
        assert!(!ch.done);
    }

    #[test]
    fn test_released_source_reads_nothing() {
        let mut ch = channel_with_source(16);
        if let Some(handle) = &ch.source {
            handle.lock().unwrap().release();
        }
        let mut buf = [0u8; 16];
        assert_eq!(ch.read(&mut buf), 0);
    }
}
