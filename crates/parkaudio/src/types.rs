//! Common types for the audio subsystem
//!
//! Fundamental value types shared by the decoders, the mixer and the device
//! layer: PCM format descriptors, mixer groups and loop counts.

/// Maximum mix volume, matching the classic SDL convention.
///
/// Channel volumes are expressed on a 0..=128 scale; a mix volume of 128
/// passes samples through unscaled.
pub const MIX_MAX_VOLUME: i32 = 128;

/// Sample encodings the engine understands. PCM only; the decoders normalize
/// everything else to one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleEncoding {
    /// Unsigned 8-bit PCM
    U8,
    /// Signed 16-bit little-endian PCM
    S16Le,
}

impl SampleEncoding {
    /// Bits per sample
    pub fn bits(&self) -> u32 {
        match self {
            SampleEncoding::U8 => 8,
            SampleEncoding::S16Le => 16,
        }
    }

    /// Bytes per sample
    #[inline]
    pub fn bytes_per_sample(&self) -> u32 {
        self.bits() / 8
    }
}

/// PCM stream format: sample rate, encoding and channel count.
///
/// Immutable value with structural equality; two formats compare equal when
/// all three fields match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub encoding: SampleEncoding,
    pub channels: u32,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, encoding: SampleEncoding, channels: u32) -> Self {
        Self {
            sample_rate,
            encoding,
            channels,
        }
    }

    /// The format the mixer requests from the device: 44.1kHz s16 stereo.
    pub fn default_output() -> Self {
        Self::new(44100, SampleEncoding::S16Le, 2)
    }

    /// Bytes per frame (one sample for every channel)
    #[inline]
    pub fn byte_rate(&self) -> u32 {
        self.encoding.bytes_per_sample() * self.channels
    }

    /// Bytes per second of audio in this format
    #[inline]
    pub fn bytes_per_second(&self) -> u32 {
        self.byte_rate() * self.sample_rate
    }

    /// Round a byte offset down to the nearest frame boundary
    #[inline]
    pub fn align_offset(&self, offset: usize) -> usize {
        let frame = self.byte_rate() as usize;
        if frame == 0 {
            return 0;
        }
        (offset / frame) * frame
    }
}

/// Mixer group a channel belongs to. Groups gate audibility against the
/// volume settings (sound effects can be disabled while music keeps playing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MixerGroup {
    #[default]
    Sound,
    RideMusic,
    TitleMusic,
}

/// How many times a channel repeats after the current play-through.
///
/// `Finite(0)` plays once; `Finite(n)` rewinds n more times; `Infinite`
/// rewinds forever until stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCount {
    Finite(u32),
    Infinite,
}

impl LoopCount {
    /// Play once, no repeats
    pub const ONCE: LoopCount = LoopCount::Finite(0);
}

impl Default for LoopCount {
    fn default() -> Self {
        LoopCount::ONCE
    }
}
