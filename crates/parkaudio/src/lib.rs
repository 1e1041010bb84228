//! parkaudio
//!
//! The audio subsystem for the park simulation: decoders for the supported
//! sound containers (WAV, OGG/Vorbis, FLAC and the bundled CSS archive), a
//! software mixer with per-channel volume, pan, rate and looping, and a
//! cpal-backed output layer.
//!
//! Game code goes through [`context::AudioContext`]: load sources, play
//! them on mixer groups, adjust the channel through its handle. Everything
//! below that is byte buffers in a fixed [`AudioFormat`].

pub mod audio;
pub mod context;
pub mod mixer;
pub mod source;
pub mod types;

pub use context::AudioContext;
pub use types::{AudioFormat, LoopCount, MixerGroup, SampleEncoding, MIX_MAX_VOLUME};
