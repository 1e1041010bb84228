//! Audio sources
//!
//! A source is anything that yields PCM bytes in a fixed format: a flat
//! memory buffer, a WAV file streamed from disk, an OGG/Vorbis or FLAC
//! decoder, or an entry from the bundled CSS sound archive.
//!
//! Sources are shared between the game thread and the mix pass through a
//! [`SourceHandle`]; the mixer locks a source only for the duration of a
//! single `read`.

pub mod convert;
mod css;
mod decode;
mod flac;
mod memory;
mod ogg;
mod wav;

pub use css::{load_css_sound, sound_count};
pub use flac::FlacSource;
pub use memory::MemorySource;
pub use ogg::OggSource;
pub use wav::WavSource;

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::types::AudioFormat;

/// Errors raised while opening or decoding a source
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Magic bytes matched none of the supported containers
    #[error("Unrecognized audio container")]
    UnsupportedCodec,

    #[error("Not a RIFF/WAVE file")]
    NotWave,

    #[error("Missing required chunk: {0}")]
    MissingChunk(&'static str),

    /// WAV encoding tags other than plain PCM (0x0001) are rejected
    #[error("Unsupported WAV encoding tag: {0:#06x}")]
    UnsupportedEncoding(u16),

    #[error("Unsupported bit depth: {0}")]
    UnsupportedBitDepth(u16),

    #[error("Vorbis decode error: {0}")]
    Vorbis(String),

    #[error("FLAC decode error: {0}")]
    Flac(String),

    #[error("Sound {index} out of range ({count} sounds in archive)")]
    BadSoundIndex { index: u32, count: u32 },
}

/// A PCM byte stream with a fixed format.
///
/// `read` copies at most `dst.len()` bytes starting at `offset` and reports
/// how many were produced; short reads signal end of data. After `release`
/// every read returns 0 and the decoder resources are gone; callers must
/// check `is_released` before touching a shared source.
pub trait AudioSource: Send {
    /// Stream format, fixed when the source is opened
    fn format(&self) -> AudioFormat;

    /// Total length in bytes of the stream in its native format.
    /// Compressed sources may have to decode to the end to answer, so the
    /// first call can be expensive; the result is cached.
    fn length(&mut self) -> usize;

    /// Copy up to `dst.len()` bytes starting at byte `offset`
    fn read(&mut self, offset: usize, dst: &mut [u8]) -> usize;

    /// Drop decoder state and buffers. Idempotent.
    fn release(&mut self);

    fn is_released(&self) -> bool;
}

impl std::fmt::Debug for dyn AudioSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSource")
            .field("format", &self.format())
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

/// Shared, lockable source handle. Channels hold clones; the context keeps
/// one in its registry until the source is released.
pub type SourceHandle = Arc<Mutex<Box<dyn AudioSource>>>;

/// Wrap a boxed source into a shareable handle
pub fn into_handle(source: Box<dyn AudioSource>) -> SourceHandle {
    Arc::new(Mutex::new(source))
}

/// Open an audio file, detecting the container from its magic bytes
/// (`RIFF`, `OggS`, `fLaC`).
pub fn create_source_from_path(path: &Path) -> Result<Box<dyn AudioSource>, SourceError> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;
    file.seek(SeekFrom::Start(0))?;

    match &magic {
        b"RIFF" => Ok(Box::new(WavSource::new(BufReader::new(file))?)),
        b"OggS" => Ok(Box::new(OggSource::new(BufReader::new(file))?)),
        b"fLaC" => Ok(Box::new(FlacSource::new(file)?)),
        _ => Err(SourceError::UnsupportedCodec),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_unknown_magic_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"MIDIdata and then some").unwrap();
        let err = create_source_from_path(file.path()).unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedCodec));
    }

    #[test]
    fn test_truncated_ogg_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"OggS junk that is not a vorbis stream").unwrap();
        let err = create_source_from_path(file.path()).unwrap_err();
        assert!(matches!(err, SourceError::Vorbis(_) | SourceError::Io(_)));
    }

    #[test]
    fn test_garbage_flac_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"fLaC garbage garbage garbage").unwrap();
        let err = create_source_from_path(file.path()).unwrap_err();
        assert!(matches!(err, SourceError::Flac(_) | SourceError::Io(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = create_source_from_path(Path::new("/nonexistent/beep.wav")).unwrap_err();
        assert!(matches!(err, SourceError::Io(_)));
    }
}
