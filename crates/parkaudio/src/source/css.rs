//! Bundled CSS sound archive
//!
//! The base game ships its sound effects in a single archive file: a
//! little-endian u32 sound count, a table of u32 absolute offsets, and per
//! sound a u32 PCM byte length followed by a 16-byte WAVE-style format
//! header and the raw PCM. The header's encoding tag is unreliable; the
//! data is always signed 16-bit, so the encoding is forced to s16le.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use super::{MemorySource, SourceError};
use crate::types::{AudioFormat, SampleEncoding};

fn read_u32_le<R: Read>(reader: &mut R) -> Result<u32, SourceError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u16_le<R: Read>(reader: &mut R) -> Result<u16, SourceError> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

/// Number of sounds in the archive
pub fn sound_count(path: &Path) -> Result<u32, SourceError> {
    let mut reader = BufReader::new(File::open(path)?);
    read_u32_le(&mut reader)
}

/// Load one sound out of the archive, fully decoded into memory.
pub fn load_css_sound(path: &Path, index: u32) -> Result<MemorySource, SourceError> {
    let mut reader = BufReader::new(File::open(path)?);

    let count = read_u32_le(&mut reader)?;
    if index >= count {
        return Err(SourceError::BadSoundIndex { index, count });
    }

    reader.seek(SeekFrom::Start(4 + index as u64 * 4))?;
    let sound_offset = read_u32_le(&mut reader)?;

    reader.seek(SeekFrom::Start(sound_offset as u64))?;
    let pcm_length = read_u32_le(&mut reader)?;

    let _encoding = read_u16_le(&mut reader)?;
    let channels = read_u16_le(&mut reader)?;
    let sample_rate = read_u32_le(&mut reader)?;
    let _byte_rate = read_u32_le(&mut reader)?;
    let _block_align = read_u16_le(&mut reader)?;
    let _bits_per_sample = read_u16_le(&mut reader)?;

    // The length field is untrusted; read incrementally so a corrupt value
    // cannot force a huge up-front allocation
    let mut data = Vec::new();
    reader
        .by_ref()
        .take(pcm_length as u64)
        .read_to_end(&mut data)?;
    if data.len() < pcm_length as usize {
        return Err(SourceError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "sound data shorter than its recorded length",
        )));
    }

    Ok(MemorySource::new(
        data,
        AudioFormat::new(sample_rate, SampleEncoding::S16Le, channels as u32),
    ))
}
