//! Streaming WAV source
//!
//! Hand-parsed RIFF/WAVE. Only plain PCM at 8 or 16 bits is accepted; the
//! chunk scan tolerates the metadata chunks commonly found in the wild
//! (`fact`, `LIST`, `bext`, `JUNK`) and nothing else. Reads seek within the
//! `data` chunk, so the file stays on disk however long the sound is.

use std::io::{Read, Seek, SeekFrom};

use super::{AudioSource, SourceError};
use crate::types::{AudioFormat, SampleEncoding};

const WAVE_FORMAT_PCM: u16 = 0x0001;

/// Chunks skipped while scanning for `fmt ` / `data`
const SKIPPABLE_CHUNKS: [&[u8; 4]; 4] = [b"fact", b"LIST", b"bext", b"JUNK"];

#[derive(Debug)]
pub struct WavSource<R: Read + Seek + Send> {
    reader: R,
    format: AudioFormat,
    data_begin: u64,
    length: usize,
    released: bool,
}

impl<R: Read + Seek + Send> WavSource<R> {
    pub fn new(mut reader: R) -> Result<Self, SourceError> {
        let mut riff = [0u8; 12];
        reader.read_exact(&mut riff)?;
        if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
            return Err(SourceError::NotWave);
        }

        let fmt_size = find_chunk(&mut reader, b"fmt ")?;
        let fmt_begin = reader.stream_position()?;

        let mut fmt = [0u8; 16];
        reader.read_exact(&mut fmt)?;
        let encoding = u16::from_le_bytes([fmt[0], fmt[1]]);
        let channels = u16::from_le_bytes([fmt[2], fmt[3]]);
        let sample_rate = u32::from_le_bytes([fmt[4], fmt[5], fmt[6], fmt[7]]);
        let bits_per_sample = u16::from_le_bytes([fmt[14], fmt[15]]);

        if encoding != WAVE_FORMAT_PCM {
            return Err(SourceError::UnsupportedEncoding(encoding));
        }
        let encoding = match bits_per_sample {
            8 => SampleEncoding::U8,
            16 => SampleEncoding::S16Le,
            other => return Err(SourceError::UnsupportedBitDepth(other)),
        };

        // fmt chunks can carry extension bytes past the 16 we use
        reader.seek(SeekFrom::Start(fmt_begin + fmt_size as u64))?;

        let data_size = find_chunk(&mut reader, b"data")?;
        let data_begin = reader.stream_position()?;

        Ok(Self {
            reader,
            format: AudioFormat::new(sample_rate, encoding, channels as u32),
            data_begin,
            length: data_size as usize,
            released: false,
        })
    }
}

/// Advance to the named chunk, skipping known metadata chunks, and return
/// its size. The reader is left positioned at the chunk payload.
fn find_chunk<R: Read + Seek>(reader: &mut R, name: &[u8; 4]) -> Result<u32, SourceError> {
    loop {
        let mut header = [0u8; 8];
        if reader.read_exact(&mut header).is_err() {
            return Err(SourceError::MissingChunk(chunk_label(name)));
        }
        let id: [u8; 4] = [header[0], header[1], header[2], header[3]];
        let size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        if &id == name {
            return Ok(size);
        }
        if SKIPPABLE_CHUNKS.iter().any(|s| s.eq_ignore_ascii_case(&id)) {
            reader.seek(SeekFrom::Current(size as i64))?;
            continue;
        }
        return Err(SourceError::MissingChunk(chunk_label(name)));
    }
}

fn chunk_label(name: &[u8; 4]) -> &'static str {
    match name {
        b"fmt " => "fmt",
        b"data" => "data",
        _ => "chunk",
    }
}

impl<R: Read + Seek + Send> AudioSource for WavSource<R> {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn length(&mut self) -> usize {
        self.length
    }

    fn read(&mut self, offset: usize, dst: &mut [u8]) -> usize {
        if self.released || offset >= self.length {
            return 0;
        }
        let want = dst.len().min(self.length - offset);
        if self
            .reader
            .seek(SeekFrom::Start(self.data_begin + offset as u64))
            .is_err()
        {
            return 0;
        }

        let mut total = 0;
        while total < want {
            match self.reader.read(&mut dst[total..want]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(_) => break,
            }
        }
        total
    }

    fn release(&mut self) {
        self.released = true;
        self.length = 0;
    }

    fn is_released(&self) -> bool {
        self.released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Hand-build a WAV byte stream with optional extra chunks before `data`
    fn build_wav(extra_chunks: &[(&[u8; 4], &[u8])], pcm: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(b"WAVE");

        body.extend_from_slice(b"fmt ");
        body.extend_from_slice(&16u32.to_le_bytes());
        body.extend_from_slice(&1u16.to_le_bytes()); // PCM
        body.extend_from_slice(&1u16.to_le_bytes()); // mono
        body.extend_from_slice(&22050u32.to_le_bytes());
        body.extend_from_slice(&44100u32.to_le_bytes()); // byte rate
        body.extend_from_slice(&2u16.to_le_bytes()); // block align
        body.extend_from_slice(&16u16.to_le_bytes()); // bits

        for (name, payload) in extra_chunks {
            body.extend_from_slice(*name);
            body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            body.extend_from_slice(payload);
        }

        body.extend_from_slice(b"data");
        body.extend_from_slice(&(pcm.len() as u32).to_le_bytes());
        body.extend_from_slice(pcm);

        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn test_parses_plain_wav() {
        let pcm: Vec<u8> = (0..32).collect();
        let bytes = build_wav(&[], &pcm);
        let mut src = WavSource::new(Cursor::new(bytes)).unwrap();

        assert_eq!(
            src.format(),
            AudioFormat::new(22050, SampleEncoding::S16Le, 1)
        );
        assert_eq!(src.length(), 32);

        let mut buf = [0u8; 32];
        assert_eq!(src.read(0, &mut buf), 32);
        assert_eq!(&buf[..], &pcm[..]);
    }

    #[test]
    fn test_skips_metadata_chunks() {
        let pcm: Vec<u8> = (0..8).collect();
        let bytes = build_wav(
            &[
                (b"LIST", b"INFOsome tagging data"),
                (b"JUNK", &[0u8; 12]),
                (b"fact", &4u32.to_le_bytes()),
            ],
            &pcm,
        );
        let mut src = WavSource::new(Cursor::new(bytes)).unwrap();
        assert_eq!(src.length(), 8);

        let mut buf = [0u8; 8];
        assert_eq!(src.read(0, &mut buf), 8);
        assert_eq!(&buf[..], &pcm[..]);
    }

    #[test]
    fn test_unknown_chunk_before_data_is_an_error() {
        let bytes = build_wav(&[(b"cue ", &[0u8; 4])], &[0u8; 4]);
        let err = WavSource::new(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, SourceError::MissingChunk("data")));
    }

    #[test]
    fn test_rejects_non_pcm() {
        let pcm = [0u8; 4];
        let mut bytes = build_wav(&[], &pcm);
        // Patch the encoding tag to IEEE float (0x0003)
        bytes[20] = 3;
        let err = WavSource::new(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedEncoding(0x0003)));
    }

    #[test]
    fn test_rejects_odd_bit_depths() {
        let pcm = [0u8; 4];
        let mut bytes = build_wav(&[], &pcm);
        // Patch bits-per-sample to 24
        bytes[34] = 24;
        let err = WavSource::new(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedBitDepth(24)));
    }

    #[test]
    fn test_reads_clamp_and_resume() {
        let pcm: Vec<u8> = (0..16).collect();
        let bytes = build_wav(&[], &pcm);
        let mut src = WavSource::new(Cursor::new(bytes)).unwrap();

        let mut buf = [0u8; 10];
        assert_eq!(src.read(10, &mut buf), 6);
        assert_eq!(&buf[..6], &pcm[10..]);
        assert_eq!(src.read(16, &mut buf), 0);

        // Reads are stateless with respect to position
        assert_eq!(src.read(0, &mut buf), 10);
        assert_eq!(&buf[..], &pcm[..10]);
    }

    #[test]
    fn test_hound_written_fixture_round_trips() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut writer = hound::WavWriter::create(file.path(), spec).unwrap();
        for i in 0..64i16 {
            writer.write_sample(i).unwrap();
            writer.write_sample(-i).unwrap();
        }
        writer.finalize().unwrap();

        let mut src = super::super::create_source_from_path(file.path()).unwrap();
        assert_eq!(
            src.format(),
            AudioFormat::new(44100, SampleEncoding::S16Le, 2)
        );
        assert_eq!(src.length(), 64 * 2 * 2);

        let mut buf = vec![0u8; src.length()];
        assert_eq!(src.read(0, &mut buf), buf.len());
        let first = i16::from_le_bytes([buf[0], buf[1]]);
        let second = i16::from_le_bytes([buf[2], buf[3]]);
        assert_eq!((first, second), (0, 0));
        let l = i16::from_le_bytes([buf[4], buf[5]]);
        let r = i16::from_le_bytes([buf[6], buf[7]]);
        assert_eq!((l, r), (1, -1));
    }
}
