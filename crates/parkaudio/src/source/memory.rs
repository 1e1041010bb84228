//! In-memory PCM source

use super::{convert, AudioSource};
use crate::types::AudioFormat;

/// A fully decoded sound held as a flat byte buffer.
///
/// Short sounds end up here after loading so the mix pass never touches the
/// decoders or the disk for them.
#[derive(Debug)]
pub struct MemorySource {
    data: Vec<u8>,
    format: AudioFormat,
    released: bool,
}

impl MemorySource {
    pub fn new(data: Vec<u8>, format: AudioFormat) -> Self {
        Self {
            data,
            format,
            released: false,
        }
    }

    /// Build a memory source by converting `data` from `src` format into
    /// `dst` format up front. None when the conversion cannot be built.
    pub fn convert(data: &[u8], src: AudioFormat, dst: AudioFormat) -> Option<Self> {
        convert::convert(data, src, dst).map(|converted| Self::new(converted, dst))
    }
}

impl AudioSource for MemorySource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn length(&mut self) -> usize {
        self.data.len()
    }

    fn read(&mut self, offset: usize, dst: &mut [u8]) -> usize {
        if self.released || offset >= self.data.len() {
            return 0;
        }
        let n = dst.len().min(self.data.len() - offset);
        dst[..n].copy_from_slice(&self.data[offset..offset + n]);
        n
    }

    fn release(&mut self) {
        self.data = Vec::new();
        self.released = true;
    }

    fn is_released(&self) -> bool {
        self.released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SampleEncoding;

    fn source() -> MemorySource {
        let data: Vec<u8> = (0..16).collect();
        MemorySource::new(data, AudioFormat::new(44100, SampleEncoding::U8, 1))
    }

    #[test]
    fn test_read_is_bounds_clamped() {
        let mut src = source();
        let mut buf = [0u8; 8];

        assert_eq!(src.read(0, &mut buf), 8);
        assert_eq!(&buf, &[0, 1, 2, 3, 4, 5, 6, 7]);

        // Partial read at the tail
        assert_eq!(src.read(12, &mut buf), 4);
        assert_eq!(&buf[..4], &[12, 13, 14, 15]);

        // Past the end
        assert_eq!(src.read(16, &mut buf), 0);
        assert_eq!(src.read(1000, &mut buf), 0);
    }

    #[test]
    fn test_release_is_idempotent_and_silences_reads() {
        let mut src = source();
        src.release();
        assert!(src.is_released());
        assert_eq!(src.length(), 0);

        let mut buf = [0u8; 4];
        assert_eq!(src.read(0, &mut buf), 0);

        src.release();
        assert!(src.is_released());
    }

    #[test]
    fn test_convert_constructor() {
        let data = [0u8, 128, 255];
        let src_fmt = AudioFormat::new(22050, SampleEncoding::U8, 1);
        let dst_fmt = AudioFormat::new(22050, SampleEncoding::S16Le, 2);

        let mut converted = MemorySource::convert(&data, src_fmt, dst_fmt).unwrap();
        assert_eq!(converted.format(), dst_fmt);
        assert_eq!(converted.length(), 3 * 4);

        let bad_fmt = AudioFormat::new(0, SampleEncoding::U8, 1);
        assert!(MemorySource::convert(&data, bad_fmt, dst_fmt).is_none());
    }
}
