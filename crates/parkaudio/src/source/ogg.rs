//! OGG/Vorbis source
//!
//! Wraps `lewton`'s pull decoder. Vorbis yields audio in codec-sized blocks,
//! so decoded packets go through a [`DecodeBuffer`](super::decode::DecodeBuffer)
//! and `read` serves arbitrary byte-aligned slices out of it. `length()` has
//! to decode to the end once; the context does that at load time when
//! deciding whether to keep the sound in memory.

use std::io::{Read, Seek};

use lewton::inside_ogg::OggStreamReader;

use super::decode::DecodeBuffer;
use super::{AudioSource, SourceError};
use crate::types::{AudioFormat, SampleEncoding};

pub struct OggSource<R: Read + Seek + Send> {
    reader: Option<OggStreamReader<R>>,
    format: AudioFormat,
    buffer: DecodeBuffer,
    released: bool,
}

impl<R: Read + Seek + Send> OggSource<R> {
    pub fn new(reader: R) -> Result<Self, SourceError> {
        let stream =
            OggStreamReader::new(reader).map_err(|e| SourceError::Vorbis(e.to_string()))?;
        let format = AudioFormat::new(
            stream.ident_hdr.audio_sample_rate,
            SampleEncoding::S16Le,
            stream.ident_hdr.audio_channels as u32,
        );
        Ok(Self {
            reader: Some(stream),
            format,
            buffer: DecodeBuffer::new(),
            released: false,
        })
    }

    /// Decode packets until at least `end` bytes are buffered or the stream
    /// runs out. Decode errors end the stream early; the buffered prefix
    /// stays playable.
    fn decode_until(&mut self, end: usize) {
        let Self { reader, buffer, .. } = self;
        let Some(stream) = reader.as_mut() else {
            return;
        };
        buffer.fill_until(end, || match stream.read_dec_packet_itl() {
            Ok(pcm) => pcm,
            Err(e) => {
                log::warn!("Vorbis decode error, truncating stream: {}", e);
                None
            }
        });
        if self.buffer.is_finished() {
            self.reader = None;
        }
    }
}

impl<R: Read + Seek + Send> std::fmt::Debug for OggSource<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OggSource")
            .field("format", &self.format)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl<R: Read + Seek + Send> AudioSource for OggSource<R> {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn length(&mut self) -> usize {
        self.decode_until(usize::MAX);
        self.buffer.len()
    }

    fn read(&mut self, offset: usize, dst: &mut [u8]) -> usize {
        if self.released {
            return 0;
        }
        let end = match offset.checked_add(dst.len()) {
            Some(end) => end,
            None => return 0,
        };
        self.decode_until(end);
        self.buffer.read_at(offset, dst)
    }

    fn release(&mut self) {
        self.reader = None;
        self.buffer.clear();
        self.released = true;
    }

    fn is_released(&self) -> bool {
        self.released
    }
}
