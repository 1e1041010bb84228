//! FLAC source
//!
//! Symphonia probe + FLAC decoder. Same incremental decode-buffer contract
//! as the OGG source: decoded frames are normalized to interleaved s16le and
//! buffered so `read` can slice byte-aligned.

use std::fs::File;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::decode::DecodeBuffer;
use super::{AudioSource, SourceError};
use crate::types::{AudioFormat, SampleEncoding};

struct DecodeState {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
}

pub struct FlacSource {
    state: Option<DecodeState>,
    format: AudioFormat,
    buffer: DecodeBuffer,
    released: bool,
}

impl FlacSource {
    pub fn new(file: File) -> Result<Self, SourceError> {
        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let mut hint = Hint::new();
        hint.with_extension("flac");

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| SourceError::Flac(e.to_string()))?;
        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| SourceError::Flac("no decodable track".to_string()))?;
        let track_id = track.id;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| SourceError::Flac("missing sample rate".to_string()))?;
        let channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u32)
            .ok_or_else(|| SourceError::Flac("missing channel layout".to_string()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| SourceError::Flac(e.to_string()))?;

        Ok(Self {
            state: Some(DecodeState {
                reader,
                decoder,
                track_id,
            }),
            format: AudioFormat::new(sample_rate, SampleEncoding::S16Le, channels),
            buffer: DecodeBuffer::new(),
            released: false,
        })
    }

    fn decode_until(&mut self, end: usize) {
        let Self { state, buffer, .. } = self;
        let Some(state) = state.as_mut() else {
            return;
        };
        buffer.fill_until(end, || loop {
            let packet = match state.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(_)) | Err(SymphoniaError::ResetRequired) => {
                    // End of stream
                    return None;
                }
                Err(e) => {
                    log::warn!("FLAC read error, truncating stream: {}", e);
                    return None;
                }
            };
            if packet.track_id() != state.track_id {
                continue;
            }

            match state.decoder.decode(&packet) {
                Ok(audio) => {
                    let spec = *audio.spec();
                    let mut samples = SampleBuffer::<i16>::new(audio.capacity() as u64, spec);
                    samples.copy_interleaved_ref(audio);
                    return Some(samples.samples().to_vec());
                }
                // A corrupt frame is skippable; keep going
                Err(SymphoniaError::DecodeError(e)) => {
                    log::debug!("Skipping corrupt FLAC frame: {}", e);
                }
                Err(e) => {
                    log::warn!("FLAC decode error, truncating stream: {}", e);
                    return None;
                }
            }
        });
        if self.buffer.is_finished() {
            self.state = None;
        }
    }
}

impl AudioSource for FlacSource {
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
        self.state = None;
        self.buffer.clear();
        self.released = true;
    }

    fn is_released(&self) -> bool {
        self.released
    }
}
