//! PCM format conversion kernels
//!
//! One-shot conversion between the closed set of formats the engine
//! supports: u8 and s16le encodings, arbitrary channel counts, linear
//! sample-rate conversion with an exact output length of
//! `floor(frames * dst_rate / src_rate)`.
//!
//! Used by `MemorySource::convert` when a sound is loaded, and by the mixer
//! every pass for channels whose source format differs from the device
//! format. The mixer path reuses a scratch `Vec`, so after warm-up no
//! allocation happens here.

use crate::types::{AudioFormat, SampleEncoding};

/// Whether a conversion between these two formats can be carried out.
/// Degenerate descriptors (zero channels or zero rate) are rejected.
pub fn compatible(src: &AudioFormat, dst: &AudioFormat) -> bool {
    src.channels > 0 && dst.channels > 0 && src.sample_rate > 0 && dst.sample_rate > 0
}

/// Convert `data` from `src` format to `dst` format, appending to a cleared
/// `out`. Returns false (leaving `out` empty) when the conversion cannot be
/// built.
pub fn convert_into(data: &[u8], src: AudioFormat, dst: AudioFormat, out: &mut Vec<u8>) -> bool {
    out.clear();
    if !compatible(&src, &dst) {
        return false;
    }

    let in_frames = data.len() / src.byte_rate() as usize;
    let out_frames =
        (in_frames as u64 * dst.sample_rate as u64 / src.sample_rate as u64) as usize;
    out.reserve(out_frames * dst.byte_rate() as usize);

    if in_frames == 0 {
        return true;
    }

    // Input frames per output frame
    let step = src.sample_rate as f64 / dst.sample_rate as f64;

    for o in 0..out_frames {
        let pos = o as f64 * step;
        let i0 = pos as usize;
        let frac = pos - i0 as f64;
        let i0 = i0.min(in_frames - 1);
        let i1 = (i0 + 1).min(in_frames - 1);

        for ch in 0..dst.channels {
            let a = frame_sample(data, &src, i0, ch, dst.channels) as f64;
            let b = frame_sample(data, &src, i1, ch, dst.channels) as f64;
            let v = (a + (b - a) * frac) as i32;
            write_sample(out, dst.encoding, v.clamp(i16::MIN as i32, i16::MAX as i32) as i16);
        }
    }

    true
}

/// Convert a flat buffer, returning a fresh Vec. None when incompatible.
pub fn convert(data: &[u8], src: AudioFormat, dst: AudioFormat) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    if convert_into(data, src, dst, &mut out) {
        Some(out)
    } else {
        None
    }
}

/// Fetch the sample for destination channel `dst_ch` of input frame `frame`,
/// normalized to s16.
///
/// Channel mapping: downmixing to mono averages all input channels; other
/// narrowing takes the leading channels; widening repeats the last input
/// channel (so mono becomes dual-mono stereo).
fn frame_sample(
    data: &[u8],
    src: &AudioFormat,
    frame: usize,
    dst_ch: u32,
    dst_channels: u32,
) -> i16 {
    let src_channels = src.channels;
    if dst_channels == 1 && src_channels > 1 {
        let mut sum: i32 = 0;
        for ch in 0..src_channels {
            sum += read_sample(data, src.encoding, frame * src_channels as usize + ch as usize)
                as i32;
        }
        return (sum / src_channels as i32) as i16;
    }
    let ch = dst_ch.min(src_channels - 1);
    read_sample(data, src.encoding, frame * src_channels as usize + ch as usize)
}

#[inline]
fn read_sample(data: &[u8], encoding: SampleEncoding, index: usize) -> i16 {
    match encoding {
        SampleEncoding::U8 => ((data[index] as i16) - 128) * 256,
        SampleEncoding::S16Le => i16::from_le_bytes([data[index * 2], data[index * 2 + 1]]),
    }
}

#[inline]
fn write_sample(out: &mut Vec<u8>, encoding: SampleEncoding, value: i16) {
    match encoding {
        SampleEncoding::U8 => out.push(((value >> 8) + 128) as u8),
        SampleEncoding::S16Le => out.extend_from_slice(&value.to_le_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(rate: u32, encoding: SampleEncoding, channels: u32) -> AudioFormat {
        AudioFormat::new(rate, encoding, channels)
    }

    #[test]
    fn test_u8_to_s16_and_back() {
        let src = fmt(22050, SampleEncoding::U8, 1);
        let dst = fmt(22050, SampleEncoding::S16Le, 1);

        let data = [0u8, 128, 255];
        let out = convert(&data, src, dst).unwrap();
        let samples: Vec<i16> = out
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(samples, vec![-32768, 0, 32512]);

        let back = convert(&out, dst, src).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_mono_to_stereo_duplicates() {
        let src = fmt(44100, SampleEncoding::S16Le, 1);
        let dst = fmt(44100, SampleEncoding::S16Le, 2);

        let mut data = Vec::new();
        for s in [100i16, -200, 300] {
            data.extend_from_slice(&s.to_le_bytes());
        }
        let out = convert(&data, src, dst).unwrap();
        let samples: Vec<i16> = out
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(samples, vec![100, 100, -200, -200, 300, 300]);
    }

    #[test]
    fn test_stereo_to_mono_averages() {
        let src = fmt(44100, SampleEncoding::S16Le, 2);
        let dst = fmt(44100, SampleEncoding::S16Le, 1);

        let mut data = Vec::new();
        for s in [100i16, 300, -100, -300] {
            data.extend_from_slice(&s.to_le_bytes());
        }
        let out = convert(&data, src, dst).unwrap();
        let samples: Vec<i16> = out
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(samples, vec![200, -200]);
    }

    #[test]
    fn test_rate_conversion_exact_length() {
        let src = fmt(22050, SampleEncoding::S16Le, 1);
        let dst = fmt(44100, SampleEncoding::S16Le, 1);

        let mut data = Vec::new();
        for s in 0..100i16 {
            data.extend_from_slice(&s.to_le_bytes());
        }
        let out = convert(&data, src, dst).unwrap();
        assert_eq!(out.len(), 100 * 2 * 2);

        // Downsampling rounds down
        let out = convert(&data[..data.len() - 2], dst, src).unwrap();
        assert_eq!(out.len() / 2, 99 / 2);
    }

    #[test]
    fn test_upsampled_ramp_is_monotonic() {
        let src = fmt(11025, SampleEncoding::S16Le, 1);
        let dst = fmt(22050, SampleEncoding::S16Le, 1);

        let mut data = Vec::new();
        for s in (0..50i16).map(|s| s * 100) {
            data.extend_from_slice(&s.to_le_bytes());
        }
        let out = convert(&data, src, dst).unwrap();
        let samples: Vec<i16> = out
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        for pair in samples.windows(2) {
            assert!(pair[1] >= pair[0], "ramp must stay monotonic");
        }
    }

    #[test]
    fn test_degenerate_format_rejected() {
        let src = fmt(44100, SampleEncoding::S16Le, 0);
        let dst = fmt(44100, SampleEncoding::S16Le, 2);
        assert!(convert(&[0, 0], src, dst).is_none());

        let src = fmt(0, SampleEncoding::S16Le, 2);
        assert!(convert(&[0, 0], src, dst).is_none());
    }
}
