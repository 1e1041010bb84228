//! Streaming linear resampler
//!
//! Operates on interleaved s16 frames and keeps the last consumed input
//! frame so interpolation stays continuous across passes. The ratio is set
//! every pass: from exact in/out frame counts while the source still fills
//! the request, or from the channel's playback rate once it runs short.

pub struct LinearResampler {
    channels: usize,
    /// Input frames consumed per output frame
    step: f64,
    /// Position in input-frame coordinates; 0.0 is the carried frame,
    /// 1.0 is the first frame of the current input
    pos: f64,
    /// Last input frame of the previous pass
    prev: Vec<i16>,
}

impl LinearResampler {
    pub fn new(channels: usize) -> Self {
        Self {
            channels: channels.max(1),
            step: 1.0,
            pos: 1.0,
            prev: vec![0; channels.max(1)],
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Derive the ratio from exact frame counts (full source read)
    pub fn set_ratio(&mut self, in_frames: usize, out_frames: usize) {
        if in_frames > 0 && out_frames > 0 {
            self.step = in_frames as f64 / out_frames as f64;
        }
    }

    /// Derive the ratio from the playback rate (source ran short)
    pub fn set_rate(&mut self, rate: f64) {
        self.step = rate.max(0.001);
    }

    /// Resample `input` into `output`, both interleaved at the configured
    /// channel count. Returns the number of output frames produced; fewer
    /// than requested means the input was exhausted.
    pub fn process(&mut self, input: &[i16], output: &mut [i16]) -> usize {
        let in_frames = input.len() / self.channels;
        let out_frames = output.len() / self.channels;
        if in_frames == 0 {
            return 0;
        }

        let mut written = 0;
        for o in 0..out_frames {
            let idx = self.pos.floor() as isize - 1;
            if idx >= in_frames as isize {
                break;
            }
            let frac = self.pos - self.pos.floor();

            for ch in 0..self.channels {
                let a = self.sample(input, in_frames, idx, ch) as f64;
                let b = self.sample(input, in_frames, idx + 1, ch) as f64;
                let v = a + (b - a) * frac;
                output[o * self.channels + ch] =
                    v.clamp(i16::MIN as f64, i16::MAX as f64) as i16;
            }
            written += 1;
            self.pos += self.step;
        }

        // Carry the last input frame; rebase so next pass starts at 0.0 = it
        self.prev
            .copy_from_slice(&input[(in_frames - 1) * self.channels..in_frames * self.channels]);
        self.pos = (self.pos - in_frames as f64).max(0.0);

        written
    }

    #[inline]
    fn sample(&self, input: &[i16], in_frames: usize, frame: isize, ch: usize) -> i16 {
        if frame < 0 {
            self.prev[ch]
        } else {
            let frame = (frame as usize).min(in_frames - 1);
            input[frame * self.channels + ch]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unity_ratio_is_passthrough() {
        let mut rs = LinearResampler::new(1);
        rs.set_ratio(4, 4);

        let input = [10i16, 20, 30, 40];
        let mut output = [0i16; 4];
        assert_eq!(rs.process(&input, &mut output), 4);
        assert_eq!(output, input);
    }

    #[test]
    fn test_upsampling_interpolates() {
        let mut rs = LinearResampler::new(1);
        rs.set_rate(0.5);

        let input = [0i16, 100];
        let mut output = [0i16; 4];
        assert_eq!(rs.process(&input, &mut output), 4);
        assert_eq!(output[0], 0);
        assert_eq!(output[1], 50);
        assert_eq!(output[2], 100);
    }

    #[test]
    fn test_constant_signal_stays_constant_across_passes() {
        let mut rs = LinearResampler::new(2);
        rs.set_rate(1.5);

        let input = [500i16; 24];
        let mut output = [0i16; 16];
        let first = rs.process(&input, &mut output);
        assert!(first > 0);
        for &s in &output[..first * 2] {
            assert_eq!(s, 500);
        }

        // Second pass interpolates against the carried frame, not zero
        let second = rs.process(&input, &mut output);
        assert!(second > 0);
        for &s in &output[..second * 2] {
            assert_eq!(s, 500);
        }
    }

    #[test]
    fn test_short_input_produces_short_output() {
        let mut rs = LinearResampler::new(1);
        rs.set_rate(2.0);

        let input = [100i16; 4];
        let mut output = [0i16; 8];
        let written = rs.process(&input, &mut output);
        assert!(written < 8);
        assert!(written >= 2);
    }
}
