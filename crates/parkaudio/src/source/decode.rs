//! Incremental decode buffer
//!
//! The compressed sources (OGG, FLAC) decode packet by packet into an
//! internal byte buffer and serve `read` as plain slices out of it. This
//! holds that state: the decoded bytes plus the end-of-stream flag. The
//! sources own the codec; the buffer owns the bytes.

pub(super) struct DecodeBuffer {
    data: Vec<u8>,
    finished: bool,
}

impl DecodeBuffer {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            finished: false,
        }
    }

    /// Pull packets through `next_samples` until at least `end` bytes are
    /// buffered or the stream reports its end (`None`). Samples are stored
    /// as little-endian bytes; nothing is pulled once the stream finished.
    pub fn fill_until(&mut self, end: usize, mut next_samples: impl FnMut() -> Option<Vec<i16>>) {
        while !self.finished && self.data.len() < end {
            match next_samples() {
                Some(pcm) => {
                    self.data.reserve(pcm.len() * 2);
                    for sample in pcm {
                        self.data.extend_from_slice(&sample.to_le_bytes());
                    }
                }
                None => self.finished = true,
            }
        }
    }

    /// Bytes decoded so far
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Copy buffered bytes at `offset`, clamped to what has been decoded
    pub fn read_at(&self, offset: usize, dst: &mut [u8]) -> usize {
        if offset >= self.data.len() {
            return 0;
        }
        let n = dst.len().min(self.data.len() - offset);
        dst[..n].copy_from_slice(&self.data[offset..offset + n]);
        n
    }

    /// Drop the buffered bytes and mark the stream over
    pub fn clear(&mut self) {
        self.data = Vec::new();
        self.finished = true;
    }
}
