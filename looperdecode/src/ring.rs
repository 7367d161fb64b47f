//! Per-channel sample ring used by the FLAC adapter.
//!
//! FLAC frames carry a variable number of samples, while the pipeline asks
//! for fixed-size units. Decoded blocks are appended behind the buffered
//! samples; a drain takes samples from the front and shifts what is left back
//! to position zero. Blocks are small relative to the capacity, so the shift
//! is cheap and the readable region is always one contiguous slice.

use crate::error::DecodeError;

#[derive(Debug)]
pub struct SampleRing {
    planes: Vec<Vec<i32>>,
    len: usize,
    capacity: usize,
}

impl SampleRing {
    pub fn new(channels: usize, capacity: usize) -> Self {
        Self {
            planes: (0..channels).map(|_| vec![0; capacity]).collect(),
            len: 0,
            capacity,
        }
    }

    /// Capacity for draining `unit` samples at a time from blocks of at most
    /// `max_block` samples: two blocks, and never less than a unit plus a block.
    pub fn capacity_for(max_block: usize, unit: usize) -> usize {
        (2 * max_block).max(unit + max_block)
    }

    pub fn channels(&self) -> usize {
        self.planes.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.len
    }

    pub fn free(&self) -> usize {
        self.capacity - self.len
    }

    /// Appends one block given as one slice per channel.
    pub fn push(&mut self, block: &[&[i32]]) -> Result<(), DecodeError> {
        if block.len() != self.planes.len() {
            return Err(DecodeError::corrupt(format!(
                "block has {} channels, stream has {}",
                block.len(),
                self.planes.len()
            )));
        }
        let frames = block.first().map_or(0, |plane| plane.len());
        if frames > self.free() {
            return Err(DecodeError::corrupt(format!(
                "block of {frames} samples exceeds the {} free ring slots",
                self.free()
            )));
        }

        for (plane, samples) in self.planes.iter_mut().zip(block) {
            if samples.len() != frames {
                return Err(DecodeError::corrupt("block channels differ in length"));
            }
            plane[self.len..self.len + frames].copy_from_slice(samples);
        }
        self.len += frames;
        Ok(())
    }

    /// The first `n` buffered samples of channel `ch`.
    pub fn front(&self, ch: usize, n: usize) -> &[i32] {
        &self.planes[ch][..n.min(self.len)]
    }

    /// Drops `n` samples from the front and moves the remainder to index 0.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.len);
        for plane in &mut self.planes {
            plane.copy_within(n..self.len, 0);
        }
        self.len -= n;
    }
}
