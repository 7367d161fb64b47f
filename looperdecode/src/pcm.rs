//! # PCM description and normalization
//!
//! Decoders hand out samples in whatever shape their library prefers: planar
//! `i32` words (FLAC, ALAC), interleaved `i16` (MP3, Vorbis, Opus, AAC) or raw
//! bytes in the container's byte order (WAV, AIFF, CAF `lpcm`). The functions
//! here turn all of them into the single layout the sinks accept:
//!
//! - interleaved frames, channel 0 first
//! - 8-bit samples unsigned, one byte each
//! - 16-bit little-endian, low byte first
//! - 24-bit packed into 3 bytes, high byte last
//! - 32-bit little-endian, unchanged
//!
//! Output always goes into a caller-owned [`Scratch`] buffer whose capacity is
//! reserved once per unit, so no allocation happens per sample.

use std::time::Duration;

use crate::error::DecodeError;

/// Stream format as derived from a container descriptor or a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
    /// Frames in the stream, `0` when the container does not say.
    pub total_samples: u64,
    /// Byte order of the PCM this format describes.
    pub is_little_endian: bool,
}

impl AudioFormat {
    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.sample_rate == 0 {
            return Err(DecodeError::unsupported("sample rate must be greater than 0"));
        }
        if !(1..=2).contains(&self.channels) {
            return Err(DecodeError::unsupported(format!(
                "{} channels (only mono and stereo are supported)",
                self.channels
            )));
        }
        if !matches!(self.bits_per_sample, 8 | 16 | 24 | 32) {
            return Err(DecodeError::unsupported(format!(
                "{} bits per sample",
                self.bits_per_sample
            )));
        }
        Ok(())
    }

    pub fn bytes_per_sample(&self) -> usize {
        bytes_per_sample(self.bits_per_sample)
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * usize::from(self.channels)
    }

    /// The same stream as delivered to a sink.
    pub fn normalized(&self) -> AudioFormat {
        AudioFormat {
            is_little_endian: true,
            ..*self
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        if self.total_samples == 0 || self.sample_rate == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(
            self.total_samples as f64 / f64::from(self.sample_rate),
        ))
    }
}

pub(crate) fn bytes_per_sample(bits_per_sample: u8) -> usize {
    usize::from(bits_per_sample).div_ceil(8).max(1)
}

/// How 8-bit source samples map to the unsigned sink convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EightBit {
    /// Samples are already unsigned (WAV).
    Unsigned,
    /// Signed samples biased with `^ 0x80` (FLAC, AIFF, signed `lpcm`).
    SignedLegacy,
}

/// Caller-owned output arena, reused across decode units.
#[derive(Debug, Default)]
pub struct Scratch {
    bytes: Vec<u8>,
}

impl Scratch {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    /// Empties the arena and makes room for `needed` bytes.
    pub(crate) fn begin(&mut self, needed: usize) -> &mut Vec<u8> {
        self.bytes.clear();
        self.bytes.reserve(needed);
        &mut self.bytes
    }

    pub(crate) fn fragment(&self, frames: usize) -> PcmFragment<'_> {
        PcmFragment {
            bytes: &self.bytes,
            frames,
        }
    }
}

/// Normalized interleaved PCM for one decode unit.
#[derive(Debug, Clone, Copy)]
pub struct PcmFragment<'a> {
    pub bytes: &'a [u8],
    pub frames: usize,
}

/// Appends one right-aligned sample in sink layout.
#[inline]
pub fn write_sample(sample: i32, bits: u8, eight_bit: EightBit, out: &mut Vec<u8>) {
    match bits {
        8 => {
            let byte = sample as u8;
            out.push(match eight_bit {
                EightBit::Unsigned => byte,
                EightBit::SignedLegacy => byte ^ 0x80,
            });
        }
        16 => out.extend_from_slice(&(sample as i16).to_le_bytes()),
        24 => out.extend_from_slice(&sample.to_le_bytes()[..3]),
        _ => out.extend_from_slice(&sample.to_le_bytes()),
    }
}

/// Interleaves planar `i32` words.
///
/// Every plane must hold the same number of samples. Each word is shifted
/// right by `right_shift` first, which turns full-scale decoder output into
/// right-aligned `bits`-wide samples.
pub fn interleave_planar(
    planes: &[&[i32]],
    bits: u8,
    right_shift: u32,
    eight_bit: EightBit,
    out: &mut Vec<u8>,
) {
    let Some(first) = planes.first() else {
        return;
    };
    let frames = first.len();
    debug_assert!(planes.iter().all(|p| p.len() == frames));

    out.reserve(frames * planes.len() * bytes_per_sample(bits));
    for frame in 0..frames {
        for plane in planes {
            write_sample(plane[frame] >> right_shift, bits, eight_bit, out);
        }
    }
}

/// Converts interleaved native `i16` samples to little-endian bytes.
pub fn interleaved_i16(samples: &[i16], out: &mut Vec<u8>) {
    out.reserve(samples.len() * 2);
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
}

/// Copies raw interleaved PCM bytes, reversing each sample when the source
/// is big-endian.
pub fn reorder_bytes(
    src: &[u8],
    bits: u8,
    big_endian: bool,
    eight_bit: EightBit,
    out: &mut Vec<u8>,
) -> Result<(), DecodeError> {
    let width = bytes_per_sample(bits);
    if src.len() % width != 0 {
        return Err(DecodeError::corrupt(format!(
            "{} PCM bytes do not divide into {width}-byte samples",
            src.len()
        )));
    }

    out.reserve(src.len());
    match (width, big_endian) {
        (1, _) => match eight_bit {
            EightBit::Unsigned => out.extend_from_slice(src),
            EightBit::SignedLegacy => out.extend(src.iter().map(|b| b ^ 0x80)),
        },
        (_, false) => out.extend_from_slice(src),
        (_, true) => {
            for sample in src.chunks_exact(width) {
                out.extend(sample.iter().rev());
            }
        }
    }
    Ok(())
}
