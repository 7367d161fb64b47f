use std::io::Read;

use claxon::FlacReader;
use tracing::{debug, warn};

use super::{CodecAdapter, Decoded};
use crate::{
    error::DecodeError,
    pcm::{AudioFormat, EightBit, Scratch, bytes_per_sample, interleave_planar},
    ring::SampleRing,
};

/// FLAC through claxon, re-blocked to a fixed number of frames per unit.
///
/// FLAC blocks vary in length, so decoded blocks are staged in a
/// [`SampleRing`] and drained `frames_per_unit` frames at a time.
pub struct FlacAdapter<R: Read> {
    reader: FlacReader<R>,
    ring: SampleRing,
    block_buffer: Vec<i32>,
    format: AudioFormat,
    frames_per_unit: usize,
    eof: bool,
    /// Set at open time when the stream cannot be played.
    abort: Option<String>,
}

impl<R: Read> FlacAdapter<R> {
    pub fn open(reader: R, frames_per_unit: usize) -> Result<Self, DecodeError> {
        let reader = FlacReader::new(reader)?;
        let info = reader.streaminfo();

        let channels = u8::try_from(info.channels)
            .ok()
            .filter(|channels| (1..=2).contains(channels))
            .ok_or_else(|| {
                DecodeError::unsupported(format!(
                    "{} FLAC channels (only mono and stereo are played)",
                    info.channels
                ))
            })?;
        let format = AudioFormat {
            sample_rate: info.sample_rate,
            channels,
            bits_per_sample: u8::try_from(info.bits_per_sample).unwrap_or(u8::MAX),
            total_samples: info.samples.unwrap_or(0),
            is_little_endian: true,
        };
        let abort = (!matches!(info.bits_per_sample, 8 | 16 | 24))
            .then(|| format!("FLAC bit depth {}", info.bits_per_sample));
        if let Some(reason) = &abort {
            warn!(reason = %reason, "FLAC stream will not be decoded");
        }

        let frames_per_unit = frames_per_unit.max(1);
        let max_block = usize::from(info.max_block_size).max(1);
        let ring = SampleRing::new(
            usize::from(channels),
            SampleRing::capacity_for(max_block, frames_per_unit),
        );
        debug!(
            ?format,
            max_block,
            ring_capacity = ring.capacity(),
            "FLAC stream opened"
        );

        Ok(Self {
            reader,
            ring,
            block_buffer: Vec::with_capacity(max_block * usize::from(channels)),
            format,
            frames_per_unit,
            eof: false,
            abort,
        })
    }

    /// Pulls blocks until the ring holds a full unit or the stream ends.
    fn fill_ring(&mut self) -> Result<(), DecodeError> {
        while !self.eof && self.ring.available() < self.frames_per_unit {
            let buffer = std::mem::take(&mut self.block_buffer);
            match self.reader.blocks().read_next_or_eof(buffer)? {
                Some(block) => {
                    match block.channels() {
                        1 => self.ring.push(&[block.channel(0)])?,
                        _ => self.ring.push(&[block.channel(0), block.channel(1)])?,
                    }
                    self.block_buffer = block.into_buffer();
                }
                None => self.eof = true,
            }
        }
        Ok(())
    }
}

impl<R: Read> CodecAdapter for FlacAdapter<R> {
    fn format(&self) -> AudioFormat {
        self.format.normalized()
    }

    fn decode_next<'a>(&mut self, scratch: &'a mut Scratch) -> Result<Decoded<'a>, DecodeError> {
        if let Some(reason) = &self.abort {
            return Err(DecodeError::unsupported(reason.clone()));
        }
        self.fill_ring()?;

        let frames = self.frames_per_unit.min(self.ring.available());
        if frames == 0 {
            return Ok(Decoded::EndOfStream);
        }

        let bits = self.format.bits_per_sample;
        let out = scratch.begin(frames * self.format.bytes_per_frame());
        match self.ring.channels() {
            1 => interleave_planar(&[self.ring.front(0, frames)], bits, 0, EightBit::SignedLegacy, out),
            _ => interleave_planar(
                &[self.ring.front(0, frames), self.ring.front(1, frames)],
                bits,
                0,
                EightBit::SignedLegacy,
                out,
            ),
        }
        self.ring.consume(frames);
        Ok(Decoded::Fragment(scratch.fragment(frames)))
    }

    fn max_fragment_bytes(&self) -> usize {
        self.frames_per_unit * usize::from(self.format.channels) * bytes_per_sample(self.format.bits_per_sample)
    }

    fn close(&mut self) {
        self.eof = true;
        self.ring.consume(self.ring.available());
    }
}
