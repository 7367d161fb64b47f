use std::io::{Read, Seek, SeekFrom};

use tracing::{debug, warn};

use super::{CodecAdapter, Decoded, read_up_to};
use crate::{
    caf::{CafFile, FORMAT_LPCM},
    endian::fourcc_str,
    error::DecodeError,
    pcm::{AudioFormat, EightBit, Scratch, reorder_bytes},
    riff::{self, PcmStream},
};

/// Uncompressed integer PCM from WAV, AIFF/AIFC or CAF `lpcm`.
pub struct LpcmAdapter<R> {
    reader: R,
    source: AudioFormat,
    eight_bit: EightBit,
    remaining: u64,
    unit_bytes: usize,
    raw: Vec<u8>,
}

impl<R: Read + Seek> LpcmAdapter<R> {
    pub fn open_wav(mut reader: R, frames_per_unit: usize) -> Result<Self, DecodeError> {
        let stream = riff::open_wav(&mut reader)?;
        Self::from_stream(reader, stream, frames_per_unit)
    }

    pub fn open_aiff(mut reader: R, frames_per_unit: usize) -> Result<Self, DecodeError> {
        let stream = riff::open_aiff(&mut reader)?;
        Self::from_stream(reader, stream, frames_per_unit)
    }

    pub fn open_caf(mut reader: R, frames_per_unit: usize) -> Result<Self, DecodeError> {
        let caf = CafFile::open(&mut reader)?;
        let description = caf.description;
        if description.format_id != FORMAT_LPCM {
            return Err(DecodeError::unsupported(format!(
                "CAF format '{}' is not linear PCM",
                fourcc_str(description.format_id)
            )));
        }
        if description.is_float() {
            return Err(DecodeError::unsupported("floating-point CAF audio"));
        }

        let format = description.to_audio_format(None, 0)?;
        format.validate()?;
        let frame_bytes = format.bytes_per_frame() as u64;
        if u64::from(description.bytes_per_packet) != frame_bytes {
            return Err(DecodeError::unsupported(format!(
                "CAF lpcm packets of {} bytes for {frame_bytes}-byte frames",
                description.bytes_per_packet
            )));
        }

        let stream = PcmStream {
            format: AudioFormat {
                total_samples: caf.audio_size / frame_bytes,
                ..format
            },
            data_offset: caf.audio_offset,
            data_size: caf.audio_size,
            eight_bit: EightBit::SignedLegacy,
        };
        Self::from_stream(reader, stream, frames_per_unit)
    }

    fn from_stream(mut reader: R, stream: PcmStream, frames_per_unit: usize) -> Result<Self, DecodeError> {
        stream.format.validate()?;
        reader.seek(SeekFrom::Start(stream.data_offset))?;
        let unit_bytes = frames_per_unit.max(1) * stream.format.bytes_per_frame();
        debug!(
            format = ?stream.format,
            offset = stream.data_offset,
            size = stream.data_size,
            "PCM stream opened"
        );
        Ok(Self {
            reader,
            source: stream.format,
            eight_bit: stream.eight_bit,
            remaining: stream.data_size,
            unit_bytes,
            raw: Vec::with_capacity(unit_bytes),
        })
    }
}

impl<R: Read + Seek> CodecAdapter for LpcmAdapter<R> {
    fn format(&self) -> AudioFormat {
        self.source.normalized()
    }

    fn decode_next<'a>(&mut self, scratch: &'a mut Scratch) -> Result<Decoded<'a>, DecodeError> {
        let frame_bytes = self.source.bytes_per_frame();
        let wanted = (self.remaining.min(self.unit_bytes as u64) as usize) / frame_bytes * frame_bytes;
        if wanted == 0 {
            return Ok(Decoded::EndOfStream);
        }

        self.raw.resize(wanted, 0);
        let read = read_up_to(&mut self.reader, &mut self.raw)?;
        let usable = read / frame_bytes * frame_bytes;
        if read < wanted {
            warn!(expected = wanted, got = read, "PCM data ends before its declared size");
            self.remaining = 0;
        } else {
            self.remaining -= wanted as u64;
        }
        if usable == 0 {
            return Ok(Decoded::EndOfStream);
        }

        let out = scratch.begin(usable);
        reorder_bytes(
            &self.raw[..usable],
            self.source.bits_per_sample,
            !self.source.is_little_endian,
            self.eight_bit,
            out,
        )?;
        Ok(Decoded::Fragment(scratch.fragment(usable / frame_bytes)))
    }

    fn max_fragment_bytes(&self) -> usize {
        self.unit_bytes
    }

    fn close(&mut self) {
        self.remaining = 0;
    }
}
