//! # Codec decode adapters
//!
//! One adapter per codec wraps the decoder library and exposes a uniform
//! "decode the next unit" call. Opening an adapter parses the container,
//! builds the decoder and fixes the [`AudioFormat`]; after that the session
//! only calls [`CodecAdapter::decode_next`] until it reports
//! [`Decoded::EndOfStream`].
//!
//! | adapter          | container        | library   |
//! |------------------|------------------|-----------|
//! | [`FlacAdapter`]  | native FLAC      | claxon    |
//! | [`AlacAdapter`]  | CAF, M4A         | symphonia |
//! | [`AacAdapter`]   | ADTS, M4A        | fdk-aac   |
//! | [`Mp3Adapter`]   | MPEG audio       | minimp3   |
//! | [`VorbisAdapter`]| Ogg              | lewton    |
//! | [`OpusAdapter`]  | Ogg              | opus      |
//! | [`LpcmAdapter`]  | WAV, AIFF, CAF   | none      |

use std::io::{Read, Seek, SeekFrom};

use crate::{
    error::DecodeError,
    mp4::SampleSizes,
    pcm::{AudioFormat, PcmFragment, Scratch},
};

mod aac;
mod alac;
mod flac;
mod lpcm;
mod mp3;
mod ogg;
mod opus;
mod vorbis;

pub use aac::AacAdapter;
pub use alac::AlacAdapter;
pub use flac::FlacAdapter;
pub use lpcm::LpcmAdapter;
pub use mp3::Mp3Adapter;
pub use ogg::{OggPacketReader, OggReaderOptions};
pub use opus::OpusAdapter;
pub use vorbis::VorbisAdapter;

/// Frames per decode unit for adapters that are free to choose it.
pub const DEFAULT_FRAMES_PER_UNIT: usize = 9216;

/// Consecutive undecodable frames tolerated by the resynchronizing codecs.
pub(crate) const MAX_CONSECUTIVE_ERRORS: usize = 8;

/// Result of one [`CodecAdapter::decode_next`] call.
#[derive(Debug)]
pub enum Decoded<'a> {
    /// Normalized PCM; may hold zero frames when a unit was entirely trimmed.
    Fragment(PcmFragment<'a>),
    EndOfStream,
}

pub trait CodecAdapter {
    /// Format of the PCM this adapter emits, already normalized for sinks.
    fn format(&self) -> AudioFormat;

    /// Decodes the next unit into `scratch`.
    fn decode_next<'a>(&mut self, scratch: &'a mut Scratch) -> Result<Decoded<'a>, DecodeError>;

    /// Largest fragment, in bytes, a single call may produce.
    fn max_fragment_bytes(&self) -> usize;

    /// Releases decoder resources. Further calls return `EndOfStream`.
    fn close(&mut self) {}
}

impl<A: CodecAdapter + ?Sized> CodecAdapter for Box<A> {
    fn format(&self) -> AudioFormat {
        (**self).format()
    }

    fn decode_next<'a>(&mut self, scratch: &'a mut Scratch) -> Result<Decoded<'a>, DecodeError> {
        (**self).decode_next(scratch)
    }

    fn max_fragment_bytes(&self) -> usize {
        (**self).max_fragment_bytes()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Byte sizes of consecutive packets, from a CAF packet table or M4A `stsz`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketSizes {
    Table(Vec<u32>),
    Mp4(SampleSizes),
}

impl PacketSizes {
    pub fn len(&self) -> usize {
        match self {
            PacketSizes::Table(sizes) => sizes.len(),
            PacketSizes::Mp4(sizes) => sizes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<u32> {
        match self {
            PacketSizes::Table(sizes) => sizes.get(index).copied(),
            PacketSizes::Mp4(sizes) => sizes.get(index),
        }
    }

    pub fn max(&self) -> u32 {
        match self {
            PacketSizes::Table(sizes) => sizes.iter().copied().max().unwrap_or(0),
            PacketSizes::Mp4(SampleSizes::Fixed { size, .. }) => *size,
            PacketSizes::Mp4(SampleSizes::Table(sizes)) => sizes.iter().copied().max().unwrap_or(0),
        }
    }
}

/// Reads sized packets stored back to back in `[offset, end)`.
pub(crate) struct PacketReader<R> {
    reader: R,
    sizes: PacketSizes,
    next: usize,
    offset: u64,
    end: u64,
    packet: Vec<u8>,
}

impl<R: Read + Seek> PacketReader<R> {
    pub(crate) fn new(mut reader: R, sizes: PacketSizes, offset: u64, end: u64) -> Result<Self, DecodeError> {
        reader.seek(SeekFrom::Start(offset))?;
        let capacity = sizes.max() as usize;
        Ok(Self {
            reader,
            sizes,
            next: 0,
            offset,
            end,
            packet: Vec::with_capacity(capacity),
        })
    }

    pub(crate) fn packet_count(&self) -> usize {
        self.sizes.len()
    }

    /// Index of the packet the next call returns.
    pub(crate) fn position(&self) -> usize {
        self.next
    }

    /// Reads the next packet into the reused buffer.
    pub(crate) fn next_packet(&mut self) -> Result<Option<&[u8]>, DecodeError> {
        let Some(size) = self.sizes.get(self.next) else {
            return Ok(None);
        };
        let size = u64::from(size);
        if self.offset + size > self.end {
            return Err(DecodeError::corrupt(format!(
                "packet {} ({size} bytes at {}) runs past the audio data",
                self.next, self.offset
            )));
        }
        self.packet.resize(size as usize, 0);
        self.reader.read_exact(&mut self.packet)?;
        self.offset += size;
        self.next += 1;
        Ok(Some(&self.packet))
    }
}

/// Reads until `buf` is full or the stream ends.
pub(crate) fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, DecodeError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn packet_reader_walks_sizes() {
        let data: Vec<u8> = (0..10).collect();
        let mut reader =
            PacketReader::new(Cursor::new(data), PacketSizes::Table(vec![3, 5]), 1, 10).unwrap();
        assert_eq!(reader.next_packet().unwrap(), Some(&[1u8, 2, 3][..]));
        assert_eq!(reader.next_packet().unwrap(), Some(&[4u8, 5, 6, 7, 8][..]));
        assert_eq!(reader.next_packet().unwrap(), None);
        assert_eq!(reader.position(), 2);
    }

    #[test]
    fn packet_past_end_is_corrupt() {
        let mut reader = PacketReader::new(
            Cursor::new(vec![0u8; 8]),
            PacketSizes::Mp4(SampleSizes::Fixed { size: 6, count: 2 }),
            0,
            8,
        )
        .unwrap();
        assert!(reader.next_packet().unwrap().is_some());
        assert!(matches!(
            reader.next_packet(),
            Err(DecodeError::CorruptStream(_))
        ));
    }
}
