//! # Core Audio Format (CAF)
//!
//! A CAF file is the 8-byte header `'caff' version:u16 flags:u16` followed by
//! chunks of `{type: u32, size: i64}`, all big-endian. Playback needs four of
//! them:
//!
//! | chunk  | content                                                     |
//! |--------|-------------------------------------------------------------|
//! | `desc` | 32-byte `AudioDescription`                                  |
//! | `data` | 4-byte edit count, then the packets                         |
//! | `kuki` | codec magic cookie (ALAC: `ALACSpecificConfig`)             |
//! | `pakt` | 24-byte packet table header, then varint packet sizes       |
//!
//! The parsers below are pure functions over chunk payloads; [`CafFile::open`]
//! is the only place that touches the reader.

use std::io::{Read, Seek};

use tracing::debug;

use crate::{
    alac::AlacConfig,
    chunk::{ChunkLayout, find_chunk, read_file_header, read_payload},
    endian::{be_f64, be_i32, be_i64, be_u32, decode_varint, fourcc, fourcc_str},
    error::DecodeError,
    pcm::AudioFormat,
};

pub const FORMAT_ALAC: u32 = fourcc(b"alac");
pub const FORMAT_LPCM: u32 = fourcc(b"lpcm");

const LPCM_FLAG_FLOAT: u32 = 1 << 0;
const LPCM_FLAG_LITTLE_ENDIAN: u32 = 1 << 1;

/// The `desc` chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioDescription {
    pub sample_rate: f64,
    pub format_id: u32,
    pub format_flags: u32,
    pub bytes_per_packet: u32,
    pub frames_per_packet: u32,
    pub channels_per_frame: u32,
    pub bits_per_channel: u32,
}

impl AudioDescription {
    pub const SIZE: usize = 32;

    pub fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.len() < Self::SIZE {
            return Err(DecodeError::malformed(format!(
                "desc chunk is {} bytes, expected {}",
                payload.len(),
                Self::SIZE
            )));
        }
        Ok(Self {
            sample_rate: be_f64(payload, 0)?,
            format_id: be_u32(payload, 8)?,
            format_flags: be_u32(payload, 12)?,
            bytes_per_packet: be_u32(payload, 16)?,
            frames_per_packet: be_u32(payload, 20)?,
            channels_per_frame: be_u32(payload, 24)?,
            bits_per_channel: be_u32(payload, 28)?,
        })
    }

    pub fn is_float(&self) -> bool {
        self.format_id == FORMAT_LPCM && self.format_flags & LPCM_FLAG_FLOAT != 0
    }

    pub fn is_little_endian(&self) -> bool {
        self.format_id == FORMAT_LPCM && self.format_flags & LPCM_FLAG_LITTLE_ENDIAN != 0
    }

    /// Bit depth of the decoded stream.
    ///
    /// ALAC takes it from the magic cookie, then from the format flags.
    /// A float `lpcm` layout is reported as 16-bit.
    pub fn bit_depth(&self, cookie: Option<&AlacConfig>) -> u8 {
        match self.format_id {
            FORMAT_ALAC => cookie
                .map(|config| config.bit_depth)
                .unwrap_or(match self.format_flags {
                    1 => 16,
                    2 => 20,
                    3 => 24,
                    4 => 32,
                    _ => 16,
                }),
            FORMAT_LPCM if self.is_float() => 16,
            _ => u8::try_from(self.bits_per_channel).unwrap_or(16),
        }
    }

    pub fn to_audio_format(
        &self,
        cookie: Option<&AlacConfig>,
        total_samples: u64,
    ) -> Result<AudioFormat, DecodeError> {
        if !(self.sample_rate.is_finite() && self.sample_rate >= 1.0) {
            return Err(DecodeError::malformed(format!(
                "invalid CAF sample rate {}",
                self.sample_rate
            )));
        }
        let channels = u8::try_from(self.channels_per_frame).map_err(|_| {
            DecodeError::unsupported(format!("{} channels", self.channels_per_frame))
        })?;
        Ok(AudioFormat {
            sample_rate: self.sample_rate.round() as u32,
            channels,
            bits_per_sample: self.bit_depth(cookie),
            total_samples,
            is_little_endian: self.is_little_endian(),
        })
    }
}

/// Header of the `pakt` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketTableHeader {
    pub packets: i64,
    pub valid_frames: i64,
    pub priming_frames: i32,
    pub remainder_frames: i32,
}

impl PacketTableHeader {
    pub const SIZE: usize = 24;

    pub fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
        let header = Self {
            packets: be_i64(payload, 0)?,
            valid_frames: be_i64(payload, 8)?,
            priming_frames: be_i32(payload, 16)?,
            remainder_frames: be_i32(payload, 20)?,
        };
        if header.packets < 0
            || header.valid_frames < 0
            || header.priming_frames < 0
            || header.remainder_frames < 0
        {
            return Err(DecodeError::malformed(format!(
                "negative field in packet table header {header:?}"
            )));
        }
        Ok(header)
    }
}

/// Packet sizes read from the `pakt` chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketTable {
    pub header: PacketTableHeader,
    pub sizes: Vec<u32>,
}

impl PacketTable {
    /// Decodes `header.packets` varint sizes following the header.
    pub fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
        let header = PacketTableHeader::parse(payload)?;
        let mut rest = &payload[PacketTableHeader::SIZE..];
        let packets = usize::try_from(header.packets)
            .map_err(|_| DecodeError::malformed("packet count overflows"))?;
        // Each entry needs at least one byte.
        if packets > rest.len() {
            return Err(DecodeError::malformed(format!(
                "packet table declares {packets} packets in {} bytes",
                rest.len()
            )));
        }
        let mut sizes = Vec::with_capacity(packets);
        for _ in 0..packets {
            let (size, used) = decode_varint(rest)?;
            sizes.push(size);
            rest = &rest[used as usize..];
        }
        Ok(Self { header, sizes })
    }
}

/// Everything the CAF adapters need, located once at open time.
#[derive(Debug, Clone)]
pub struct CafFile {
    pub description: AudioDescription,
    /// First packet byte (after the edit count) and payload length.
    pub audio_offset: u64,
    pub audio_size: u64,
    pub cookie: Option<Vec<u8>>,
    pub packet_table: Option<PacketTable>,
}

impl CafFile {
    pub fn open<R: Read + Seek>(reader: &mut R) -> Result<Self, DecodeError> {
        let mut header = [0u8; 8];
        read_file_header(reader, &mut header, "CAF")?;
        if &header[0..4] != b"caff" {
            return Err(DecodeError::malformed("missing 'caff' file header"));
        }
        let version = u16::from_be_bytes([header[4], header[5]]);
        if version != 1 {
            return Err(DecodeError::unsupported(format!("CAF version {version}")));
        }

        let desc = find_chunk(reader, ChunkLayout::Caf, &[fourcc(b"desc")])?;
        let description = AudioDescription::parse(&read_payload(reader, &desc)?)?;

        let data = find_chunk(reader, ChunkLayout::Caf, &[fourcc(b"data")])?;
        if data.payload_size < 4 {
            return Err(DecodeError::malformed("data chunk shorter than its edit count"));
        }

        let cookie = optional_chunk(reader, b"kuki")?;
        let packet_table = match optional_chunk(reader, b"pakt")? {
            Some(payload) => Some(PacketTable::parse(&payload)?),
            None => None,
        };

        debug!(
            format = %fourcc_str(description.format_id),
            sample_rate = description.sample_rate,
            channels = description.channels_per_frame,
            packets = packet_table.as_ref().map(|t| t.sizes.len()),
            "CAF file opened"
        );

        Ok(Self {
            description,
            audio_offset: data.byte_offset + 4,
            audio_size: data.payload_size - 4,
            cookie,
            packet_table,
        })
    }
}

fn optional_chunk<R: Read + Seek>(
    reader: &mut R,
    tag: &[u8; 4],
) -> Result<Option<Vec<u8>>, DecodeError> {
    match find_chunk(reader, ChunkLayout::Caf, &[fourcc(tag)]) {
        Ok(chunk) => read_payload(reader, &chunk).map(Some),
        Err(DecodeError::ChunkNotFound { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}
