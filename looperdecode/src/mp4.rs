//! # MPEG-4 audio (M4A)
//!
//! Only the boxes needed to play the first track are read:
//!
//! - `ftyp` must be the first top-level box
//! - `moov/trak/mdia/mdhd`: time scale (the sample rate) and duration
//! - `moov/trak/mdia/minf/stbl/stsd`: one `AudioSampleEntry` plus its codec
//!   config (`alac` cookie or `esds` AudioSpecificConfig)
//! - `moov/trak/mdia/minf/stbl/stsz`: per-sample byte sizes
//! - `moov/trak/mdia/minf/stbl/stco` or `co64`: where the first sample lives
//!
//! Samples are read back to back from the first chunk offset, which holds for
//! the single-track files produced by common encoders.

use std::io::{Read, Seek};

use tracing::debug;

use crate::{
    alac::AlacConfig,
    chunk::{ChunkLayout, find_chunk, read_file_header, read_payload},
    endian::{be_u16, be_u32, be_u64, fourcc, fourcc_str},
    error::DecodeError,
    pcm::AudioFormat,
};

const STBL: [&[u8; 4]; 5] = [b"moov", b"trak", b"mdia", b"minf", b"stbl"];

fn stbl_path(leaf: &[u8; 4]) -> Vec<u32> {
    STBL.iter().map(|tag| fourcc(tag)).chain([fourcc(leaf)]).collect()
}

/// The `mdhd` box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaHeader {
    pub version: u8,
    pub time_scale: u32,
    pub duration: u64,
}

impl MediaHeader {
    pub fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
        let version = *payload
            .first()
            .ok_or_else(|| DecodeError::malformed("empty mdhd box"))?;
        // version/flags, then creation and modification times.
        match version {
            0 => Ok(Self {
                version,
                time_scale: be_u32(payload, 12)?,
                duration: u64::from(be_u32(payload, 16)?),
            }),
            1 => Ok(Self {
                version,
                time_scale: be_u32(payload, 20)?,
                duration: be_u64(payload, 24)?,
            }),
            other => Err(DecodeError::unsupported(format!("mdhd version {other}"))),
        }
    }
}

/// Contents of the `stsz` box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleSizes {
    Fixed { size: u32, count: u32 },
    Table(Vec<u32>),
}

impl SampleSizes {
    pub fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
        let sample_size = be_u32(payload, 4)?;
        let count = be_u32(payload, 8)?;
        if sample_size != 0 {
            return Ok(SampleSizes::Fixed {
                size: sample_size,
                count,
            });
        }

        let needed = 12 + 4 * count as usize;
        if payload.len() < needed {
            return Err(DecodeError::malformed(format!(
                "stsz declares {count} entries but holds {} bytes",
                payload.len()
            )));
        }
        let table = payload[12..needed]
            .chunks_exact(4)
            .map(|entry| u32::from_be_bytes([entry[0], entry[1], entry[2], entry[3]]))
            .collect();
        Ok(SampleSizes::Table(table))
    }

    pub fn len(&self) -> usize {
        match self {
            SampleSizes::Fixed { count, .. } => *count as usize,
            SampleSizes::Table(table) => table.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<u32> {
        match self {
            SampleSizes::Fixed { size, count } => (index < *count as usize).then_some(*size),
            SampleSizes::Table(table) => table.get(index).copied(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecConfig {
    /// The `alac` child box, atom header included.
    Alac(Vec<u8>),
    /// AudioSpecificConfig from the `esds` DecoderSpecificInfo.
    Aac(Vec<u8>),
}

/// The single `AudioSampleEntry` of `stsd`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleEntry {
    pub entry_type: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub sample_rate: u32,
    pub config: CodecConfig,
}

impl SampleEntry {
    pub fn parse_stsd(payload: &[u8]) -> Result<Self, DecodeError> {
        let entry_count = be_u32(payload, 4)?;
        if entry_count == 0 {
            return Err(DecodeError::malformed("stsd has no sample entries"));
        }
        let entry_size = be_u32(payload, 8)? as usize;
        let entry = payload
            .get(8..8 + entry_size)
            .ok_or_else(|| DecodeError::malformed("stsd entry runs past its box"))?;
        let entry_type = be_u32(entry, 4)?;

        // QuickTime sound description versions 1 and 2 append extra fields.
        let sound_version = be_u16(entry, 16)?;
        let children_at = match sound_version {
            0 => 36,
            1 => 52,
            2 => 72,
            other => {
                return Err(DecodeError::unsupported(format!(
                    "sound sample description version {other}"
                )));
            }
        };

        let channels = be_u16(entry, 24)?;
        let bits_per_sample = be_u16(entry, 26)?;
        let sample_rate = be_u32(entry, 32)? >> 16;
        let children = entry
            .get(children_at..)
            .ok_or_else(|| DecodeError::malformed("sample entry truncated"))?;

        let config = match &entry_type.to_be_bytes() {
            b"alac" => CodecConfig::Alac(child_box(children, b"alac")?.to_vec()),
            b"mp4a" => {
                let esds = child_box(children, b"esds")?;
                CodecConfig::Aac(audio_specific_config(&esds[8..])?.to_vec())
            }
            _ => {
                return Err(DecodeError::unsupported(format!(
                    "sample entry '{}'",
                    fourcc_str(entry_type)
                )));
            }
        };

        Ok(Self {
            entry_type,
            channels,
            bits_per_sample,
            sample_rate,
            config,
        })
    }
}

/// Finds a box among in-memory siblings and returns it whole.
fn child_box<'a>(mut data: &'a [u8], tag: &[u8; 4]) -> Result<&'a [u8], DecodeError> {
    while data.len() >= 8 {
        let size = be_u32(data, 0)? as usize;
        if size < 8 || size > data.len() {
            return Err(DecodeError::malformed(format!(
                "child box of size {size} in {} bytes",
                data.len()
            )));
        }
        if &data[4..8] == tag {
            return Ok(&data[..size]);
        }
        data = &data[size..];
    }
    Err(DecodeError::ChunkNotFound {
        path: format!("stsd/{}", fourcc_str(fourcc(tag))),
    })
}

/// Reads an MPEG-4 descriptor header: tag and expandable length.
fn descriptor(data: &[u8]) -> Result<(u8, &[u8], &[u8]), DecodeError> {
    let (&tag, mut rest) = data
        .split_first()
        .ok_or_else(|| DecodeError::malformed("descriptor truncated"))?;
    let mut len = 0usize;
    for i in 0..4 {
        let (&byte, tail) = rest
            .split_first()
            .ok_or_else(|| DecodeError::malformed("descriptor length truncated"))?;
        rest = tail;
        len = (len << 7) | usize::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            break;
        }
        if i == 3 {
            return Err(DecodeError::malformed("descriptor length exceeds 4 bytes"));
        }
    }
    if len > rest.len() {
        return Err(DecodeError::malformed(format!(
            "descriptor 0x{tag:02x} claims {len} bytes, {} remain",
            rest.len()
        )));
    }
    Ok((tag, &rest[..len], &rest[len..]))
}

/// Walks ES_Descriptor → DecoderConfigDescriptor → DecoderSpecificInfo
/// inside an `esds` payload (version/flags first).
pub fn audio_specific_config(esds: &[u8]) -> Result<&[u8], DecodeError> {
    let body = esds
        .get(4..)
        .ok_or_else(|| DecodeError::malformed("esds truncated"))?;
    let (tag, es, _) = descriptor(body)?;
    if tag != 0x03 {
        return Err(DecodeError::malformed(format!("expected ES_Descriptor, found 0x{tag:02x}")));
    }

    let flags = *es
        .get(2)
        .ok_or_else(|| DecodeError::malformed("ES_Descriptor truncated"))?;
    let mut offset = 3;
    if flags & 0x80 != 0 {
        offset += 2;
    }
    if flags & 0x40 != 0 {
        let url_len = *es
            .get(offset)
            .ok_or_else(|| DecodeError::malformed("ES_Descriptor URL truncated"))?;
        offset += 1 + usize::from(url_len);
    }
    if flags & 0x20 != 0 {
        offset += 2;
    }

    let mut rest = es
        .get(offset..)
        .ok_or_else(|| DecodeError::malformed("ES_Descriptor truncated"))?;
    while !rest.is_empty() {
        let (tag, decoder_config, tail) = descriptor(rest)?;
        rest = tail;
        if tag != 0x04 {
            continue;
        }
        // objectType, streamType, bufferSize(3), maxBitrate, avgBitrate
        let mut inner = decoder_config
            .get(13..)
            .ok_or_else(|| DecodeError::malformed("DecoderConfigDescriptor truncated"))?;
        while !inner.is_empty() {
            let (tag, info, tail) = descriptor(inner)?;
            if tag == 0x05 {
                if info.len() < 2 {
                    return Err(DecodeError::malformed("AudioSpecificConfig too short"));
                }
                return Ok(info);
            }
            inner = tail;
        }
    }
    Err(DecodeError::malformed("esds has no DecoderSpecificInfo"))
}

/// Reads the first offset of an `stco` (32-bit) or `co64` (64-bit) box.
pub fn first_chunk_offset(payload: &[u8], wide: bool) -> Result<Option<u64>, DecodeError> {
    if be_u32(payload, 4)? == 0 {
        return Ok(None);
    }
    if wide {
        be_u64(payload, 8).map(Some)
    } else {
        be_u32(payload, 8).map(|offset| Some(u64::from(offset)))
    }
}

/// Track description and sample layout of an M4A file.
#[derive(Debug, Clone)]
pub struct Mp4File {
    pub media: MediaHeader,
    pub entry: SampleEntry,
    pub sizes: SampleSizes,
    pub data_offset: u64,
    pub data_end: u64,
}

impl Mp4File {
    pub fn open<R: Read + Seek>(reader: &mut R) -> Result<Self, DecodeError> {
        let mut header = [0u8; 8];
        read_file_header(reader, &mut header, "MP4")?;
        if &header[4..8] != b"ftyp" {
            return Err(DecodeError::malformed(format!(
                "first box is '{}', expected 'ftyp'",
                String::from_utf8_lossy(&header[4..8])
            )));
        }

        let mdhd_path = [b"moov", b"trak", b"mdia", b"mdhd"].map(fourcc);
        let mdhd = find_chunk(reader, ChunkLayout::Mp4, &mdhd_path)?;
        let media = MediaHeader::parse(&read_payload(reader, &mdhd)?)?;

        let stsd = find_chunk(reader, ChunkLayout::Mp4, &stbl_path(b"stsd"))?;
        let entry = SampleEntry::parse_stsd(&read_payload(reader, &stsd)?)?;

        let stsz = find_chunk(reader, ChunkLayout::Mp4, &stbl_path(b"stsz"))?;
        let sizes = SampleSizes::parse(&read_payload(reader, &stsz)?)?;

        let mdat = find_chunk(reader, ChunkLayout::Mp4, &[fourcc(b"mdat")])?;
        let first_chunk = match find_chunk(reader, ChunkLayout::Mp4, &stbl_path(b"stco")) {
            Ok(stco) => first_chunk_offset(&read_payload(reader, &stco)?, false)?,
            Err(DecodeError::ChunkNotFound { .. }) => {
                match find_chunk(reader, ChunkLayout::Mp4, &stbl_path(b"co64")) {
                    Ok(co64) => first_chunk_offset(&read_payload(reader, &co64)?, true)?,
                    Err(DecodeError::ChunkNotFound { .. }) => None,
                    Err(err) => return Err(err),
                }
            }
            Err(err) => return Err(err),
        };
        let data_offset = first_chunk
            .filter(|&offset| offset >= mdat.byte_offset && offset < mdat.end())
            .unwrap_or(mdat.byte_offset);

        debug!(
            codec = %fourcc_str(entry.entry_type),
            time_scale = media.time_scale,
            samples = sizes.len(),
            data_offset,
            "M4A file opened"
        );

        Ok(Self {
            media,
            entry,
            sizes,
            data_offset,
            data_end: mdat.end(),
        })
    }

    pub fn audio_format(&self, bits_per_sample: u8) -> Result<AudioFormat, DecodeError> {
        let channels = u8::try_from(self.entry.channels)
            .map_err(|_| DecodeError::unsupported(format!("{} channels", self.entry.channels)))?;
        Ok(AudioFormat {
            sample_rate: self.media.time_scale,
            channels,
            bits_per_sample,
            total_samples: self.media.duration,
            is_little_endian: false,
        })
    }

    pub fn alac_config(&self) -> Result<Option<AlacConfig>, DecodeError> {
        match &self.entry.config {
            CodecConfig::Alac(cookie) => AlacConfig::parse(cookie).map(Some),
            CodecConfig::Aac(_) => Ok(None),
        }
    }
}
