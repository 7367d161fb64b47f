//! # WAV and AIFF descriptors
//!
//! Both formats store interleaved integer PCM in a single chunk (`data` for
//! WAV, `SSND` for AIFF) described by a format chunk (`fmt ` / `COMM`). The
//! only differences that matter for playback are the byte order and the
//! signedness of 8-bit samples, both recorded in [`PcmStream`].

use std::io::{Read, Seek, SeekFrom};

use tracing::debug;

use crate::{
    chunk::{ChunkLayout, find_chunk, read_file_header, read_payload},
    endian::{be_u16, be_u32, fourcc, le_u16, le_u32},
    error::DecodeError,
    pcm::{AudioFormat, EightBit},
};

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Location and layout of raw PCM inside a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmStream {
    /// Source layout; `is_little_endian` is the byte order on disk.
    pub format: AudioFormat,
    pub data_offset: u64,
    pub data_size: u64,
    pub eight_bit: EightBit,
}

/// The `fmt ` chunk of a WAV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl WavFormat {
    pub fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.len() < 16 {
            return Err(DecodeError::malformed(format!(
                "fmt chunk is {} bytes, expected at least 16",
                payload.len()
            )));
        }
        let mut format_tag = le_u16(payload, 0)?;
        if format_tag == WAVE_FORMAT_EXTENSIBLE {
            // The sub-format GUID starts with the effective format code.
            format_tag = le_u16(payload, 24)?;
        }
        Ok(Self {
            format_tag,
            channels: le_u16(payload, 2)?,
            sample_rate: le_u32(payload, 4)?,
            block_align: le_u16(payload, 12)?,
            bits_per_sample: le_u16(payload, 14)?,
        })
    }

    fn to_audio_format(self, data_size: u64) -> Result<AudioFormat, DecodeError> {
        match self.format_tag {
            WAVE_FORMAT_PCM => {}
            WAVE_FORMAT_IEEE_FLOAT => {
                return Err(DecodeError::unsupported("IEEE float WAV"));
            }
            other => {
                return Err(DecodeError::unsupported(format!("WAV format tag 0x{other:04x}")));
            }
        }
        let format = AudioFormat {
            sample_rate: self.sample_rate,
            channels: narrow_channels(self.channels)?,
            bits_per_sample: narrow_bits(self.bits_per_sample)?,
            total_samples: 0,
            is_little_endian: true,
        };
        format.validate()?;
        if usize::from(self.block_align) != format.bytes_per_frame() {
            return Err(DecodeError::malformed(format!(
                "block align {} does not match {} channel(s) of {} bits",
                self.block_align, format.channels, format.bits_per_sample
            )));
        }
        Ok(AudioFormat {
            total_samples: data_size / u64::from(self.block_align),
            ..format
        })
    }
}

/// The `COMM` chunk of an AIFF or AIFF-C file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AiffCommon {
    pub channels: u16,
    pub frames: u32,
    pub bits_per_sample: u16,
    pub sample_rate: u32,
    pub little_endian: bool,
}

impl AiffCommon {
    pub fn parse(payload: &[u8], compressed_form: bool) -> Result<Self, DecodeError> {
        if payload.len() < 18 {
            return Err(DecodeError::malformed("COMM chunk too small"));
        }
        let little_endian = if compressed_form {
            match payload.get(18..22) {
                Some(b"NONE") | Some(b"twos") => false,
                Some(b"sowt") => true,
                Some(code) => {
                    return Err(DecodeError::unsupported(format!(
                        "AIFC compression '{}'",
                        String::from_utf8_lossy(code)
                    )));
                }
                None => return Err(DecodeError::malformed("AIFC COMM without compression type")),
            }
        } else {
            false
        };

        Ok(Self {
            channels: be_u16(payload, 0)?,
            frames: be_u32(payload, 2)?,
            bits_per_sample: be_u16(payload, 6)?,
            sample_rate: extended_to_rate(&payload[8..18])?,
            little_endian,
        })
    }

    fn to_audio_format(self) -> Result<AudioFormat, DecodeError> {
        // Samples are left-aligned in whole bytes.
        let container_bits = self.bits_per_sample.div_ceil(8) * 8;
        let format = AudioFormat {
            sample_rate: self.sample_rate,
            channels: narrow_channels(self.channels)?,
            bits_per_sample: narrow_bits(container_bits)?,
            total_samples: u64::from(self.frames),
            is_little_endian: self.little_endian,
        };
        format.validate()?;
        Ok(format)
    }
}

/// Converts an IEEE 754 80-bit extended float to a whole sample rate.
pub fn extended_to_rate(bytes: &[u8]) -> Result<u32, DecodeError> {
    let bytes: &[u8; 10] = bytes
        .try_into()
        .map_err(|_| DecodeError::malformed("80-bit float must be 10 bytes"))?;
    let negative = bytes[0] & 0x80 != 0;
    let exponent = (i32::from(bytes[0] & 0x7F) << 8 | i32::from(bytes[1])) - 16_383;
    let mantissa = u64::from_be_bytes([
        bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7], bytes[8], bytes[9],
    ]);
    if mantissa == 0 {
        return Ok(0);
    }
    let value = mantissa as f64 / (1u64 << 63) as f64 * 2f64.powi(exponent);
    if negative || !value.is_finite() || value > f64::from(u32::MAX) {
        return Err(DecodeError::malformed(format!("invalid AIFF sample rate {value}")));
    }
    Ok(value.round() as u32)
}

fn narrow_channels(channels: u16) -> Result<u8, DecodeError> {
    u8::try_from(channels).map_err(|_| DecodeError::unsupported(format!("{channels} channels")))
}

fn narrow_bits(bits: u16) -> Result<u8, DecodeError> {
    u8::try_from(bits).map_err(|_| DecodeError::unsupported(format!("{bits} bits per sample")))
}

fn read_form_type<R: Read + Seek>(reader: &mut R, magic: &[u8; 4]) -> Result<[u8; 4], DecodeError> {
    let mut header = [0u8; 12];
    read_file_header(reader, &mut header, &String::from_utf8_lossy(magic))?;
    if &header[0..4] != magic {
        return Err(DecodeError::malformed(format!(
            "missing '{}' file header",
            String::from_utf8_lossy(magic)
        )));
    }
    Ok([header[8], header[9], header[10], header[11]])
}

/// Locates `fmt ` and `data` in a RIFF/WAVE file.
pub fn open_wav<R: Read + Seek>(reader: &mut R) -> Result<PcmStream, DecodeError> {
    if &read_form_type(reader, b"RIFF")? != b"WAVE" {
        return Err(DecodeError::malformed("RIFF form type is not WAVE"));
    }

    let fmt = find_chunk(reader, ChunkLayout::Riff, &[fourcc(b"fmt ")])?;
    let wav_format = WavFormat::parse(&read_payload(reader, &fmt)?)?;
    let data = find_chunk(reader, ChunkLayout::Riff, &[fourcc(b"data")])?;
    let format = wav_format.to_audio_format(data.payload_size)?;

    debug!(?format, data_size = data.payload_size, "WAV file opened");
    Ok(PcmStream {
        format,
        data_offset: data.byte_offset,
        data_size: data.payload_size,
        eight_bit: EightBit::Unsigned,
    })
}

/// Locates `COMM` and `SSND` in an AIFF or AIFF-C file.
pub fn open_aiff<R: Read + Seek>(reader: &mut R) -> Result<PcmStream, DecodeError> {
    let compressed_form = match &read_form_type(reader, b"FORM")? {
        b"AIFF" => false,
        b"AIFC" => true,
        other => {
            return Err(DecodeError::malformed(format!(
                "FORM type '{}' is not AIFF",
                String::from_utf8_lossy(other)
            )));
        }
    };

    let comm = find_chunk(reader, ChunkLayout::Iff, &[fourcc(b"COMM")])?;
    let common = AiffCommon::parse(&read_payload(reader, &comm)?, compressed_form)?;
    let format = common.to_audio_format()?;

    let ssnd = find_chunk(reader, ChunkLayout::Iff, &[fourcc(b"SSND")])?;
    reader.seek(SeekFrom::Start(ssnd.byte_offset))?;
    let mut ssnd_header = [0u8; 8];
    reader.read_exact(&mut ssnd_header)?;
    let skip = 8 + u64::from(u32::from_be_bytes([
        ssnd_header[0],
        ssnd_header[1],
        ssnd_header[2],
        ssnd_header[3],
    ]));
    if skip > ssnd.payload_size {
        return Err(DecodeError::malformed("SSND offset runs past the chunk"));
    }

    let declared = u64::from(common.frames) * format.bytes_per_frame() as u64;
    let data_size = declared.min(ssnd.payload_size - skip);

    debug!(?format, data_size, "AIFF file opened");
    Ok(PcmStream {
        format,
        data_offset: ssnd.byte_offset + skip,
        data_size,
        eight_bit: EightBit::SignedLegacy,
    })
}
