//! ADTS framing for raw `.aac` streams.

use crate::error::DecodeError;

pub const HEADER_LEN: usize = 7;

const SAMPLE_RATES: [u32; 13] = [
    96_000, 88_200, 64_000, 48_000, 44_100, 32_000, 24_000, 22_050, 16_000, 12_000, 11_025,
    8_000, 7_350,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    /// Audio object type minus one.
    pub profile: u8,
    pub sample_rate_index: u8,
    pub channel_config: u8,
    pub protection_absent: bool,
    /// Whole frame length, header included.
    pub frame_length: usize,
}

impl AdtsHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_LEN {
            return Err(DecodeError::corrupt("truncated ADTS header"));
        }
        if bytes[0] != 0xFF || bytes[1] & 0xF0 != 0xF0 {
            return Err(DecodeError::corrupt(format!(
                "lost ADTS sync (found {:02x}{:02x})",
                bytes[0], bytes[1]
            )));
        }

        let frame_length = (usize::from(bytes[3] & 0x03) << 11)
            | (usize::from(bytes[4]) << 3)
            | usize::from(bytes[5] >> 5);
        if frame_length <= HEADER_LEN {
            return Err(DecodeError::corrupt(format!(
                "ADTS frame length {frame_length} leaves no payload"
            )));
        }

        Ok(Self {
            profile: bytes[2] >> 6,
            sample_rate_index: (bytes[2] >> 2) & 0x0F,
            channel_config: ((bytes[2] & 0x01) << 2) | (bytes[3] >> 6),
            protection_absent: bytes[1] & 0x01 == 1,
            frame_length,
        })
    }

    pub fn sample_rate(&self) -> Option<u32> {
        SAMPLE_RATES.get(usize::from(self.sample_rate_index)).copied()
    }
}

/// Total length of a leading ID3v2 tag, header included.
pub fn id3v2_len(bytes: &[u8]) -> Option<u64> {
    if bytes.len() < 10 || &bytes[0..3] != b"ID3" {
        return None;
    }
    let size = bytes[6..10]
        .iter()
        .fold(0u64, |acc, &b| (acc << 7) | u64::from(b & 0x7F));
    let footer = if bytes[5] & 0x10 != 0 { 10 } else { 0 };
    Some(10 + size + footer)
}

#[cfg(test)]
pub(crate) fn header_bytes(sample_rate_index: u8, channels: u8, frame_length: usize) -> [u8; 7] {
    let len = frame_length as u32;
    [
        0xFF,
        0xF1,
        (1 << 6) | (sample_rate_index << 2) | (channels >> 2),
        ((channels & 0x03) << 6) | ((len >> 11) & 0x03) as u8,
        ((len >> 3) & 0xFF) as u8,
        (((len & 0x07) << 5) as u8) | 0x1F,
        0xFC,
    ]
}
