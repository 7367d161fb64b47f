//! ALAC magic cookie (`ALACSpecificConfig`).
//!
//! The 24-byte config may be stored bare or behind `frma` and `alac` atom
//! headers, depending on the writer. Layout of the config itself:
//!
//! ```text
//! 0  frameLength        u32
//! 4  compatibleVersion  u8
//! 5  bitDepth           u8
//! 6  pb, mb, kb         u8 x3
//! 9  numChannels        u8
//! 10 maxRun             u16
//! 12 maxFrameBytes      u32
//! 16 avgBitRate         u32
//! 20 sampleRate         u32
//! ```

use crate::{
    endian::be_u32,
    error::DecodeError,
};

pub const CONFIG_SIZE: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlacConfig {
    pub frame_length: u32,
    pub bit_depth: u8,
    pub channels: u8,
    pub sample_rate: u32,
}

impl AlacConfig {
    pub fn parse(cookie: &[u8]) -> Result<Self, DecodeError> {
        let config = strip_atoms(cookie)?;
        if config[4] != 0 {
            return Err(DecodeError::unsupported(format!(
                "ALAC compatible version {}",
                config[4]
            )));
        }
        let parsed = Self {
            frame_length: be_u32(config, 0)?,
            bit_depth: config[5],
            channels: config[9],
            sample_rate: be_u32(config, 20)?,
        };
        if !matches!(parsed.bit_depth, 16 | 20 | 24 | 32) {
            return Err(DecodeError::unsupported(format!(
                "ALAC bit depth {}",
                parsed.bit_depth
            )));
        }
        if parsed.frame_length == 0 || parsed.channels == 0 {
            return Err(DecodeError::malformed(format!("invalid ALAC config {parsed:?}")));
        }
        Ok(parsed)
    }

    /// Depth delivered to the sink; 20-bit streams are widened to 24.
    pub fn output_bits(&self) -> u8 {
        if self.bit_depth == 20 { 24 } else { self.bit_depth }
    }
}

/// Returns the config bytes, without any `frma`/`alac` atom headers.
pub fn strip_atoms(cookie: &[u8]) -> Result<&[u8], DecodeError> {
    let mut data = cookie;
    if data.len() >= 12 && &data[4..8] == b"frma" {
        data = &data[12..];
    }
    if data.len() >= 12 && &data[4..8] == b"alac" {
        data = &data[12..];
    }
    if data.len() < CONFIG_SIZE {
        return Err(DecodeError::malformed(format!(
            "ALAC magic cookie has {} bytes, expected at least {CONFIG_SIZE}",
            data.len()
        )));
    }
    Ok(data)
}

#[cfg(test)]
pub(crate) fn config_bytes(frame_length: u32, bit_depth: u8, channels: u8, sample_rate: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(CONFIG_SIZE);
    out.extend_from_slice(&frame_length.to_be_bytes());
    out.extend_from_slice(&[0, bit_depth, 40, 10, 14, channels]);
    out.extend_from_slice(&255u16.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&sample_rate.to_be_bytes());
    out
}
