use std::io::Read;

use opus::{Channels, Decoder};
use tracing::debug;

use super::{
    CodecAdapter, Decoded,
    ogg::{OggPacketReader, OggReaderOptions},
};
use crate::{
    error::DecodeError,
    pcm::{AudioFormat, Scratch, interleaved_i16},
};

/// Opus always decodes at 48 kHz.
const OUTPUT_RATE: u32 = 48_000;

/// 120 ms at 48 kHz, the longest Opus packet.
const MAX_FRAME_SAMPLES: usize = 5760;

/// The `OpusHead` identification header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpusHead {
    pub channels: u8,
    pub pre_skip: u16,
    pub input_sample_rate: u32,
    /// Q7.8 dB.
    pub output_gain: i16,
}

impl OpusHead {
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < 19 || &data[0..8] != b"OpusHead" {
            return Err(DecodeError::corrupt("invalid OpusHead packet"));
        }
        let version = data[8];
        if version == 0 || version > 15 {
            return Err(DecodeError::unsupported(format!("Opus version {version}")));
        }
        if data[18] != 0 {
            return Err(DecodeError::unsupported(format!(
                "Opus channel mapping family {}",
                data[18]
            )));
        }
        Ok(Self {
            channels: data[9],
            pre_skip: u16::from_le_bytes([data[10], data[11]]),
            input_sample_rate: u32::from_le_bytes([data[12], data[13], data[14], data[15]]),
            output_gain: i16::from_le_bytes([data[16], data[17]]),
        })
    }
}

/// Ogg Opus through libopus, honoring pre-skip and output gain.
pub struct OpusAdapter<R> {
    packets: OggPacketReader<R>,
    decoder: Decoder,
    pcm: Vec<i16>,
    pre_skip: usize,
    format: AudioFormat,
    closed: bool,
}

impl<R: Read> OpusAdapter<R> {
    pub fn open(reader: R) -> Result<Self, DecodeError> {
        let mut packets = OggPacketReader::new(
            reader,
            OggReaderOptions {
                find_sync: false,
                ..OggReaderOptions::default()
            },
        );

        let head_packet = packets
            .next_packet()?
            .ok_or_else(|| DecodeError::corrupt("missing OpusHead packet"))?;
        let head = OpusHead::parse(&head_packet)?;
        let tags = packets
            .next_packet()?
            .ok_or_else(|| DecodeError::corrupt("missing OpusTags packet"))?;
        if !tags.starts_with(b"OpusTags") {
            return Err(DecodeError::corrupt("invalid OpusTags packet"));
        }

        let channels = match head.channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            other => return Err(DecodeError::unsupported(format!("{other} Opus channels"))),
        };
        let mut decoder = Decoder::new(OUTPUT_RATE, channels)?;
        if head.output_gain != 0 {
            decoder.set_gain(i32::from(head.output_gain))?;
        }

        let format = AudioFormat {
            sample_rate: OUTPUT_RATE,
            channels: head.channels,
            bits_per_sample: 16,
            total_samples: 0,
            is_little_endian: true,
        };
        debug!(?format, ?head, "Opus stream opened");

        Ok(Self {
            packets,
            decoder,
            pcm: vec![0; MAX_FRAME_SAMPLES * usize::from(head.channels)],
            pre_skip: usize::from(head.pre_skip),
            format,
            closed: false,
        })
    }
}

impl<R: Read> CodecAdapter for OpusAdapter<R> {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn decode_next<'a>(&mut self, scratch: &'a mut Scratch) -> Result<Decoded<'a>, DecodeError> {
        let channels = usize::from(self.format.channels);
        loop {
            if self.closed {
                return Ok(Decoded::EndOfStream);
            }
            let Some(packet) = self.packets.next_packet()? else {
                return Ok(Decoded::EndOfStream);
            };
            let frames = self.decoder.decode(&packet, &mut self.pcm, false)?;

            let skipped = self.pre_skip.min(frames);
            self.pre_skip -= skipped;
            if skipped == frames {
                continue;
            }

            let samples = &self.pcm[skipped * channels..frames * channels];
            let out = scratch.begin(samples.len() * 2);
            interleaved_i16(samples, out);
            return Ok(Decoded::Fragment(scratch.fragment(frames - skipped)));
        }
    }

    fn max_fragment_bytes(&self) -> usize {
        self.pcm.len() * 2
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(channels: u8, mapping: u8) -> Vec<u8> {
        let mut out = b"OpusHead".to_vec();
        out.push(1);
        out.push(channels);
        out.extend_from_slice(&312u16.to_le_bytes());
        out.extend_from_slice(&44_100u32.to_le_bytes());
        out.extend_from_slice(&(-256i16).to_le_bytes());
        out.push(mapping);
        out
    }

    #[test]
    fn parses_opus_head() {
        let parsed = OpusHead::parse(&head(2, 0)).unwrap();
        assert_eq!(parsed.channels, 2);
        assert_eq!(parsed.pre_skip, 312);
        assert_eq!(parsed.input_sample_rate, 44_100);
        assert_eq!(parsed.output_gain, -256);
    }

    #[test]
    fn rejects_surround_mapping() {
        assert!(matches!(
            OpusHead::parse(&head(6, 1)),
            Err(DecodeError::UnsupportedFormat(_))
        ));
        assert!(OpusHead::parse(b"OpusTags").is_err());
    }
}
