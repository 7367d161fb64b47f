use std::io::Read;

use lewton::{
    audio::{PreviousWindowRight, read_audio_packet_generic},
    header::{IdentHeader, SetupHeader, read_header_comment, read_header_ident, read_header_setup},
    samples::InterleavedSamples,
};
use tracing::debug;

use super::{
    CodecAdapter, Decoded,
    ogg::{OggPacketReader, OggReaderOptions},
};
use crate::{
    error::DecodeError,
    pcm::{AudioFormat, Scratch, interleaved_i16},
};

/// Ogg Vorbis through lewton's packet-level API.
pub struct VorbisAdapter<R> {
    packets: OggPacketReader<R>,
    ident: IdentHeader,
    setup: SetupHeader,
    window: PreviousWindowRight,
    format: AudioFormat,
    closed: bool,
}

impl<R: Read> VorbisAdapter<R> {
    pub fn open(reader: R) -> Result<Self, DecodeError> {
        let mut packets = OggPacketReader::new(reader, OggReaderOptions::default());

        let ident_packet = packets
            .next_packet()?
            .ok_or_else(|| DecodeError::corrupt("missing Vorbis identification header"))?;
        let ident = read_header_ident(&ident_packet)?;

        let comment_packet = packets
            .next_packet()?
            .ok_or_else(|| DecodeError::corrupt("missing Vorbis comment header"))?;
        read_header_comment(&comment_packet)?;

        let setup_packet = packets
            .next_packet()?
            .ok_or_else(|| DecodeError::corrupt("missing Vorbis setup header"))?;
        let setup = read_header_setup(
            &setup_packet,
            ident.audio_channels,
            (ident.blocksize_0, ident.blocksize_1),
        )?;

        let format = AudioFormat {
            sample_rate: ident.audio_sample_rate,
            channels: ident.audio_channels,
            bits_per_sample: 16,
            total_samples: 0,
            is_little_endian: true,
        };
        format.validate()?;
        debug!(?format, blocksize = 1u32 << ident.blocksize_1, "Vorbis stream opened");

        Ok(Self {
            packets,
            ident,
            setup,
            window: PreviousWindowRight::new(),
            format,
            closed: false,
        })
    }
}

impl<R: Read> CodecAdapter for VorbisAdapter<R> {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn decode_next<'a>(&mut self, scratch: &'a mut Scratch) -> Result<Decoded<'a>, DecodeError> {
        loop {
            if self.closed {
                return Ok(Decoded::EndOfStream);
            }
            let Some(packet) = self.packets.next_packet()? else {
                return Ok(Decoded::EndOfStream);
            };
            let decoded: InterleavedSamples<i16> =
                read_audio_packet_generic(&self.ident, &self.setup, &packet, &mut self.window)?;
            if decoded.samples.is_empty() {
                continue;
            }

            let out = scratch.begin(decoded.samples.len() * 2);
            interleaved_i16(&decoded.samples, out);
            return Ok(Decoded::Fragment(
                scratch.fragment(decoded.samples.len() / usize::from(self.format.channels)),
            ));
        }
    }

    fn max_fragment_bytes(&self) -> usize {
        (1usize << self.ident.blocksize_1) * usize::from(self.format.channels) * 2
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
