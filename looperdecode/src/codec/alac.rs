use std::io::{Read, Seek};

use symphonia::core::{
    audio::SampleBuffer,
    codecs::{CODEC_TYPE_ALAC, CodecParameters, Decoder, DecoderOptions},
    formats::Packet,
};
use symphonia::default::codecs::AlacDecoder;
use tracing::debug;

use super::{CodecAdapter, Decoded, PacketReader, PacketSizes};
use crate::{
    alac::{AlacConfig, CONFIG_SIZE, strip_atoms},
    caf::{CafFile, FORMAT_ALAC},
    endian::fourcc_str,
    error::DecodeError,
    mp4::{CodecConfig, Mp4File},
    pcm::{AudioFormat, EightBit, Scratch, interleave_planar},
};

/// Edit list applied to decoded packets: leading priming frames, the short
/// final packet and the overall valid frame count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameTrim {
    skip: u64,
    remaining: u64,
    last_packet_frames: Option<u64>,
}

impl FrameTrim {
    pub(crate) fn unbounded() -> Self {
        Self {
            skip: 0,
            remaining: u64::MAX,
            last_packet_frames: None,
        }
    }

    /// Returns the `(start, len)` frame range of a packet to keep.
    pub(crate) fn apply(&mut self, decoded: u64, is_last: bool) -> (usize, usize) {
        let frames = match self.last_packet_frames {
            Some(cap) if is_last => decoded.min(cap),
            _ => decoded,
        };
        let start = self.skip.min(frames);
        self.skip -= start;
        let len = (frames - start).min(self.remaining);
        self.remaining -= len;
        (start as usize, len as usize)
    }

    fn exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Apple Lossless from a CAF or M4A container.
pub struct AlacAdapter<R> {
    packets: PacketReader<R>,
    decoder: AlacDecoder,
    samples: Option<SampleBuffer<i32>>,
    config: AlacConfig,
    format: AudioFormat,
    trim: FrameTrim,
    timestamp: u64,
    closed: bool,
}

impl<R: Read + Seek> AlacAdapter<R> {
    pub fn open_caf(mut reader: R) -> Result<Self, DecodeError> {
        let caf = CafFile::open(&mut reader)?;
        if caf.description.format_id != FORMAT_ALAC {
            return Err(DecodeError::unsupported(format!(
                "CAF format '{}' is not ALAC",
                fourcc_str(caf.description.format_id)
            )));
        }
        let cookie = caf
            .cookie
            .as_deref()
            .ok_or_else(|| DecodeError::malformed("ALAC CAF file has no 'kuki' chunk"))?;
        let config = AlacConfig::parse(cookie)?;
        let table = caf
            .packet_table
            .ok_or_else(|| DecodeError::malformed("ALAC CAF file has no 'pakt' chunk"))?;

        let header = table.header;
        let frames_per_packet = match caf.description.frames_per_packet {
            0 => u64::from(config.frame_length),
            n => u64::from(n),
        };
        let trim = FrameTrim {
            skip: header.priming_frames as u64,
            remaining: header.valid_frames as u64,
            last_packet_frames: (header.remainder_frames > 0)
                .then(|| frames_per_packet.saturating_sub(header.remainder_frames as u64)),
        };

        let mut format = caf
            .description
            .to_audio_format(Some(&config), header.valid_frames as u64)?;
        format.bits_per_sample = config.output_bits();

        let packets = PacketReader::new(
            reader,
            PacketSizes::Table(table.sizes),
            caf.audio_offset,
            caf.audio_offset + caf.audio_size,
        )?;
        Self::new(packets, cookie, config, format, trim)
    }

    pub fn open_m4a(mut reader: R) -> Result<Self, DecodeError> {
        let file = Mp4File::open(&mut reader)?;
        let CodecConfig::Alac(cookie) = &file.entry.config else {
            return Err(DecodeError::unsupported("M4A track is not ALAC"));
        };
        let config = AlacConfig::parse(cookie)?;

        let mut format = file.audio_format(config.output_bits())?;
        if format.sample_rate == 0 {
            format.sample_rate = config.sample_rate;
        }
        let trim = match file.media.duration {
            0 => FrameTrim::unbounded(),
            duration => FrameTrim {
                remaining: duration,
                ..FrameTrim::unbounded()
            },
        };

        let packets = PacketReader::new(
            reader,
            PacketSizes::Mp4(file.sizes.clone()),
            file.data_offset,
            file.data_end,
        )?;
        Self::new(packets, cookie, config, format, trim)
    }

    fn new(
        packets: PacketReader<R>,
        cookie: &[u8],
        config: AlacConfig,
        format: AudioFormat,
        trim: FrameTrim,
    ) -> Result<Self, DecodeError> {
        format.validate()?;
        let extra_data = strip_atoms(cookie)?[..CONFIG_SIZE].to_vec().into_boxed_slice();
        let mut params = CodecParameters::new();
        params.for_codec(CODEC_TYPE_ALAC).with_extra_data(extra_data);
        let decoder = AlacDecoder::try_new(&params, &DecoderOptions::default())?;

        debug!(
            ?format,
            frame_length = config.frame_length,
            packets = packets.packet_count(),
            ?trim,
            "ALAC stream opened"
        );
        Ok(Self {
            packets,
            decoder,
            samples: None,
            config,
            format,
            trim,
            timestamp: 0,
            closed: false,
        })
    }
}

impl<R: Read + Seek> CodecAdapter for AlacAdapter<R> {
    fn format(&self) -> AudioFormat {
        self.format.normalized()
    }

    fn decode_next<'a>(&mut self, scratch: &'a mut Scratch) -> Result<Decoded<'a>, DecodeError> {
        loop {
            if self.closed || self.trim.exhausted() {
                return Ok(Decoded::EndOfStream);
            }
            let is_last = self.packets.position() + 1 == self.packets.packet_count();
            let Some(data) = self.packets.next_packet()? else {
                return Ok(Decoded::EndOfStream);
            };
            let packet = Packet::new_from_slice(
                0,
                self.timestamp,
                u64::from(self.config.frame_length),
                data,
            );

            let decoded = self.decoder.decode(&packet)?;
            let frames = decoded.frames();
            let channels = decoded.spec().channels.count();
            if channels != usize::from(self.format.channels) {
                return Err(DecodeError::corrupt(format!(
                    "ALAC packet decoded {channels} channels, stream has {}",
                    self.format.channels
                )));
            }
            self.timestamp += frames as u64;

            let needed = frames * channels;
            if self.samples.as_ref().is_none_or(|s| s.capacity() < needed) {
                self.samples = Some(SampleBuffer::new(
                    frames.max(self.config.frame_length as usize) as u64,
                    *decoded.spec(),
                ));
            }
            let Some(samples) = self.samples.as_mut() else {
                continue;
            };
            samples.copy_planar_ref(decoded);

            let (start, len) = self.trim.apply(frames as u64, is_last);
            if len == 0 {
                continue;
            }

            let data = samples.samples();
            let plane = |ch: usize| &data[ch * frames + start..ch * frames + start + len];
            let bits = self.format.bits_per_sample;
            let shift = 32 - u32::from(bits);
            let out = scratch.begin(len * self.format.bytes_per_frame());
            match channels {
                1 => interleave_planar(&[plane(0)], bits, shift, EightBit::SignedLegacy, out),
                _ => interleave_planar(&[plane(0), plane(1)], bits, shift, EightBit::SignedLegacy, out),
            }
            return Ok(Decoded::Fragment(scratch.fragment(len)));
        }
    }

    fn max_fragment_bytes(&self) -> usize {
        self.config.frame_length as usize * self.format.bytes_per_frame()
    }

    fn close(&mut self) {
        self.closed = true;
        self.samples = None;
    }
}
