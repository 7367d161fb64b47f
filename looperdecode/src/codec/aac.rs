use std::io::{Read, Seek, SeekFrom};

use fdk_aac::dec::{Decoder, Transport};
use tracing::{debug, warn};

use super::{CodecAdapter, Decoded, MAX_CONSECUTIVE_ERRORS, PacketReader, PacketSizes, read_up_to};
use crate::{
    adts::{self, AdtsHeader},
    error::DecodeError,
    mp4::{CodecConfig, Mp4File},
    pcm::{AudioFormat, Scratch, interleaved_i16},
};

/// Room for one decoded frame: 2048 samples (HE-AAC) for up to 8 channels.
const PCM_CAPACITY: usize = 8 * 2048;

enum Source<R> {
    /// Self-delimiting ADTS frames read one at a time.
    Adts { reader: R, frame: Vec<u8> },
    /// Raw access units sized by `stsz`.
    M4a(PacketReader<R>),
}

/// AAC through fdk-aac, from an ADTS stream or an M4A track.
///
/// The first frame is decoded while opening, so the format reflects what the
/// decoder actually outputs (HE-AAC doubles the core sample rate).
pub struct AacAdapter<R> {
    source: Source<R>,
    decoder: Decoder,
    pcm: Vec<i16>,
    /// Samples of the frame decoded during open, not yet handed out.
    pending: Option<usize>,
    format: AudioFormat,
    failures: usize,
    closed: bool,
}

impl<R: Read + Seek> AacAdapter<R> {
    pub fn open_adts(mut reader: R) -> Result<Self, DecodeError> {
        let mut prefix = [0u8; 10];
        let read = read_up_to(&mut reader, &mut prefix)?;
        let start = adts::id3v2_len(&prefix[..read]).unwrap_or(0);
        reader.seek(SeekFrom::Start(start))?;
        if start > 0 {
            debug!(bytes = start, "skipped ID3v2 tag before ADTS stream");
        }

        let source = Source::Adts {
            reader,
            frame: Vec::with_capacity(1 << 13),
        };
        Self::prime(source, Decoder::new(Transport::Adts), 0)
    }

    pub fn open_m4a(mut reader: R) -> Result<Self, DecodeError> {
        let file = Mp4File::open(&mut reader)?;
        let CodecConfig::Aac(asc) = &file.entry.config else {
            return Err(DecodeError::unsupported("M4A track is not AAC"));
        };

        let mut decoder = Decoder::new(Transport::Raw);
        decoder
            .config_raw(asc)
            .map_err(|err| DecodeError::unsupported(format!("AudioSpecificConfig: {err:?}")))?;

        let packets = PacketReader::new(
            reader,
            PacketSizes::Mp4(file.sizes.clone()),
            file.data_offset,
            file.data_end,
        )?;
        Self::prime(Source::M4a(packets), decoder, file.media.duration)
    }

    fn prime(source: Source<R>, decoder: Decoder, total_samples: u64) -> Result<Self, DecodeError> {
        let mut adapter = Self {
            source,
            decoder,
            pcm: vec![0; PCM_CAPACITY],
            pending: None,
            format: AudioFormat {
                sample_rate: 0,
                channels: 0,
                bits_per_sample: 16,
                total_samples,
                is_little_endian: true,
            },
            failures: 0,
            closed: false,
        };

        let first = adapter
            .next_frame()?
            .ok_or_else(|| DecodeError::corrupt("stream holds no decodable AAC frame"))?;
        let info = adapter.decoder.stream_info();
        adapter.format.sample_rate = u32::try_from(info.sampleRate)
            .map_err(|_| DecodeError::corrupt(format!("AAC sample rate {}", info.sampleRate)))?;
        adapter.format.channels = u8::try_from(info.numChannels)
            .map_err(|_| DecodeError::unsupported(format!("{} channels", info.numChannels)))?;
        adapter.format.validate()?;
        adapter.pending = Some(first);

        debug!(format = ?adapter.format, frame_size = info.frameSize, "AAC stream opened");
        Ok(adapter)
    }

    /// Loads the next encoded frame into the decoder.
    fn feed(&mut self) -> Result<bool, DecodeError> {
        let consumed = match &mut self.source {
            Source::Adts { reader, frame } => {
                frame.resize(adts::HEADER_LEN, 0);
                let read = read_up_to(reader, &mut frame[..])?;
                if read == 0 {
                    return Ok(false);
                }
                if read < adts::HEADER_LEN {
                    warn!(bytes = read, "truncated ADTS header at end of stream");
                    return Ok(false);
                }
                let header = AdtsHeader::parse(frame)?;
                frame.resize(header.frame_length, 0);
                let read = read_up_to(reader, &mut frame[adts::HEADER_LEN..])?;
                if read < header.frame_length - adts::HEADER_LEN {
                    warn!(
                        expected = header.frame_length,
                        got = read + adts::HEADER_LEN,
                        "truncated ADTS frame at end of stream"
                    );
                    return Ok(false);
                }
                let len = frame.len();
                (self.decoder.fill(frame), len)
            }
            Source::M4a(packets) => match packets.next_packet()? {
                Some(packet) => (self.decoder.fill(packet), packet.len()),
                None => return Ok(false),
            },
        };

        match consumed {
            (Ok(used), len) if used < len => {
                warn!(used, len, "AAC decoder did not take the whole frame");
                Ok(true)
            }
            (Ok(_), _) => Ok(true),
            (Err(err), _) => Err(DecodeError::corrupt(format!("AAC fill: {err:?}"))),
        }
    }

    /// Decodes one frame into `self.pcm` and returns its sample count.
    fn next_frame(&mut self) -> Result<Option<usize>, DecodeError> {
        loop {
            if !self.feed()? {
                return Ok(None);
            }
            match self.decoder.decode_frame(&mut self.pcm) {
                Ok(()) => {
                    self.failures = 0;
                    return Ok(Some(self.decoder.decoded_frame_size()));
                }
                Err(err) => {
                    if matches!(self.source, Source::M4a(_)) {
                        return Err(DecodeError::corrupt(format!("AAC frame: {err:?}")));
                    }
                    self.failures += 1;
                    warn!(failures = self.failures, "skipping undecodable AAC frame: {err:?}");
                    if self.failures >= MAX_CONSECUTIVE_ERRORS {
                        return Err(DecodeError::corrupt(format!(
                            "{} consecutive undecodable AAC frames",
                            self.failures
                        )));
                    }
                }
            }
        }
    }
}

impl<R: Read + Seek> CodecAdapter for AacAdapter<R> {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn decode_next<'a>(&mut self, scratch: &'a mut Scratch) -> Result<Decoded<'a>, DecodeError> {
        if self.closed {
            return Ok(Decoded::EndOfStream);
        }
        let samples = match self.pending.take() {
            Some(samples) => samples,
            None => match self.next_frame()? {
                Some(samples) => samples,
                None => return Ok(Decoded::EndOfStream),
            },
        };

        let samples = samples.min(self.pcm.len());
        let out = scratch.begin(samples * 2);
        interleaved_i16(&self.pcm[..samples], out);
        Ok(Decoded::Fragment(
            scratch.fragment(samples / usize::from(self.format.channels)),
        ))
    }

    fn max_fragment_bytes(&self) -> usize {
        PCM_CAPACITY * 2
    }

    fn close(&mut self) {
        self.closed = true;
        self.pending = None;
    }
}
