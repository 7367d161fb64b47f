use std::io::{Read, Seek, SeekFrom};

use minimp3::{Decoder, Error as Mp3Error, Frame};
use tracing::{debug, warn};

use super::{CodecAdapter, Decoded, MAX_CONSECUTIVE_ERRORS, read_up_to};
use crate::{
    adts,
    error::DecodeError,
    pcm::{AudioFormat, Scratch, interleaved_i16},
};

/// Largest MPEG audio frame: 1152 samples per channel.
const MAX_FRAME_SAMPLES: usize = 1152 * 2;

/// MPEG-1/2 Layer III through minimp3.
pub struct Mp3Adapter<R> {
    decoder: Decoder<R>,
    /// First frame, decoded while opening to learn the format.
    pending: Option<Frame>,
    format: AudioFormat,
    failures: usize,
    closed: bool,
}

impl<R: Read + Seek> Mp3Adapter<R> {
    pub fn open(mut reader: R) -> Result<Self, DecodeError> {
        let mut prefix = [0u8; 10];
        let read = read_up_to(&mut reader, &mut prefix)?;
        let start = adts::id3v2_len(&prefix[..read]).unwrap_or(0);
        reader.seek(SeekFrom::Start(start))?;
        if start > 0 {
            debug!(bytes = start, "skipped ID3v2 tag before MP3 stream");
        }

        let mut decoder = Decoder::new(reader);
        let first = loop {
            match next_frame(&mut decoder)? {
                Some(frame) if frame.channels > 0 && frame.sample_rate > 0 => break frame,
                Some(_) => continue,
                None => return Err(DecodeError::corrupt("stream holds no decodable MP3 frame")),
            }
        };

        let format = AudioFormat {
            sample_rate: first.sample_rate as u32,
            channels: u8::try_from(first.channels)
                .map_err(|_| DecodeError::unsupported(format!("{} channels", first.channels)))?,
            bits_per_sample: 16,
            total_samples: 0,
            is_little_endian: true,
        };
        format.validate()?;
        debug!(?format, bitrate = first.bitrate, "MP3 stream opened");

        Ok(Self {
            decoder,
            pending: Some(first),
            format,
            failures: 0,
            closed: false,
        })
    }
}

/// Pulls the next frame. minimp3 resynchronizes over garbage on its own and
/// only reports end of input or I/O failures.
fn next_frame<R: Read>(decoder: &mut Decoder<R>) -> Result<Option<Frame>, DecodeError> {
    match decoder.next_frame() {
        Ok(frame) => Ok(Some(frame)),
        Err(Mp3Error::Eof) => Ok(None),
        Err(Mp3Error::Io(err)) => Err(err.into()),
        Err(err @ (Mp3Error::InsufficientData | Mp3Error::SkippedData)) => {
            Err(DecodeError::corrupt(format!("MP3 decoder stopped: {err}")))
        }
    }
}

impl<R: Read> CodecAdapter for Mp3Adapter<R> {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn decode_next<'a>(&mut self, scratch: &'a mut Scratch) -> Result<Decoded<'a>, DecodeError> {
        if self.closed {
            return Ok(Decoded::EndOfStream);
        }
        let frame = loop {
            let frame = match self.pending.take() {
                Some(frame) => frame,
                None => match next_frame(&mut self.decoder)? {
                    Some(frame) => frame,
                    None => return Ok(Decoded::EndOfStream),
                },
            };
            if frame.sample_rate as u32 == self.format.sample_rate
                && frame.channels == usize::from(self.format.channels)
            {
                self.failures = 0;
                break frame;
            }
            self.failures += 1;
            warn!(
                sample_rate = frame.sample_rate,
                channels = frame.channels,
                failures = self.failures,
                "dropping MP3 frame whose format differs from the stream"
            );
            if self.failures >= MAX_CONSECUTIVE_ERRORS {
                return Err(DecodeError::corrupt(format!(
                    "{} consecutive MP3 frames in a different format",
                    self.failures
                )));
            }
        };

        let out = scratch.begin(frame.data.len() * 2);
        interleaved_i16(&frame.data, out);
        Ok(Decoded::Fragment(
            scratch.fragment(frame.data.len() / frame.channels),
        ))
    }

    fn max_fragment_bytes(&self) -> usize {
        MAX_FRAME_SAMPLES * 2
    }

    fn close(&mut self) {
        self.closed = true;
        self.pending = None;
    }
}
