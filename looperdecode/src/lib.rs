//! # looperdecode
//!
//! Streaming decode of local audio files into a bounded set of output
//! buffers consumed by an audio sink.
//!
//! The crate walks container structures (CAF, MPEG-4, RIFF/WAVE, IFF/AIFF,
//! Ogg, ADTS), extracts the stream format, feeds packets to the matching
//! decoder library and normalizes whatever the decoder produces into
//! interleaved little-endian PCM. A fixed pool of buffers bounds memory: the
//! decoder blocks until the sink hands a buffer back.
//!
//! ## Supported inputs
//!
//! | container | codecs             |
//! |-----------|--------------------|
//! | FLAC      | FLAC               |
//! | CAF       | ALAC, linear PCM   |
//! | M4A / MP4 | ALAC, AAC          |
//! | ADTS      | AAC, HE-AAC        |
//! | MPEG      | MP3                |
//! | Ogg       | Vorbis, Opus       |
//! | WAV, AIFF | linear PCM         |
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use looperdecode::{AbortHandle, NullSink, SessionOptions, play_file};
//!
//! fn main() -> Result<(), looperdecode::DecodeError> {
//!     let mut sink = NullSink::new();
//!     let report = play_file(
//!         Path::new("track.m4a"),
//!         &mut sink,
//!         &SessionOptions::default(),
//!         &AbortHandle::new(),
//!     )?;
//!     println!("{} frames at {} Hz", report.frames, report.format.sample_rate);
//!     Ok(())
//! }
//! ```
//!
//! ## Async
//!
//! [`play_file_async`] runs the same blocking session on tokio's blocking
//! pool and builds the sink on that thread.

pub mod adts;
pub mod alac;
pub mod caf;
pub mod chunk;
pub mod codec;
pub mod detect;
pub mod endian;
mod error;
pub mod mp4;
pub mod pcm;
pub mod pool;
pub mod riff;
pub mod ring;
pub mod session;
pub mod sink;

pub use codec::{CodecAdapter, Decoded};
pub use detect::ContainerFormat;
pub use error::{DecodeError, ErrorKind};
pub use pcm::{AudioFormat, PcmFragment, Scratch};
pub use pool::{BufferPool, CompletionHandle, OutputBuffer, PoolStats, Rejected};
pub use session::{
    AbortHandle, PlaybackReport, SessionOptions, adapter_for, open_adapter, play_adapter,
    play_file, play_file_async,
};
pub use sink::{AudioSink, CaptureHandle, MemorySink, NullSink};

#[cfg(feature = "cpal")]
pub use sink::CpalSink;
