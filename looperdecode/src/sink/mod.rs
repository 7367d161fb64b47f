//! # Audio sinks
//!
//! A sink receives filled [`OutputBuffer`]s from the session and must hand
//! every one of them back through the [`CompletionHandle`] it was given at
//! open time, whether the audio was played or dropped. The session relies on
//! that promise when it waits for all buffers during teardown.
//!
//! | sink          | use                                                    |
//! |---------------|--------------------------------------------------------|
//! | [`NullSink`]  | discards audio, completes each buffer immediately      |
//! | [`MemorySink`]| captures PCM on a worker thread, used by tests         |
//! | `CpalSink`    | plays on the default output device (`cpal` feature)    |

mod memory;
mod null;

#[cfg(feature = "cpal")]
mod device;

pub use memory::{CaptureHandle, MemorySink};
pub use null::NullSink;

#[cfg(feature = "cpal")]
pub use device::CpalSink;

use crate::{
    error::DecodeError,
    pcm::AudioFormat,
    pool::{CompletionHandle, OutputBuffer, Rejected},
};

pub trait AudioSink {
    /// Prepares playback of `format`, little-endian interleaved PCM.
    fn open(&mut self, format: &AudioFormat, completions: CompletionHandle)
        -> Result<(), DecodeError>;

    /// Queues a filled buffer. A refused buffer is handed back in
    /// [`Rejected`] so the pool can reclaim it.
    fn enqueue(&mut self, buffer: OutputBuffer) -> Result<(), Rejected>;

    /// No more buffers will be enqueued. Queued audio still plays out.
    fn stop(&mut self) -> Result<(), DecodeError>;

    /// Drops queued audio that has not been played yet, completing its
    /// buffers right away.
    fn flush(&mut self) -> Result<(), DecodeError>;

    /// Releases the device once every buffer has come back.
    fn close(&mut self) {}
}

impl<S: AudioSink + ?Sized> AudioSink for Box<S> {
    fn open(
        &mut self,
        format: &AudioFormat,
        completions: CompletionHandle,
    ) -> Result<(), DecodeError> {
        (**self).open(format, completions)
    }

    fn enqueue(&mut self, buffer: OutputBuffer) -> Result<(), Rejected> {
        (**self).enqueue(buffer)
    }

    fn stop(&mut self) -> Result<(), DecodeError> {
        (**self).stop()
    }

    fn flush(&mut self) -> Result<(), DecodeError> {
        (**self).flush()
    }

    fn close(&mut self) {
        (**self).close()
    }
}
