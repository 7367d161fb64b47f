use tracing::debug;

use super::AudioSink;
use crate::{
    error::DecodeError,
    pcm::AudioFormat,
    pool::{CompletionHandle, OutputBuffer, Rejected},
};

/// Discards everything it is given.
#[derive(Debug, Default)]
pub struct NullSink {
    completions: Option<CompletionHandle>,
    bytes: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// PCM bytes received since the last `open`.
    pub fn bytes_received(&self) -> u64 {
        self.bytes
    }
}

impl AudioSink for NullSink {
    fn open(
        &mut self,
        format: &AudioFormat,
        completions: CompletionHandle,
    ) -> Result<(), DecodeError> {
        debug!(?format, "null sink opened");
        self.completions = Some(completions);
        self.bytes = 0;
        Ok(())
    }

    fn enqueue(&mut self, buffer: OutputBuffer) -> Result<(), Rejected> {
        let Some(completions) = self.completions.as_ref() else {
            return Err(Rejected {
                buffer,
                reason: "null sink is not open".into(),
            });
        };
        self.bytes += buffer.used() as u64;
        completions.complete(buffer);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DecodeError> {
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DecodeError> {
        Ok(())
    }

    fn close(&mut self) {
        self.completions = None;
    }
}
