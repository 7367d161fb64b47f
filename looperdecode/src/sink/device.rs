//! Playback on the default output device through cpal.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::AudioSink;
use crate::{
    error::DecodeError,
    pcm::AudioFormat,
    pool::{CompletionHandle, OutputBuffer, Rejected},
};

/// Buffers shared between the producer and the cpal callback.
struct Playback {
    queue: VecDeque<OutputBuffer>,
    /// Read position inside the front buffer, in bytes.
    cursor: usize,
    bits: u8,
    completions: Option<CompletionHandle>,
}

impl Playback {
    fn next_sample(&mut self) -> Option<f32> {
        let width = usize::from(self.bits / 8);
        let front = self.queue.front()?;
        let bytes = front.as_bytes();
        let sample = bytes.get(self.cursor..self.cursor + width).map(|s| to_f32(s, self.bits));
        self.cursor += width;
        if self.cursor >= bytes.len() {
            self.cursor = 0;
            if let (Some(done), Some(completions)) = (self.queue.pop_front(), &self.completions) {
                completions.complete(done);
            }
        }
        sample
    }

    fn discard_all(&mut self) -> usize {
        let mut discarded = 0;
        self.cursor = 0;
        while let Some(buffer) = self.queue.pop_front() {
            if let Some(completions) = &self.completions {
                completions.complete(buffer);
            }
            discarded += 1;
        }
        discarded
    }
}

fn to_f32(sample: &[u8], bits: u8) -> f32 {
    match bits {
        8 => (f32::from(sample[0]) - 128.0) / 128.0,
        16 => f32::from(i16::from_le_bytes([sample[0], sample[1]])) / 32_768.0,
        24 => {
            let value = i32::from_le_bytes([0, sample[0], sample[1], sample[2]]) >> 8;
            value as f32 / 8_388_608.0
        }
        _ => {
            let value = i32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]]);
            value as f32 / 2_147_483_648.0
        }
    }
}

/// Plays PCM on the system's default output device.
pub struct CpalSink {
    volume: f32,
    shared: Arc<Mutex<Playback>>,
    stream: Option<cpal::Stream>,
    accepting: bool,
}

impl Default for CpalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalSink {
    pub fn new() -> Self {
        Self::with_volume(1.0)
    }

    pub fn with_volume(volume: f32) -> Self {
        Self {
            volume: volume.clamp(0.0, 1.0),
            shared: Arc::new(Mutex::new(Playback {
                queue: VecDeque::new(),
                cursor: 0,
                bits: 16,
                completions: None,
            })),
            stream: None,
            accepting: false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Playback> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AudioSink for CpalSink {
    fn open(
        &mut self,
        format: &AudioFormat,
        completions: CompletionHandle,
    ) -> Result<(), DecodeError> {
        {
            let mut playback = self.lock();
            playback.discard_all();
            playback.bits = format.bits_per_sample;
            playback.completions = Some(completions);
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| DecodeError::Sink("no output device available".into()))?;
        tracing::debug!(
            "Using audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let config = cpal::StreamConfig {
            channels: u16::from(format.channels),
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let shared = Arc::clone(&self.shared);
        let volume = self.volume;
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut playback = shared.lock().unwrap_or_else(PoisonError::into_inner);
                    for sample in data.iter_mut() {
                        *sample = playback.next_sample().unwrap_or(0.0) * volume;
                    }
                },
                move |err| {
                    tracing::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| DecodeError::Sink(format!("failed to build output stream: {e}")))?;

        stream
            .play()
            .map_err(|e| DecodeError::Sink(format!("failed to start output stream: {e}")))?;

        self.stream = Some(stream);
        self.accepting = true;
        tracing::debug!(?format, volume = self.volume, "cpal sink opened");
        Ok(())
    }

    fn enqueue(&mut self, buffer: OutputBuffer) -> Result<(), Rejected> {
        if !self.accepting {
            return Err(Rejected {
                buffer,
                reason: "output stream is stopped".into(),
            });
        }
        self.lock().queue.push_back(buffer);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DecodeError> {
        self.accepting = false;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DecodeError> {
        let discarded = self.lock().discard_all();
        tracing::debug!(discarded, "cpal sink flushed");
        Ok(())
    }

    fn close(&mut self) {
        self.accepting = false;
        self.stream = None;
        let mut playback = self.lock();
        playback.discard_all();
        playback.completions = None;
    }
}
