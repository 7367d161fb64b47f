use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use tracing::{debug, warn};

use super::AudioSink;
use crate::{
    error::DecodeError,
    pcm::AudioFormat,
    pool::{CompletionHandle, OutputBuffer, Rejected},
};

#[derive(Debug, Default)]
struct Captured {
    format: Option<AudioFormat>,
    bytes: Vec<u8>,
    buffers: usize,
    discarded: usize,
    in_flight: usize,
    max_in_flight: usize,
    stopped: bool,
    closed: bool,
}

/// Read access to what a [`MemorySink`] captured, usable after the sink
/// itself has been moved into a session.
#[derive(Debug, Clone, Default)]
pub struct CaptureHandle {
    inner: Arc<Mutex<Captured>>,
}

impl CaptureHandle {
    fn lock(&self) -> MutexGuard<'_, Captured> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn format(&self) -> Option<AudioFormat> {
        self.lock().format
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.lock().bytes.clone()
    }

    pub fn byte_len(&self) -> usize {
        self.lock().bytes.len()
    }

    /// Buffers played into the capture.
    pub fn buffers(&self) -> usize {
        self.lock().buffers
    }

    /// Buffers handed back unplayed after a flush.
    pub fn discarded(&self) -> usize {
        self.lock().discarded
    }

    /// Highest number of buffers held by the sink at once.
    pub fn max_in_flight(&self) -> usize {
        self.lock().max_in_flight
    }

    pub fn was_stopped(&self) -> bool {
        self.lock().stopped
    }

    pub fn was_closed(&self) -> bool {
        self.lock().closed
    }
}

/// Captures PCM in memory, completing buffers from its own thread like a
/// hardware callback would.
#[derive(Debug)]
pub struct MemorySink {
    capture: CaptureHandle,
    delay: Duration,
    fail_after: Option<usize>,
    accepted: usize,
    accepting: bool,
    discarding: Arc<AtomicBool>,
    tx: Option<mpsc::Sender<OutputBuffer>>,
    worker: Option<JoinHandle<()>>,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            capture: CaptureHandle::default(),
            delay: Duration::ZERO,
            fail_after: None,
            accepted: 0,
            accepting: false,
            discarding: Arc::new(AtomicBool::new(false)),
            tx: None,
            worker: None,
        }
    }

    /// Simulated playback time per buffer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Refuses every buffer after the first `count`.
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    pub fn capture(&self) -> CaptureHandle {
        self.capture.clone()
    }

    fn join_worker(&mut self) {
        self.tx = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("memory sink worker panicked");
            }
        }
    }
}

impl AudioSink for MemorySink {
    fn open(
        &mut self,
        format: &AudioFormat,
        completions: CompletionHandle,
    ) -> Result<(), DecodeError> {
        self.join_worker();
        {
            let mut captured = self.capture.lock();
            *captured = Captured {
                format: Some(*format),
                ..Captured::default()
            };
        }
        self.accepted = 0;
        self.accepting = true;
        self.discarding.store(false, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel::<OutputBuffer>();
        let capture = self.capture.clone();
        let discarding = Arc::clone(&self.discarding);
        let delay = self.delay;
        let worker = thread::Builder::new()
            .name("memory-sink".into())
            .spawn(move || {
                for buffer in rx {
                    let discard = discarding.load(Ordering::SeqCst);
                    if !discard && !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    {
                        let mut captured = capture.lock();
                        if discard {
                            captured.discarded += 1;
                        } else {
                            captured.bytes.extend_from_slice(buffer.as_bytes());
                            captured.buffers += 1;
                        }
                        captured.in_flight -= 1;
                    }
                    completions.complete(buffer);
                }
            })?;

        self.tx = Some(tx);
        self.worker = Some(worker);
        debug!(?format, "memory sink opened");
        Ok(())
    }

    fn enqueue(&mut self, buffer: OutputBuffer) -> Result<(), Rejected> {
        if !self.accepting {
            return Err(Rejected {
                buffer,
                reason: "memory sink is not accepting buffers".into(),
            });
        }
        if self.fail_after.is_some_and(|limit| self.accepted >= limit) {
            return Err(Rejected {
                buffer,
                reason: format!("memory sink refused buffer {}", self.accepted),
            });
        }
        let Some(tx) = self.tx.as_ref() else {
            return Err(Rejected {
                buffer,
                reason: "memory sink is not open".into(),
            });
        };

        {
            let mut captured = self.capture.lock();
            captured.in_flight += 1;
            captured.max_in_flight = captured.max_in_flight.max(captured.in_flight);
        }
        match tx.send(buffer) {
            Ok(()) => {
                self.accepted += 1;
                Ok(())
            }
            Err(mpsc::SendError(buffer)) => {
                self.capture.lock().in_flight -= 1;
                Err(Rejected {
                    buffer,
                    reason: "memory sink worker stopped".into(),
                })
            }
        }
    }

    fn stop(&mut self) -> Result<(), DecodeError> {
        self.accepting = false;
        self.capture.lock().stopped = true;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DecodeError> {
        self.discarding.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) {
        self.accepting = false;
        self.join_worker();
        self.capture.lock().closed = true;
    }
}

impl Drop for MemorySink {
    fn drop(&mut self) {
        self.join_worker();
    }
}
