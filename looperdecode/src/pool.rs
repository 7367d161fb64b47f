//! # Bounded output-buffer pool
//!
//! A fixed set of N byte buffers circulates between the decode producer and
//! the audio sink:
//!
//! ```text
//!   Free ──claim──▶ Filled ──submit──▶ InFlight ──complete──▶ Free
//! ```
//!
//! The producer owns the [`BufferPool`] and is the only writer: it fills the
//! buffer at `current_index` until it is full (carrying the rest of the input
//! into the next buffer), hands it to the sink and advances the index modulo
//! N. When the next buffer has not come back yet the producer sleeps on a
//! condition variable until the sink's [`CompletionHandle`] returns it.
//!
//! Buffers are allocated once in [`BufferPool::new`]; their storage moves to
//! the sink and back, so nothing is allocated during playback.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, trace};

use crate::{error::DecodeError, sink::AudioSink};

pub const DEFAULT_BUFFER_COUNT: usize = 3;
pub const DEFAULT_BUFFER_SIZE: usize = 0x50000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferState {
    Free,
    Filled,
    InFlight,
}

/// One pooled buffer. Sinks receive it through [`AudioSink::enqueue`] and
/// give it back through [`CompletionHandle::complete`].
#[derive(Debug)]
pub struct OutputBuffer {
    id: usize,
    data: Vec<u8>,
    capacity: usize,
}

impl OutputBuffer {
    fn new(id: usize, capacity: usize) -> Self {
        Self {
            id,
            data: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn used(&self) -> usize {
        self.data.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn remaining(&self) -> usize {
        self.capacity - self.data.len()
    }

    fn is_full(&self) -> bool {
        self.data.len() == self.capacity
    }
}

/// Snapshot of the pool bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub free: usize,
    pub filled: usize,
    pub in_flight: usize,
}

impl PoolStats {
    pub fn total(&self) -> usize {
        self.free + self.filled + self.in_flight
    }
}

#[derive(Debug)]
struct PoolState {
    states: Vec<BufferState>,
    slots: Vec<Option<OutputBuffer>>,
    free_count: usize,
}

impl PoolState {
    fn stats(&self) -> PoolStats {
        let count = |wanted| self.states.iter().filter(|&&s| s == wanted).count();
        PoolStats {
            free: count(BufferState::Free),
            filled: count(BufferState::Filled),
            in_flight: count(BufferState::InFlight),
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<PoolState>,
    returned: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            error!("buffer pool mutex poisoned, continuing with inner state");
            PoisonError::into_inner(poisoned)
        })
    }
}

/// Handed to the sink at open time; returns played buffers to the pool.
#[derive(Debug, Clone)]
pub struct CompletionHandle {
    shared: Arc<Shared>,
}

impl CompletionHandle {
    /// Marks `buffer` free again and wakes the producer.
    pub fn complete(&self, mut buffer: OutputBuffer) {
        let mut state = self.shared.lock();
        let id = buffer.id;
        match state.states.get(id) {
            Some(BufferState::InFlight) if state.slots[id].is_none() => {
                buffer.data.clear();
                state.slots[id] = Some(buffer);
                state.states[id] = BufferState::Free;
                state.free_count += 1;
                trace!(buffer = id, free = state.free_count, "buffer returned");
                drop(state);
                self.shared.returned.notify_all();
            }
            other => {
                error!(buffer = id, state = ?other, "rejected completion for a buffer that is not in flight");
            }
        }
    }
}

/// Returned by a sink that refuses a buffer, handing it back to the pool.
#[derive(Debug)]
pub struct Rejected {
    pub buffer: OutputBuffer,
    pub reason: String,
}

#[derive(Debug)]
pub struct BufferPool {
    shared: Arc<Shared>,
    count: usize,
    capacity: usize,
    current_index: usize,
    filling: Option<OutputBuffer>,
}

impl BufferPool {
    pub fn new(count: usize, capacity: usize) -> Result<Self, DecodeError> {
        if count == 0 || capacity == 0 {
            return Err(DecodeError::unsupported(format!(
                "buffer pool needs at least one non-empty buffer (count {count}, size {capacity})"
            )));
        }
        let state = PoolState {
            states: vec![BufferState::Free; count],
            slots: (0..count).map(|id| Some(OutputBuffer::new(id, capacity))).collect(),
            free_count: count,
        };
        debug!(count, capacity, "buffer pool allocated");
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                returned: Condvar::new(),
            }),
            count,
            capacity,
            current_index: 0,
            filling: None,
        })
    }

    pub fn completion_handle(&self) -> CompletionHandle {
        CompletionHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn buffer_count(&self) -> usize {
        self.count
    }

    pub fn buffer_size(&self) -> usize {
        self.capacity
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn free_count(&self) -> usize {
        self.shared.lock().free_count
    }

    pub fn stats(&self) -> PoolStats {
        self.shared.lock().stats()
    }

    /// Copies `data` into the pool, submitting every buffer that fills up.
    pub fn write<S>(&mut self, mut data: &[u8], sink: &mut S) -> Result<(), DecodeError>
    where
        S: AudioSink + ?Sized,
    {
        while !data.is_empty() {
            if self.filling.is_none() {
                let claimed = self.claim();
                self.filling = Some(claimed);
            }
            let Some(buffer) = self.filling.as_mut() else {
                continue;
            };
            let take = buffer.remaining().min(data.len());
            buffer.data.extend_from_slice(&data[..take]);
            data = &data[take..];

            if buffer.is_full() {
                self.submit(sink)?;
            }
        }
        Ok(())
    }

    /// Submits the partially filled buffer, if any, at end of stream.
    pub fn flush<S>(&mut self, sink: &mut S) -> Result<(), DecodeError>
    where
        S: AudioSink + ?Sized,
    {
        match self.filling.as_ref() {
            Some(buffer) if buffer.used() > 0 => self.submit(sink),
            Some(_) => {
                self.release_filling();
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Returns any unsent buffer and blocks until every buffer is free.
    pub fn drain(&mut self) {
        self.release_filling();
        let mut state = self.shared.lock();
        while state.free_count < self.count {
            trace!(free = state.free_count, total = self.count, "waiting for sink to return buffers");
            state = self
                .shared
                .returned
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        debug!(total = self.count, "all buffers returned");
    }

    fn claim(&mut self) -> OutputBuffer {
        let index = self.current_index;
        let mut state = self.shared.lock();
        while state.states[index] != BufferState::Free {
            state = self
                .shared
                .returned
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        let buffer = state.slots[index]
            .take()
            .unwrap_or_else(|| OutputBuffer::new(index, self.capacity));
        state.states[index] = BufferState::Filled;
        state.free_count -= 1;
        buffer
    }

    fn submit<S>(&mut self, sink: &mut S) -> Result<(), DecodeError>
    where
        S: AudioSink + ?Sized,
    {
        let Some(buffer) = self.filling.take() else {
            return Ok(());
        };
        let id = buffer.id;
        self.shared.lock().states[id] = BufferState::InFlight;
        self.current_index = (self.current_index + 1) % self.count;
        trace!(buffer = id, bytes = buffer.used(), "buffer submitted");

        sink.enqueue(buffer).map_err(|rejected| {
            let reason = rejected.reason.clone();
            self.completion_handle().complete(rejected.buffer);
            DecodeError::Sink(reason)
        })
    }

    fn release_filling(&mut self) {
        if let Some(mut buffer) = self.filling.take() {
            buffer.data.clear();
            let mut state = self.shared.lock();
            let id = buffer.id;
            state.slots[id] = Some(buffer);
            state.states[id] = BufferState::Free;
            state.free_count += 1;
            drop(state);
            self.shared.returned.notify_all();
        }
    }
}
