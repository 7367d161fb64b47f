//! # Playback session
//!
//! A session drives one file through the pipeline
//!
//! ```text
//! container + codec adapter ──> Scratch ──> BufferPool ──> AudioSink
//! ```
//!
//! on the calling thread. The producer only blocks inside the pool, waiting
//! for the sink to hand a buffer back. Cancellation is cooperative: the
//! [`AbortHandle`] is checked between decode units and ends the session the
//! same way end of stream does.
//!
//! Teardown always runs in the same order, whether the stream ended, was
//! aborted or failed:
//!
//! 1. the partially filled buffer is submitted (normal end only),
//! 2. `sink.stop()`, then `sink.flush()` when a failure is being unwound,
//! 3. the pool waits until every buffer is back,
//! 4. `sink.close()` and `adapter.close()`.
//!
//! [`play_file_async`] runs the same session on tokio's blocking pool.

use std::{
    fs::File,
    io::{BufReader, Read, Seek},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use tracing::{debug, error, info, warn};

use crate::{
    caf::{CafFile, FORMAT_ALAC, FORMAT_LPCM},
    codec::{
        AacAdapter, AlacAdapter, CodecAdapter, DEFAULT_FRAMES_PER_UNIT, Decoded, FlacAdapter,
        LpcmAdapter, Mp3Adapter, OpusAdapter, VorbisAdapter,
    },
    detect::{self, ContainerFormat},
    endian::fourcc_str,
    error::DecodeError,
    mp4::{CodecConfig, Mp4File},
    pcm::{AudioFormat, Scratch},
    pool::{BufferPool, DEFAULT_BUFFER_COUNT, DEFAULT_BUFFER_SIZE},
    sink::AudioSink,
};

/// Tuning knobs of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Number of output buffers shared with the sink.
    pub buffer_count: usize,
    /// Size of each output buffer in bytes, rounded down to whole frames.
    pub buffer_size: usize,
    /// Frames per decode unit for FLAC and uncompressed PCM.
    pub frames_per_unit: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            buffer_count: DEFAULT_BUFFER_COUNT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            frames_per_unit: DEFAULT_FRAMES_PER_UNIT,
        }
    }
}

/// Cooperative stop request shared between a session and its controller.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the session to stop after the current decode unit.
    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// What a finished session delivered to its sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackReport {
    pub format: AudioFormat,
    /// PCM frames written into the pool.
    pub frames: u64,
    pub bytes: u64,
    pub aborted: bool,
}

/// Opens `path` and builds the adapter its container and codec call for.
pub fn open_adapter(
    path: &Path,
    options: &SessionOptions,
) -> Result<Box<dyn CodecAdapter>, DecodeError> {
    let container = detect::detect_file(path)?;
    debug!(path = %path.display(), %container, "container detected");
    let reader = BufReader::new(File::open(path)?);
    adapter_for(container, reader, options)
}

/// Builds the adapter for an already identified container.
pub fn adapter_for<R>(
    container: ContainerFormat,
    mut reader: R,
    options: &SessionOptions,
) -> Result<Box<dyn CodecAdapter>, DecodeError>
where
    R: Read + Seek + 'static,
{
    let frames = options.frames_per_unit;
    let adapter: Box<dyn CodecAdapter> = match container {
        ContainerFormat::Flac => Box::new(FlacAdapter::open(reader, frames)?),
        ContainerFormat::Caf => {
            let format_id = CafFile::open(&mut reader)?.description.format_id;
            match format_id {
                FORMAT_ALAC => Box::new(AlacAdapter::open_caf(reader)?),
                FORMAT_LPCM => Box::new(LpcmAdapter::open_caf(reader, frames)?),
                other => {
                    return Err(DecodeError::unsupported(format!(
                        "CAF audio in '{}'",
                        fourcc_str(other)
                    )));
                }
            }
        }
        ContainerFormat::Mp4 => match Mp4File::open(&mut reader)?.entry.config {
            CodecConfig::Alac(_) => Box::new(AlacAdapter::open_m4a(reader)?),
            CodecConfig::Aac(_) => Box::new(AacAdapter::open_m4a(reader)?),
        },
        ContainerFormat::Adts => Box::new(AacAdapter::open_adts(reader)?),
        ContainerFormat::Mp3 => Box::new(Mp3Adapter::open(reader)?),
        ContainerFormat::OggVorbis => Box::new(VorbisAdapter::open(reader)?),
        ContainerFormat::OggOpus => Box::new(OpusAdapter::open(reader)?),
        ContainerFormat::Wav => Box::new(LpcmAdapter::open_wav(reader, frames)?),
        ContainerFormat::Aiff => Box::new(LpcmAdapter::open_aiff(reader, frames)?),
    };
    Ok(adapter)
}

/// Plays one file into `sink`, blocking until the sink has returned every
/// buffer.
pub fn play_file<S>(
    path: &Path,
    sink: &mut S,
    options: &SessionOptions,
    abort: &AbortHandle,
) -> Result<PlaybackReport, DecodeError>
where
    S: AudioSink + ?Sized,
{
    let adapter = open_adapter(path, options)?;
    info!(path = %path.display(), "playback starting");
    let result = play_adapter(adapter, sink, options, abort);
    if let Err(err) = &result {
        warn!(path = %path.display(), kind = ?err.kind(), "playback failed: {err}");
    }
    result
}

/// Runs a session over an adapter that is already open.
pub fn play_adapter<A, S>(
    mut adapter: A,
    sink: &mut S,
    options: &SessionOptions,
    abort: &AbortHandle,
) -> Result<PlaybackReport, DecodeError>
where
    A: CodecAdapter,
    S: AudioSink + ?Sized,
{
    let format = adapter.format();
    let pool = format
        .validate()
        .and_then(|()| BufferPool::new(options.buffer_count, frame_aligned(options.buffer_size, &format)));
    let mut pool = match pool {
        Ok(pool) => pool,
        Err(err) => {
            adapter.close();
            return Err(err);
        }
    };
    if let Err(err) = sink.open(&format, pool.completion_handle()) {
        adapter.close();
        return Err(err);
    }

    let started = Instant::now();
    info!(
        sample_rate = format.sample_rate,
        channels = format.channels,
        bits = format.bits_per_sample,
        buffers = pool.buffer_count(),
        buffer_size = pool.buffer_size(),
        "session opened"
    );

    let mut report = PlaybackReport {
        format,
        frames: 0,
        bytes: 0,
        aborted: false,
    };
    let mut scratch = Scratch::with_capacity(adapter.max_fragment_bytes());

    let produced = pump(&mut adapter, sink, &mut pool, &mut scratch, abort, &mut report)
        .and_then(|()| pool.flush(sink));

    match produced {
        Ok(()) => {
            let stopped = sink.stop();
            pool.drain();
            sink.close();
            adapter.close();
            stopped?;
            info!(
                frames = report.frames,
                bytes = report.bytes,
                aborted = report.aborted,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "session finished"
            );
            Ok(report)
        }
        Err(err) => {
            unwind(sink, &mut pool);
            adapter.close();
            Err(err)
        }
    }
}

/// Runs [`play_file`] on tokio's blocking pool.
///
/// The sink is built by `make_sink` on the blocking thread, so sinks tied to
/// the thread that created them (audio device streams) work as well.
pub async fn play_file_async<F, S>(
    path: impl Into<PathBuf>,
    make_sink: F,
    options: SessionOptions,
    abort: AbortHandle,
) -> Result<PlaybackReport, DecodeError>
where
    F: FnOnce() -> Result<S, DecodeError> + Send + 'static,
    S: AudioSink,
{
    let path = path.into();
    let handle = tokio::task::spawn_blocking(move || {
        let mut sink = make_sink()?;
        play_file(&path, &mut sink, &options, &abort)
    });
    match handle.await {
        Ok(result) => result,
        Err(err) => Err(DecodeError::TaskJoin {
            role: "playback",
            details: err.to_string(),
        }),
    }
}

fn pump<A, S>(
    adapter: &mut A,
    sink: &mut S,
    pool: &mut BufferPool,
    scratch: &mut Scratch,
    abort: &AbortHandle,
    report: &mut PlaybackReport,
) -> Result<(), DecodeError>
where
    A: CodecAdapter,
    S: AudioSink + ?Sized,
{
    loop {
        if abort.is_aborted() {
            info!(frames = report.frames, "playback aborted");
            report.aborted = true;
            return Ok(());
        }
        match adapter.decode_next(scratch)? {
            Decoded::Fragment(fragment) => {
                if fragment.bytes.is_empty() {
                    continue;
                }
                pool.write(fragment.bytes, sink)?;
                report.frames += fragment.frames as u64;
                report.bytes += fragment.bytes.len() as u64;
            }
            Decoded::EndOfStream => return Ok(()),
        }
    }
}

/// Teardown after a failure: nothing queued is played.
fn unwind<S: AudioSink + ?Sized>(sink: &mut S, pool: &mut BufferPool) {
    if let Err(err) = sink.stop() {
        error!("sink stop failed during teardown: {err}");
    }
    if let Err(err) = sink.flush() {
        error!("sink flush failed during teardown: {err}");
    }
    pool.drain();
    sink.close();
}

/// Output buffers hold whole frames so no sample straddles two buffers.
fn frame_aligned(size: usize, format: &AudioFormat) -> usize {
    let frame = format.bytes_per_frame().max(1);
    (size / frame * frame).max(frame)
}
