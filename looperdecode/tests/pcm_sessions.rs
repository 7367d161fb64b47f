use looperdecode::{
    AbortHandle, DecodeError, MemorySink, SessionOptions, detect::ContainerFormat,
    detect::detect_file, play_file,
};

mod fixtures;

fn small_buffers() -> SessionOptions {
    SessionOptions {
        buffer_count: 3,
        buffer_size: 1024,
        frames_per_unit: 100,
    }
}

#[test]
fn wav_plays_byte_exact() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let pcm = fixtures::stereo_ramp_le(1000);
    let path = fixtures::write_file(dir.path(), "ramp.wav", &fixtures::wav(2, 44_100, 16, &pcm))?;
    assert_eq!(detect_file(&path)?, ContainerFormat::Wav);

    let mut sink = MemorySink::new();
    let capture = sink.capture();
    let report = play_file(&path, &mut sink, &small_buffers(), &AbortHandle::new())?;

    assert_eq!(report.frames, 1000);
    assert_eq!(report.format.sample_rate, 44_100);
    assert_eq!(report.format.channels, 2);
    assert_eq!(report.format.total_samples, 1000);
    assert!(!report.aborted);
    assert_eq!(capture.bytes(), pcm);
    assert!(capture.max_in_flight() <= 3);
    assert!(capture.was_stopped());
    assert!(capture.was_closed());
    Ok(())
}

#[test]
fn wav_eight_bit_stays_unsigned() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let pcm: Vec<u8> = (0..=255).collect();
    let path = fixtures::write_file(dir.path(), "bytes.wav", &fixtures::wav(1, 8_000, 8, &pcm))?;

    let mut sink = MemorySink::new();
    let capture = sink.capture();
    let report = play_file(&path, &mut sink, &small_buffers(), &AbortHandle::new())?;
    assert_eq!(report.frames, 256);
    assert_eq!(capture.bytes(), pcm);
    Ok(())
}

#[test]
fn aiff_big_endian_samples_are_swapped() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let samples: Vec<i16> = (0..500).map(|i| (i * 61 - 15_000) as i16).collect();
    let be: Vec<u8> = samples.iter().flat_map(|s| s.to_be_bytes()).collect();
    let le: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    let path = fixtures::write_file(
        dir.path(),
        "ramp.aiff",
        &fixtures::aiff(1, samples.len() as u32, 16, &be),
    )?;

    let mut sink = MemorySink::new();
    let capture = sink.capture();
    let report = play_file(&path, &mut sink, &small_buffers(), &AbortHandle::new())?;
    assert_eq!(report.frames, 500);
    assert_eq!(report.format.sample_rate, 44_100);
    assert!(report.format.is_little_endian);
    assert_eq!(capture.bytes(), le);
    Ok(())
}

#[test]
fn aiff_eight_bit_is_biased_to_unsigned() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let signed = [0x00u8, 0x7F, 0x80, 0xFF];
    let path = fixtures::write_file(dir.path(), "tiny.aif", &fixtures::aiff(1, 4, 8, &signed))?;

    let mut sink = MemorySink::new();
    let capture = sink.capture();
    play_file(&path, &mut sink, &small_buffers(), &AbortHandle::new())?;
    assert_eq!(capture.bytes(), [0x80, 0xFF, 0x00, 0x7F]);
    Ok(())
}

#[test]
fn caf_lpcm_24_bit_big_endian() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let frames = 300usize;
    let mut be = Vec::new();
    let mut le = Vec::new();
    for i in 0..frames * 2 {
        let value = (i as i32 * 4099 - 600_000).to_be_bytes();
        be.extend_from_slice(&value[1..]);
        le.extend_from_slice(&[value[3], value[2], value[1]]);
    }
    let file = fixtures::caf(&[
        fixtures::caf_chunk(b"desc", &fixtures::caf_desc(b"lpcm", 0, 6, 1, 2, 24)),
        fixtures::caf_chunk(b"data", &fixtures::caf_data(&[be])),
    ]);
    let path = fixtures::write_file(dir.path(), "wide.caf", &file)?;

    let mut sink = MemorySink::new();
    let capture = sink.capture();
    let report = play_file(&path, &mut sink, &small_buffers(), &AbortHandle::new())?;
    assert_eq!(report.frames, frames as u64);
    assert_eq!(report.format.bits_per_sample, 24);
    assert_eq!(capture.bytes(), le);
    Ok(())
}

#[test]
fn float_wav_is_unsupported() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let mut file = fixtures::wav(1, 44_100, 32, &[0; 16]);
    // Format tag 3: IEEE float.
    file[20] = 3;
    let path = fixtures::write_file(dir.path(), "float.wav", &file)?;

    let mut sink = MemorySink::new();
    let capture = sink.capture();
    let err = play_file(&path, &mut sink, &small_buffers(), &AbortHandle::new()).unwrap_err();
    assert!(matches!(err, DecodeError::UnsupportedFormat(_)));
    // The sink is never opened when the file cannot be decoded.
    assert_eq!(capture.format(), None);
    Ok(())
}

#[test]
fn unknown_file_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = fixtures::write_file(dir.path(), "notes.txt", b"not audio at all")?;
    let mut sink = MemorySink::new();
    let err = play_file(&path, &mut sink, &small_buffers(), &AbortHandle::new()).unwrap_err();
    assert!(matches!(err, DecodeError::UnsupportedFormat(_)));
    Ok(())
}

#[test]
fn wav_with_unpatched_data_size_plays_what_exists() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let pcm = fixtures::stereo_ramp_le(1000);
    let mut file = fixtures::wav(2, 44_100, 16, &pcm);
    // Cut the file mid-frame: 899 whole frames and two stray bytes remain.
    file.truncate(file.len() - 402);
    let path = fixtures::write_file(dir.path(), "cut.wav", &file)?;

    let mut sink = MemorySink::new();
    let capture = sink.capture();
    let report = play_file(&path, &mut sink, &small_buffers(), &AbortHandle::new())?;
    assert_eq!(report.frames, 899);
    assert_eq!(capture.bytes(), pcm[..899 * 4].to_vec());
    assert!(capture.was_closed());
    Ok(())
}

#[test]
fn aiff_with_short_sound_chunk_plays_what_exists() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let samples: Vec<i16> = (0..300).map(|i| (i * 97 - 14_000) as i16).collect();
    let be: Vec<u8> = samples.iter().flat_map(|s| s.to_be_bytes()).collect();
    let le: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    let mut file = fixtures::aiff(1, samples.len() as u32, 16, &be);
    file.truncate(file.len() - 100);
    let path = fixtures::write_file(dir.path(), "cut.aiff", &file)?;

    let mut sink = MemorySink::new();
    let capture = sink.capture();
    let report = play_file(&path, &mut sink, &small_buffers(), &AbortHandle::new())?;
    assert_eq!(report.frames, 250);
    assert_eq!(capture.bytes(), le[..500].to_vec());
    Ok(())
}
