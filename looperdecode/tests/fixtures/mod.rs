//! Byte-level builders for the container fixtures used by the integration
//! tests. Every file is assembled in memory; nothing is read from disk.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, bytes)?;
    Ok(path)
}

/// Interleaved 16-bit stereo ramp, little-endian.
pub fn stereo_ramp_le(frames: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(frames * 4);
    for i in 0..frames {
        let left = (i as i16).wrapping_mul(3);
        let right = -(i as i16);
        out.extend_from_slice(&left.to_le_bytes());
        out.extend_from_slice(&right.to_le_bytes());
    }
    out
}

pub fn wav(channels: u16, sample_rate: u32, bits: u16, data: &[u8]) -> Vec<u8> {
    let block_align = channels * bits.div_ceil(8);
    let mut fmt = Vec::new();
    fmt.extend_from_slice(&1u16.to_le_bytes());
    fmt.extend_from_slice(&channels.to_le_bytes());
    fmt.extend_from_slice(&sample_rate.to_le_bytes());
    fmt.extend_from_slice(&(sample_rate * u32::from(block_align)).to_le_bytes());
    fmt.extend_from_slice(&block_align.to_le_bytes());
    fmt.extend_from_slice(&bits.to_le_bytes());

    let mut body = b"WAVE".to_vec();
    riff_chunk(&mut body, b"fmt ", &fmt, u32::to_le_bytes);
    riff_chunk(&mut body, b"LIST", b"INFOpad", u32::to_le_bytes);
    riff_chunk(&mut body, b"data", data, u32::to_le_bytes);

    let mut out = b"RIFF".to_vec();
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);
    out
}

/// AIFF with a big-endian `COMM` chunk and an `SSND` chunk.
pub fn aiff(channels: u16, frames: u32, bits: u16, data: &[u8]) -> Vec<u8> {
    let mut comm = Vec::new();
    comm.extend_from_slice(&channels.to_be_bytes());
    comm.extend_from_slice(&frames.to_be_bytes());
    comm.extend_from_slice(&bits.to_be_bytes());
    // 44100 Hz as an 80-bit extended float.
    comm.extend_from_slice(&[0x40, 0x0E, 0xAC, 0x44, 0, 0, 0, 0, 0, 0]);

    let mut ssnd = Vec::new();
    ssnd.extend_from_slice(&0u32.to_be_bytes());
    ssnd.extend_from_slice(&0u32.to_be_bytes());
    ssnd.extend_from_slice(data);

    let mut body = b"AIFF".to_vec();
    riff_chunk(&mut body, b"COMM", &comm, u32::to_be_bytes);
    riff_chunk(&mut body, b"SSND", &ssnd, u32::to_be_bytes);

    let mut out = b"FORM".to_vec();
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
    out
}

fn riff_chunk(out: &mut Vec<u8>, tag: &[u8; 4], payload: &[u8], size: fn(u32) -> [u8; 4]) {
    out.extend_from_slice(tag);
    out.extend_from_slice(&size(payload.len() as u32));
    out.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        out.push(0);
    }
}

pub fn caf_chunk(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = tag.to_vec();
    out.extend_from_slice(&(payload.len() as i64).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

pub fn caf(chunks: &[Vec<u8>]) -> Vec<u8> {
    let mut out = b"caff".to_vec();
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    for chunk in chunks {
        out.extend_from_slice(chunk);
    }
    out
}

pub fn caf_desc(
    format: &[u8; 4],
    flags: u32,
    bytes_per_packet: u32,
    frames_per_packet: u32,
    channels: u32,
    bits: u32,
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&44_100f64.to_be_bytes());
    out.extend_from_slice(format);
    out.extend_from_slice(&flags.to_be_bytes());
    out.extend_from_slice(&bytes_per_packet.to_be_bytes());
    out.extend_from_slice(&frames_per_packet.to_be_bytes());
    out.extend_from_slice(&channels.to_be_bytes());
    out.extend_from_slice(&bits.to_be_bytes());
    out
}

/// Data chunk payload: the 4-byte edit count, then the packets.
pub fn caf_data(packets: &[Vec<u8>]) -> Vec<u8> {
    let mut out = 0u32.to_be_bytes().to_vec();
    for packet in packets {
        out.extend_from_slice(packet);
    }
    out
}

pub fn alac_config(frame_length: u32, bit_depth: u8, channels: u8) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&frame_length.to_be_bytes());
    out.extend_from_slice(&[0, bit_depth, 40, 10, 14, channels]);
    out.extend_from_slice(&255u16.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&44_100u32.to_be_bytes());
    out
}

/// Frames per packet of the ALAC fixtures.
pub const ALAC_FRAME_LENGTH: u32 = 16;

/// MSB-first bit packer.
#[derive(Default)]
struct BitWriter {
    out: Vec<u8>,
    current: u8,
    used: u32,
}

impl BitWriter {
    fn push(&mut self, value: u32, bits: u32) {
        for i in (0..bits).rev() {
            self.current = (self.current << 1) | ((value >> i) & 1) as u8;
            self.used += 1;
            if self.used == 8 {
                self.out.push(self.current);
                self.current = 0;
                self.used = 0;
            }
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.used > 0 {
            self.out.push(self.current << (8 - self.used));
        }
        self.out
    }
}

/// One mono 16-bit ALAC packet stored uncompressed (escape flag set).
pub fn alac_escape_packet(samples: &[i16]) -> Vec<u8> {
    let partial = samples.len() != ALAC_FRAME_LENGTH as usize;
    let mut bits = BitWriter::default();
    bits.push(0, 3); // single channel element
    bits.push(0, 4); // element instance
    bits.push(0, 12); // unused
    bits.push(u32::from(partial), 1);
    bits.push(0, 2); // bytes shifted
    bits.push(1, 1); // escape: samples stored verbatim
    if partial {
        bits.push(samples.len() as u32, 32);
    }
    for &sample in samples {
        bits.push(u32::from(sample as u16), 16);
    }
    bits.push(7, 3); // end element
    bits.finish()
}

/// The two packets of the ALAC fixtures: one full, one holding 12 frames.
pub fn alac_packets() -> Vec<Vec<u8>> {
    let full: Vec<i16> = (0..16).map(|i| i * 100).collect();
    let tail: Vec<i16> = (0..12).map(|i| -i * 100).collect();
    vec![alac_escape_packet(&full), alac_escape_packet(&tail)]
}

/// Mono 16-bit CAF/ALAC with a packet table declaring `valid_frames`,
/// `priming_frames` and `remainder_frames`.
pub fn caf_alac(valid_frames: i64, priming_frames: i32, remainder_frames: i32) -> Vec<u8> {
    let packets = alac_packets();
    let mut pakt = Vec::new();
    pakt.extend_from_slice(&(packets.len() as i64).to_be_bytes());
    pakt.extend_from_slice(&valid_frames.to_be_bytes());
    pakt.extend_from_slice(&priming_frames.to_be_bytes());
    pakt.extend_from_slice(&remainder_frames.to_be_bytes());
    for packet in &packets {
        assert!(packet.len() < 128);
        pakt.push(packet.len() as u8);
    }

    caf(&[
        caf_chunk(b"desc", &caf_desc(b"alac", 1, 0, ALAC_FRAME_LENGTH, 1, 0)),
        caf_chunk(b"kuki", &alac_config(ALAC_FRAME_LENGTH, 16, 1)),
        caf_chunk(b"pakt", &pakt),
        caf_chunk(b"data", &caf_data(&packets)),
    ])
}

pub fn mp4_box(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(tag);
    out.extend_from_slice(payload);
    out
}

pub fn ftyp() -> Vec<u8> {
    mp4_box(b"ftyp", b"M4A \0\0\0\0isomM4A ")
}

fn alac_moov(duration: u32, sizes: &[u32], first_offset: u32) -> Vec<u8> {
    let mut mdhd = vec![0u8; 4];
    mdhd.extend_from_slice(&0u32.to_be_bytes());
    mdhd.extend_from_slice(&0u32.to_be_bytes());
    mdhd.extend_from_slice(&44_100u32.to_be_bytes());
    mdhd.extend_from_slice(&duration.to_be_bytes());
    mdhd.extend_from_slice(&[0x55, 0xC4, 0, 0]);

    let mut alac = vec![0u8; 4];
    alac.extend_from_slice(&alac_config(ALAC_FRAME_LENGTH, 16, 1));
    let mut entry = vec![0u8; 6];
    entry.extend_from_slice(&1u16.to_be_bytes());
    entry.extend_from_slice(&[0u8; 8]);
    entry.extend_from_slice(&1u16.to_be_bytes());
    entry.extend_from_slice(&16u16.to_be_bytes());
    entry.extend_from_slice(&[0u8; 4]);
    entry.extend_from_slice(&(44_100u32 << 16).to_be_bytes());
    entry.extend_from_slice(&mp4_box(b"alac", &alac));
    let mut stsd = vec![0u8; 4];
    stsd.extend_from_slice(&1u32.to_be_bytes());
    stsd.extend_from_slice(&mp4_box(b"alac", &entry));

    let mut stsz = vec![0u8; 4];
    stsz.extend_from_slice(&0u32.to_be_bytes());
    stsz.extend_from_slice(&(sizes.len() as u32).to_be_bytes());
    for size in sizes {
        stsz.extend_from_slice(&size.to_be_bytes());
    }

    let mut stco = vec![0u8; 4];
    stco.extend_from_slice(&1u32.to_be_bytes());
    stco.extend_from_slice(&first_offset.to_be_bytes());

    let stbl = [
        mp4_box(b"stsd", &stsd),
        mp4_box(b"stsz", &stsz),
        mp4_box(b"stco", &stco),
    ]
    .concat();
    let minf = mp4_box(b"stbl", &stbl);
    let mdia = [mp4_box(b"mdhd", &mdhd), mp4_box(b"minf", &minf)].concat();
    let trak = mp4_box(b"mdia", &mdia);
    mp4_box(b"moov", &mp4_box(b"trak", &trak))
}

/// Mono 16-bit M4A/ALAC holding the two fixture packets.
pub fn m4a_alac(duration: u32) -> Vec<u8> {
    let packets = alac_packets();
    let sizes: Vec<u32> = packets.iter().map(|p| p.len() as u32).collect();
    let head = ftyp();
    let moov_len = alac_moov(duration, &sizes, 0).len();
    let mdat_payload = (head.len() + moov_len + 8) as u32;

    let mut out = head;
    out.extend_from_slice(&alac_moov(duration, &sizes, mdat_payload));
    out.extend_from_slice(&mp4_box(b"mdat", &packets.concat()));
    out
}

/// CRC-8 over FLAC frame headers (polynomial 0x07).
fn flac_crc8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |mut crc, &byte| {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ 0x07 } else { crc << 1 };
        }
        crc
    })
}

/// CRC-16 over whole FLAC frames (polynomial 0x8005).
fn flac_crc16(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0u16, |mut crc, &byte| {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x8005 } else { crc << 1 };
        }
        crc
    })
}

/// FLAC's UTF-8 style coded sample number.
fn flac_coded_number(value: u32) -> Vec<u8> {
    match value {
        0..=0x7F => vec![value as u8],
        0x80..=0x7FF => vec![0xC0 | (value >> 6) as u8, 0x80 | (value & 0x3F) as u8],
        0x800..=0xFFFF => vec![
            0xE0 | (value >> 12) as u8,
            0x80 | ((value >> 6) & 0x3F) as u8,
            0x80 | (value & 0x3F) as u8,
        ],
        _ => panic!("sample number {value} too large for the FLAC fixtures"),
    }
}

/// `fLaC` marker followed by a lone STREAMINFO block.
pub fn flac_header(
    sample_rate: u32,
    channels: u8,
    bits: u8,
    min_block: u16,
    max_block: u16,
    total_samples: u64,
) -> Vec<u8> {
    let mut info = BitWriter::default();
    info.push(u32::from(min_block), 16);
    info.push(u32::from(max_block), 16);
    info.push(0, 24); // min frame size unknown
    info.push(0, 24); // max frame size unknown
    info.push(sample_rate, 20);
    info.push(u32::from(channels - 1), 3);
    info.push(u32::from(bits - 1), 5);
    info.push((total_samples >> 32) as u32, 4);
    info.push(total_samples as u32, 32);
    let mut info = info.finish();
    info.extend_from_slice(&[0; 16]); // MD5 not computed

    let mut out = b"fLaC".to_vec();
    out.push(0x80); // last metadata block, type STREAMINFO
    out.extend_from_slice(&(info.len() as u32).to_be_bytes()[1..]);
    out.extend_from_slice(&info);
    out
}

/// One variable-blocking FLAC frame with a VERBATIM subframe per channel.
pub fn flac_frame(first_sample: u32, bits: u8, planes: &[Vec<i32>]) -> Vec<u8> {
    let block = planes[0].len();
    assert!((1..=256).contains(&block));
    let bits_code: u8 = match bits {
        8 => 0b001,
        16 => 0b100,
        20 => 0b101,
        24 => 0b110,
        other => panic!("no FLAC frame header code for {other} bits"),
    };

    let mut frame = vec![
        0xFF,
        0xF9, // sync, variable blocking
        0x60, // 8-bit block size at the end, rate from STREAMINFO
        ((planes.len() as u8 - 1) << 4) | (bits_code << 1),
    ];
    frame.extend_from_slice(&flac_coded_number(first_sample));
    frame.push((block - 1) as u8);
    frame.push(flac_crc8(&frame));

    let mut body = BitWriter::default();
    for plane in planes {
        assert_eq!(plane.len(), block);
        body.push(0b0000_0010, 8); // zero pad, VERBATIM, no wasted bits
        for &sample in plane {
            body.push(sample as u32, u32::from(bits));
        }
    }
    frame.extend_from_slice(&body.finish());
    let crc = flac_crc16(&frame);
    frame.extend_from_slice(&crc.to_be_bytes());
    frame
}

/// A whole FLAC file; each block holds one plane per channel.
pub fn flac_stream(sample_rate: u32, bits: u8, blocks: &[Vec<Vec<i32>>]) -> Vec<u8> {
    let lengths: Vec<usize> = blocks.iter().map(|planes| planes[0].len()).collect();
    let min_block = lengths.iter().copied().min().unwrap_or(16).max(16) as u16;
    let max_block = lengths.iter().copied().max().unwrap_or(16).max(16) as u16;
    let total: usize = lengths.iter().sum();

    let mut out = flac_header(
        sample_rate,
        blocks[0].len() as u8,
        bits,
        min_block,
        max_block,
        total as u64,
    );
    let mut first_sample = 0;
    for planes in blocks {
        out.extend_from_slice(&flac_frame(first_sample, bits, planes));
        first_sample += planes[0].len() as u32;
    }
    out
}

/// Ogg page CRC (polynomial 0x04C11DB7, no reflection).
fn ogg_crc(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |mut crc, &byte| {
        crc ^= u32::from(byte) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 { (crc << 1) ^ 0x04C1_1DB7 } else { crc << 1 };
        }
        crc
    })
}

pub const OGG_SERIAL: u32 = 0x1D0C_5EED;

/// One Ogg page holding whole `packets`.
pub fn ogg_page(header_type: u8, granule: i64, sequence: u32, packets: &[Vec<u8>]) -> Vec<u8> {
    let mut lacing = Vec::new();
    for packet in packets {
        let mut len = packet.len();
        while len >= 255 {
            lacing.push(255u8);
            len -= 255;
        }
        lacing.push(len as u8);
    }
    assert!(lacing.len() <= 255, "too many packets for one page");

    let mut page = b"OggS".to_vec();
    page.push(0);
    page.push(header_type);
    page.extend_from_slice(&granule.to_le_bytes());
    page.extend_from_slice(&OGG_SERIAL.to_le_bytes());
    page.extend_from_slice(&sequence.to_le_bytes());
    page.extend_from_slice(&[0; 4]);
    page.push(lacing.len() as u8);
    page.extend_from_slice(&lacing);
    for packet in packets {
        page.extend_from_slice(packet);
    }
    let crc = ogg_crc(&page);
    page[22..26].copy_from_slice(&crc.to_le_bytes());
    page
}

/// Header packets on their own pages, then every audio packet on a final
/// end-of-stream page.
pub fn ogg_stream(headers: &[Vec<u8>], audio: &[Vec<u8>], final_granule: i64) -> Vec<u8> {
    let mut out = Vec::new();
    let mut sequence = 0;
    for (index, header) in headers.iter().enumerate() {
        let header_type = if index == 0 { 0x02 } else { 0x00 };
        out.extend_from_slice(&ogg_page(header_type, 0, sequence, std::slice::from_ref(header)));
        sequence += 1;
    }
    out.extend_from_slice(&ogg_page(0x04, final_granule, sequence, audio));
    out
}

/// LSB-first bit packer used by Vorbis headers.
#[derive(Default)]
struct VorbisBits {
    out: Vec<u8>,
    used: u32,
}

impl VorbisBits {
    fn push(&mut self, value: u32, bits: u32) {
        for i in 0..bits {
            if self.used % 8 == 0 {
                self.out.push(0);
            }
            let bit = ((value >> i) & 1) as u8;
            if let Some(last) = self.out.last_mut() {
                *last |= bit << (self.used % 8);
            }
            self.used += 1;
        }
    }
}

pub fn vorbis_ident(channels: u8, sample_rate: u32) -> Vec<u8> {
    let mut out = b"\x01vorbis".to_vec();
    out.extend_from_slice(&0u32.to_le_bytes());
    out.push(channels);
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&128_000i32.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.push(0x86); // short blocks 64, long blocks 256
    out.push(1);
    out
}

pub fn vorbis_comment() -> Vec<u8> {
    let vendor = b"looper fixtures";
    let mut out = b"\x03vorbis".to_vec();
    out.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    out.extend_from_slice(vendor);
    out.extend_from_slice(&0u32.to_le_bytes());
    out.push(1);
    out
}

/// Smallest valid setup: one two-entry codebook, one floor 1, one residue 2,
/// one mapping and a single short-block mode.
pub fn vorbis_setup() -> Vec<u8> {
    let mut bits = VorbisBits::default();
    bits.push(0, 8); // one codebook
    bits.push(0x56_4342, 24);
    bits.push(1, 16); // dimensions
    bits.push(2, 24); // entries
    bits.push(0, 1); // not ordered
    bits.push(0, 1); // not sparse
    bits.push(0, 5); // both codewords one bit long
    bits.push(0, 5);
    bits.push(0, 4); // no lookup table

    bits.push(0, 6); // one time-domain placeholder
    bits.push(0, 16);

    bits.push(0, 6); // one floor
    bits.push(1, 16); // floor type 1
    bits.push(0, 5); // no partitions
    bits.push(0, 2); // multiplier 1
    bits.push(5, 4); // range bits

    bits.push(0, 6); // one residue
    bits.push(2, 16); // residue type 2
    bits.push(0, 24); // begin
    bits.push(0, 24); // end
    bits.push(0, 24); // partition size 1
    bits.push(0, 6); // one classification
    bits.push(0, 8); // classbook
    bits.push(0, 3); // empty cascade
    bits.push(0, 1);

    bits.push(0, 6); // one mapping
    bits.push(0, 16); // mapping type 0
    bits.push(0, 1); // one submap
    bits.push(0, 1); // no coupling
    bits.push(0, 2); // reserved
    bits.push(0, 8); // submap time (unused)
    bits.push(0, 8); // submap floor
    bits.push(0, 8); // submap residue

    bits.push(0, 6); // one mode
    bits.push(0, 1); // short blocks
    bits.push(0, 16); // window type
    bits.push(0, 16); // transform type
    bits.push(0, 8); // mapping

    bits.push(1, 1); // framing

    let mut out = b"\x05vorbis".to_vec();
    out.extend_from_slice(&bits.out);
    out
}

/// Ogg Vorbis whose `audio_packets` short blocks carry no energy on any
/// channel. Each packet after the first yields 32 silent frames.
pub fn ogg_vorbis(channels: u8, sample_rate: u32, audio_packets: usize) -> Vec<u8> {
    let headers = [vorbis_ident(channels, sample_rate), vorbis_comment(), vorbis_setup()];
    // Audio packet type bit, then an unused-floor bit per channel.
    let audio = vec![vec![0u8]; audio_packets];
    let granule = (audio_packets.saturating_sub(1) * 32) as i64;
    ogg_stream(&headers, &audio, granule)
}

pub fn opus_head(channels: u8, pre_skip: u16) -> Vec<u8> {
    let mut out = b"OpusHead".to_vec();
    out.push(1);
    out.push(channels);
    out.extend_from_slice(&pre_skip.to_le_bytes());
    out.extend_from_slice(&48_000u32.to_le_bytes());
    out.extend_from_slice(&0i16.to_le_bytes());
    out.push(0);
    out
}

pub fn opus_tags() -> Vec<u8> {
    let vendor = b"looper fixtures";
    let mut out = b"OpusTags".to_vec();
    out.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    out.extend_from_slice(vendor);
    out.extend_from_slice(&0u32.to_le_bytes());
    out
}

/// Samples per channel in each encoded Opus packet (20 ms).
pub const OPUS_PACKET_FRAMES: usize = 960;

/// `count` packets of a mono 440 Hz tone encoded with libopus.
pub fn opus_tone_packets(count: usize) -> Result<Vec<Vec<u8>>, opus::Error> {
    let mut encoder = opus::Encoder::new(48_000, opus::Channels::Mono, opus::Application::Audio)?;
    let mut packets = Vec::with_capacity(count);
    let mut buffer = vec![0u8; 4000];
    for index in 0..count {
        let pcm: Vec<i16> = (0..OPUS_PACKET_FRAMES)
            .map(|i| {
                let t = (index * OPUS_PACKET_FRAMES + i) as f32 / 48_000.0;
                ((t * 440.0 * std::f32::consts::TAU).sin() * 8_000.0) as i16
            })
            .collect();
        let len = encoder.encode(&pcm, &mut buffer)?;
        packets.push(buffer[..len].to_vec());
    }
    Ok(packets)
}

pub fn ogg_opus(pre_skip: u16, packets: &[Vec<u8>]) -> Vec<u8> {
    let granule = (packets.len() * OPUS_PACKET_FRAMES) as i64;
    ogg_stream(&[opus_head(1, pre_skip), opus_tags()], packets, granule)
}

/// Bytes in one 128 kbps, 48 kHz MPEG-1 Layer III frame without padding.
pub const MP3_FRAME_BYTES: usize = 384;

/// Samples per channel decoded from one MPEG-1 Layer III frame.
pub const MP3_FRAME_SAMPLES: usize = 1152;

/// A silent MPEG-1 Layer III frame: zeroed side info and main data.
pub fn mp3_frame(stereo: bool) -> Vec<u8> {
    let mut frame = vec![0u8; MP3_FRAME_BYTES];
    frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x94, if stereo { 0x00 } else { 0xC0 }]);
    frame
}

/// Concatenates frames; `true` entries are stereo.
pub fn mp3_stream(layout: &[bool]) -> Vec<u8> {
    layout.iter().flat_map(|&stereo| mp3_frame(stereo)).collect()
}

/// ID3v2.4 tag with a zeroed body of `body_len` bytes.
pub fn id3_tag(body_len: u32) -> Vec<u8> {
    assert!(body_len < 1 << 21);
    let mut out = b"ID3\x04\x00\x00".to_vec();
    out.extend_from_slice(&[
        ((body_len >> 21) & 0x7F) as u8,
        ((body_len >> 14) & 0x7F) as u8,
        ((body_len >> 7) & 0x7F) as u8,
        (body_len & 0x7F) as u8,
    ]);
    out.resize(10 + body_len as usize, 0);
    out
}
