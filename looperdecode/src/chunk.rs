//! # Chunk and box walker
//!
//! Every container handled by this crate is a sequence of tagged,
//! length-prefixed records: CAF chunks, MP4 boxes, RIFF chunks and IFF (AIFF)
//! chunks. They only differ in the width and byte order of the size field and
//! in the padding rule, which [`ChunkLayout`] captures.
//!
//! [`find_chunk`] scans depth-first along a path of tags and returns the
//! absolute payload position of the last element:
//!
//! ```no_run
//! use looperdecode::chunk::{find_chunk, ChunkLayout};
//! use looperdecode::endian::fourcc;
//!
//! # fn main() -> Result<(), looperdecode::DecodeError> {
//! let mut file = std::fs::File::open("track.m4a")?;
//! let mdhd = find_chunk(
//!     &mut file,
//!     ChunkLayout::Mp4,
//!     &[fourcc(b"moov"), fourcc(b"trak"), fourcc(b"mdia"), fourcc(b"mdhd")],
//! )?;
//! println!("mdhd payload at {} ({} bytes)", mdhd.byte_offset, mdhd.payload_size);
//! # Ok(())
//! # }
//! ```

use std::io::{Read, Seek, SeekFrom};

use crate::{
    endian::{fourcc, fourcc_str},
    error::DecodeError,
};

/// Upper bound for chunk payloads that parsers load into memory whole.
pub const MAX_IN_MEMORY_PAYLOAD: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkLayout {
    /// `{tag: u32 BE, size: i64 BE}` after an 8-byte `caff` header.
    Caf,
    /// `{size: u32 BE, tag: u32}` with the 0 / 1 size escapes, no file header.
    Mp4,
    /// `{tag, size: u32 LE}`, even padding, after `RIFF size WAVE`.
    Riff,
    /// `{tag, size: u32 BE}`, even padding, after `FORM size AIFF`.
    Iff,
}

impl ChunkLayout {
    /// Bytes of fixed file header preceding the first chunk.
    pub const fn file_header_len(self) -> u64 {
        match self {
            ChunkLayout::Caf => 8,
            ChunkLayout::Mp4 => 0,
            ChunkLayout::Riff | ChunkLayout::Iff => 12,
        }
    }

    const fn header_len(self) -> u64 {
        match self {
            ChunkLayout::Caf => 12,
            ChunkLayout::Mp4 | ChunkLayout::Riff | ChunkLayout::Iff => 8,
        }
    }

    const fn padded(self) -> bool {
        matches!(self, ChunkLayout::Riff | ChunkLayout::Iff)
    }
}

/// Location of one chunk's payload inside the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRef {
    pub tag: u32,
    /// Absolute offset of the first payload byte.
    pub byte_offset: u64,
    pub payload_size: u64,
}

impl ChunkRef {
    pub fn end(&self) -> u64 {
        self.byte_offset + self.payload_size
    }

    pub fn tag_str(&self) -> String {
        fourcc_str(self.tag)
    }
}

/// Finds `path` starting right after the layout's file header.
pub fn find_chunk<R: Read + Seek>(
    reader: &mut R,
    layout: ChunkLayout,
    path: &[u32],
) -> Result<ChunkRef, DecodeError> {
    let file_len = reader.seek(SeekFrom::End(0))?;
    find_chunk_in(reader, layout, layout.file_header_len(), file_len, path)
}

/// Finds `path` among the chunks stored in `[start, end)`.
pub fn find_chunk_in<R: Read + Seek>(
    reader: &mut R,
    layout: ChunkLayout,
    start: u64,
    end: u64,
    path: &[u32],
) -> Result<ChunkRef, DecodeError> {
    if path.is_empty() {
        return Err(DecodeError::malformed("empty chunk path"));
    }

    let mut depth = 0;
    let mut offset = start;
    let mut limit = end;

    loop {
        let Some(chunk) = read_header(reader, layout, offset, limit)? else {
            return Err(DecodeError::ChunkNotFound {
                path: render_path(path),
            });
        };

        if chunk.tag == path[depth] {
            if depth + 1 == path.len() {
                tracing::trace!(
                    path = %render_path(path),
                    offset = chunk.byte_offset,
                    size = chunk.payload_size,
                    "chunk located"
                );
                return Ok(chunk);
            }
            depth += 1;
            offset = chunk.byte_offset;
            limit = chunk.end();
            continue;
        }

        offset = next_offset(layout, &chunk);
    }
}

/// Lists the direct children stored in `[start, end)`.
pub fn list_chunks<R: Read + Seek>(
    reader: &mut R,
    layout: ChunkLayout,
    start: u64,
    end: u64,
) -> Result<Vec<ChunkRef>, DecodeError> {
    let mut chunks = Vec::new();
    let mut offset = start;
    while let Some(chunk) = read_header(reader, layout, offset, end)? {
        offset = next_offset(layout, &chunk);
        chunks.push(chunk);
    }
    Ok(chunks)
}

/// Reads the fixed header at the start of a file into `header`.
///
/// A file too short to hold it is a malformed container, not an I/O failure.
pub fn read_file_header<R: Read + Seek>(
    reader: &mut R,
    header: &mut [u8],
    container: &str,
) -> Result<(), DecodeError> {
    reader.seek(SeekFrom::Start(0))?;
    match reader.read_exact(header) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => Err(DecodeError::malformed(
            format!("file too short for a {container} header ({} bytes needed)", header.len()),
        )),
        Err(err) => Err(err.into()),
    }
}

/// Reads a whole chunk payload into memory.
pub fn read_payload<R: Read + Seek>(reader: &mut R, chunk: &ChunkRef) -> Result<Vec<u8>, DecodeError> {
    if chunk.payload_size > MAX_IN_MEMORY_PAYLOAD {
        return Err(DecodeError::malformed(format!(
            "'{}' chunk of {} bytes is too large to load",
            chunk.tag_str(),
            chunk.payload_size
        )));
    }
    reader.seek(SeekFrom::Start(chunk.byte_offset))?;
    let mut payload = vec![0u8; chunk.payload_size as usize];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

fn next_offset(layout: ChunkLayout, chunk: &ChunkRef) -> u64 {
    let pad = if layout.padded() { chunk.payload_size & 1 } else { 0 };
    chunk.end() + pad
}

fn read_header<R: Read + Seek>(
    reader: &mut R,
    layout: ChunkLayout,
    offset: u64,
    limit: u64,
) -> Result<Option<ChunkRef>, DecodeError> {
    if offset >= limit || limit - offset < layout.header_len() {
        return Ok(None);
    }

    reader.seek(SeekFrom::Start(offset))?;
    let mut header = [0u8; 12];
    let header_len = layout.header_len() as usize;
    reader.read_exact(&mut header[..header_len])?;

    let (tag, payload_start, payload_size) = match layout {
        ChunkLayout::Caf => {
            let tag = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
            let size = i64::from_be_bytes([
                header[4], header[5], header[6], header[7], header[8], header[9], header[10],
                header[11],
            ]);
            let payload_start = offset + 12;
            let payload_size = match size {
                -1 if tag == fourcc(b"data") => limit - payload_start,
                size if size < 0 => {
                    return Err(DecodeError::malformed(format!(
                        "negative size {size} on '{}' chunk",
                        fourcc_str(tag)
                    )));
                }
                size => size as u64,
            };
            (tag, payload_start, payload_size)
        }
        ChunkLayout::Mp4 => {
            let size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
            let tag = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
            match size {
                0 => (tag, offset + 8, limit - (offset + 8)),
                1 => {
                    if limit - offset < 16 {
                        return Err(DecodeError::malformed(format!(
                            "'{}' box truncated before its 64-bit size",
                            fourcc_str(tag)
                        )));
                    }
                    let mut large = [0u8; 8];
                    reader.read_exact(&mut large)?;
                    let large = u64::from_be_bytes(large);
                    if large < 16 {
                        return Err(DecodeError::malformed(format!(
                            "'{}' box has 64-bit size {large} smaller than its header",
                            fourcc_str(tag)
                        )));
                    }
                    (tag, offset + 16, large - 16)
                }
                size if size < 8 => {
                    return Err(DecodeError::malformed(format!(
                        "'{}' box has size {size} smaller than its header",
                        fourcc_str(tag)
                    )));
                }
                size => (tag, offset + 8, u64::from(size) - 8),
            }
        }
        ChunkLayout::Riff => {
            let tag = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
            let size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
            (tag, offset + 8, u64::from(size))
        }
        ChunkLayout::Iff => {
            let tag = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
            let size = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
            (tag, offset + 8, u64::from(size))
        }
    };

    let end = payload_start
        .checked_add(payload_size)
        .ok_or_else(|| DecodeError::malformed("chunk size overflows the file offset range"))?;
    if end > limit {
        // Recorders that never patch the size leave the audio chunk
        // overrunning the file; the PCM reader stops at the real end.
        if layout.padded() && (tag == fourcc(b"data") || tag == fourcc(b"SSND")) {
            tracing::warn!(
                tag = %fourcc_str(tag),
                declared = payload_size,
                available = limit - payload_start,
                "audio chunk runs past the end of the file"
            );
            return Ok(Some(ChunkRef {
                tag,
                byte_offset: payload_start,
                payload_size,
            }));
        }
        return Err(DecodeError::malformed(format!(
            "'{}' chunk at {offset} claims {payload_size} bytes but only {} remain",
            fourcc_str(tag),
            limit - payload_start
        )));
    }

    Ok(Some(ChunkRef {
        tag,
        byte_offset: payload_start,
        payload_size,
    }))
}

fn render_path(path: &[u32]) -> String {
    path.iter()
        .map(|&tag| fourcc_str(tag))
        .collect::<Vec<_>>()
        .join("/")
}
