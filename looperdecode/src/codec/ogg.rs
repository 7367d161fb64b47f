//! Ogg page parsing shared by the Vorbis and Opus adapters.
//!
//! Pages are read sequentially: optional search for the `OggS` capture
//! pattern, 27-byte header, CRC check, segment table, then packet assembly
//! across page boundaries. Only a single logical bitstream is accepted.

use std::{collections::VecDeque, io::Read};

use crate::error::DecodeError;

/// Garbage tolerated before the first page when sync search is on.
const MAX_SYNC_SEARCH: usize = 64 * 1024;

const HEADER_LEN: usize = 27;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OggReaderOptions {
    pub validate_crc: bool,
    pub find_sync: bool,
}

impl Default for OggReaderOptions {
    fn default() -> Self {
        Self {
            validate_crc: true,
            find_sync: true,
        }
    }
}

pub struct OggPacketReader<R> {
    reader: R,
    options: OggReaderOptions,
    current_packet: Vec<u8>,
    queue: VecDeque<Vec<u8>>,
    /// Bytes read while searching for sync, replayed before the reader.
    pushback: Vec<u8>,
    synced: bool,
    finished: bool,
    serial: Option<u32>,
    page_data: Vec<u8>,
}

impl<R: Read> OggPacketReader<R> {
    pub fn new(reader: R, options: OggReaderOptions) -> Self {
        Self {
            reader,
            options,
            current_packet: Vec::new(),
            queue: VecDeque::new(),
            pushback: Vec::new(),
            synced: !options.find_sync,
            finished: false,
            serial: None,
            page_data: Vec::new(),
        }
    }

    /// Next complete packet, or `None` once the last page has been read.
    pub fn next_packet(&mut self) -> Result<Option<Vec<u8>>, DecodeError> {
        loop {
            if let Some(packet) = self.queue.pop_front() {
                return Ok(Some(packet));
            }
            if self.finished {
                return Ok(None);
            }
            self.read_page()?;
        }
    }

    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize, DecodeError> {
        if !self.pushback.is_empty() {
            let n = buf.len().min(self.pushback.len());
            buf[..n].copy_from_slice(&self.pushback[..n]);
            self.pushback.drain(..n);
            return Ok(n);
        }
        loop {
            match self.reader.read(buf) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Fills `buf` completely; `false` on a clean end of stream before any byte.
    fn fill(&mut self, buf: &mut [u8]) -> Result<bool, DecodeError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read_some(&mut buf[filled..])? {
                0 if filled == 0 => return Ok(false),
                0 => return Err(DecodeError::corrupt("Ogg page truncated")),
                n => filled += n,
            }
        }
        Ok(true)
    }

    fn find_sync(&mut self) -> Result<(), DecodeError> {
        let mut window = Vec::new();
        let mut chunk = [0u8; 1024];
        while window.len() < MAX_SYNC_SEARCH {
            let n = self.read_some(&mut chunk)?;
            if n == 0 {
                return Err(DecodeError::corrupt("no Ogg capture pattern before end of stream"));
            }
            window.extend_from_slice(&chunk[..n]);
            if let Some(pos) = window.windows(4).position(|w| w == b"OggS") {
                window.drain(..pos);
                self.pushback = window;
                self.synced = true;
                return Ok(());
            }
        }
        Err(DecodeError::corrupt(format!(
            "no Ogg capture pattern in the first {MAX_SYNC_SEARCH} bytes"
        )))
    }

    fn read_page(&mut self) -> Result<(), DecodeError> {
        if !self.synced {
            self.find_sync()?;
        }

        let mut header = [0u8; HEADER_LEN];
        if !self.fill(&mut header)? {
            if !self.current_packet.is_empty() {
                return Err(DecodeError::corrupt("stream ended inside an Ogg packet"));
            }
            self.finished = true;
            return Ok(());
        }
        if &header[0..4] != b"OggS" {
            return Err(DecodeError::corrupt("invalid Ogg capture pattern"));
        }
        if header[4] != 0 {
            return Err(DecodeError::unsupported(format!("Ogg version {}", header[4])));
        }

        let header_type = header[5];
        let serial = u32::from_le_bytes([header[14], header[15], header[16], header[17]]);
        match self.serial {
            Some(expected) if expected != serial => {
                return Err(DecodeError::unsupported("multiplexed Ogg streams"));
            }
            Some(_) => {}
            None => self.serial = Some(serial),
        }

        let mut segments = vec![0u8; usize::from(header[26])];
        if !self.fill(&mut segments)? && !segments.is_empty() {
            return Err(DecodeError::corrupt("Ogg segment table truncated"));
        }
        let data_len: usize = segments.iter().map(|&len| usize::from(len)).sum();
        let mut data = std::mem::take(&mut self.page_data);
        data.resize(data_len, 0);
        if !self.fill(&mut data)? && data_len > 0 {
            return Err(DecodeError::corrupt("Ogg page data truncated"));
        }

        if self.options.validate_crc {
            let expected = u32::from_le_bytes([header[22], header[23], header[24], header[25]]);
            let mut zeroed = header;
            zeroed[22..26].fill(0);
            let mut crc = crc::update(0, &zeroed);
            crc = crc::update(crc, &segments);
            crc = crc::update(crc, &data);
            if crc != expected {
                return Err(DecodeError::corrupt(format!(
                    "Ogg CRC mismatch: expected 0x{expected:08x}, got 0x{crc:08x}"
                )));
            }
        }

        let continued = header_type & 0x01 != 0;
        if continued && self.current_packet.is_empty() {
            return Err(DecodeError::corrupt("Ogg continuation page without a packet"));
        }
        if !continued && !self.current_packet.is_empty() {
            return Err(DecodeError::corrupt("Ogg packet left unfinished"));
        }

        let mut offset = 0;
        for &len in &segments {
            let end = offset + usize::from(len);
            self.current_packet.extend_from_slice(&data[offset..end]);
            offset = end;
            if len < 255 {
                self.queue.push_back(std::mem::take(&mut self.current_packet));
            }
        }
        self.page_data = data;

        if header_type & 0x04 != 0 && self.current_packet.is_empty() {
            self.finished = true;
        }
        Ok(())
    }
}

/// Ogg CRC-32: polynomial 0x04c11db7, initial value 0, no final XOR.
pub(crate) mod crc {
    const fn entry(index: u32) -> u32 {
        let mut r = index << 24;
        let mut i = 0;
        while i < 8 {
            r = (r << 1) ^ (((r >> 31) & 1).wrapping_neg() & 0x04c1_1db7);
            i += 1;
        }
        r
    }

    const fn table() -> [u32; 256] {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            table[i] = entry(i as u32);
            i += 1;
        }
        table
    }

    static TABLE: [u32; 256] = table();

    pub fn update(mut crc: u32, bytes: &[u8]) -> u32 {
        for &byte in bytes {
            crc = (crc << 8) ^ TABLE[((crc >> 24) ^ u32::from(byte)) as usize];
        }
        crc
    }
}

/// Builds one page holding whole packets; used by tests to fabricate streams.
#[cfg(test)]
pub(crate) fn page(serial: u32, sequence: u32, header_type: u8, packets: &[&[u8]]) -> Vec<u8> {
    let mut segments = Vec::new();
    let mut body = Vec::new();
    for packet in packets {
        let mut remaining = packet.len();
        while remaining >= 255 {
            segments.push(255u8);
            remaining -= 255;
        }
        segments.push(remaining as u8);
        body.extend_from_slice(packet);
    }

    let mut out = Vec::new();
    out.extend_from_slice(b"OggS");
    out.push(0);
    out.push(header_type);
    out.extend_from_slice(&0u64.to_le_bytes());
    out.extend_from_slice(&serial.to_le_bytes());
    out.extend_from_slice(&sequence.to_le_bytes());
    out.extend_from_slice(&[0; 4]);
    out.push(segments.len() as u8);
    out.extend_from_slice(&segments);
    out.extend_from_slice(&body);

    let crc = crc::update(0, &out);
    out[22..26].copy_from_slice(&crc.to_le_bytes());
    out
}
