//! Picks the container of a file from its first bytes, falling back to the
//! file extension for streams without a usable signature.

use std::{
    fmt,
    fs::File,
    io::Read,
    path::Path,
};

use tracing::debug;

use crate::{adts, error::DecodeError};

/// Bytes read from the start of a file for sniffing.
pub const SNIFF_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFormat {
    Flac,
    /// CAF holding ALAC or linear PCM.
    Caf,
    /// MPEG-4 holding ALAC or AAC.
    Mp4,
    Adts,
    Mp3,
    OggVorbis,
    OggOpus,
    Wav,
    Aiff,
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContainerFormat::Flac => "FLAC",
            ContainerFormat::Caf => "CAF",
            ContainerFormat::Mp4 => "MPEG-4",
            ContainerFormat::Adts => "AAC/ADTS",
            ContainerFormat::Mp3 => "MP3",
            ContainerFormat::OggVorbis => "Ogg/Vorbis",
            ContainerFormat::OggOpus => "Ogg/Opus",
            ContainerFormat::Wav => "WAV",
            ContainerFormat::Aiff => "AIFF",
        };
        f.write_str(name)
    }
}

/// Extensions the player accepts, lower case, without the dot.
pub const EXTENSIONS: &[(&str, ContainerFormat)] = &[
    ("opus", ContainerFormat::OggOpus),
    ("mp3", ContainerFormat::Mp3),
    ("ogg", ContainerFormat::OggVorbis),
    ("oga", ContainerFormat::OggVorbis),
    ("flac", ContainerFormat::Flac),
    ("wav", ContainerFormat::Wav),
    ("aif", ContainerFormat::Aiff),
    ("aiff", ContainerFormat::Aiff),
    ("aifc", ContainerFormat::Aiff),
    ("caf", ContainerFormat::Caf),
    ("caff", ContainerFormat::Caf),
    ("alac", ContainerFormat::Caf),
    ("m4a", ContainerFormat::Mp4),
    ("mp4", ContainerFormat::Mp4),
    ("aac", ContainerFormat::Adts),
];

pub fn from_extension(path: &Path) -> Option<ContainerFormat> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, format)| *format)
}

/// Identifies a container from its leading bytes.
pub fn from_magic(bytes: &[u8]) -> Option<ContainerFormat> {
    if bytes.starts_with(b"fLaC") {
        return Some(ContainerFormat::Flac);
    }
    if bytes.starts_with(b"caff") {
        return Some(ContainerFormat::Caf);
    }
    if bytes.len() >= 8 && &bytes[4..8] == b"ftyp" {
        return Some(ContainerFormat::Mp4);
    }
    if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WAVE" {
        return Some(ContainerFormat::Wav);
    }
    if bytes.len() >= 12
        && bytes.starts_with(b"FORM")
        && (&bytes[8..12] == b"AIFF" || &bytes[8..12] == b"AIFC")
    {
        return Some(ContainerFormat::Aiff);
    }
    if let Some(format) = ogg_codec(bytes) {
        return Some(format);
    }
    mpeg_sync(bytes)
}

/// Looks at the first packet of an Ogg stream.
fn ogg_codec(bytes: &[u8]) -> Option<ContainerFormat> {
    if bytes.len() < 27 || !bytes.starts_with(b"OggS") {
        return None;
    }
    let segments = usize::from(bytes[26]);
    let body = bytes.get(27 + segments..)?;
    if body.starts_with(b"OpusHead") {
        Some(ContainerFormat::OggOpus)
    } else if body.starts_with(b"\x01vorbis") {
        Some(ContainerFormat::OggVorbis)
    } else {
        None
    }
}

/// Tells ADTS (layer bits `00`) from MPEG audio frames.
fn mpeg_sync(bytes: &[u8]) -> Option<ContainerFormat> {
    if let Some(tag_len) = adts::id3v2_len(bytes) {
        return usize::try_from(tag_len)
            .ok()
            .and_then(|len| bytes.get(len..))
            .and_then(mpeg_sync);
    }
    match bytes {
        [0xFF, second, ..] if second & 0xF6 == 0xF0 => Some(ContainerFormat::Adts),
        [0xFF, second, ..] if second & 0xE0 == 0xE0 && second & 0x06 != 0 => {
            Some(ContainerFormat::Mp3)
        }
        _ => None,
    }
}

/// Magic bytes first, then the extension.
pub fn detect(prefix: &[u8], path: &Path) -> Result<ContainerFormat, DecodeError> {
    if let Some(format) = from_magic(prefix) {
        return Ok(format);
    }
    if let Some(format) = from_extension(path) {
        debug!(path = %path.display(), %format, "format chosen from extension");
        return Ok(format);
    }
    Err(DecodeError::unsupported(format!(
        "unrecognized audio file {}",
        path.display()
    )))
}

pub fn detect_file(path: &Path) -> Result<ContainerFormat, DecodeError> {
    let mut prefix = Vec::with_capacity(SNIFF_LEN);
    File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut prefix)?;
    detect(&prefix, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_bytes() {
        assert_eq!(from_magic(b"fLaC\0\0\0\x22"), Some(ContainerFormat::Flac));
        assert_eq!(from_magic(b"caff\0\x01\0\0"), Some(ContainerFormat::Caf));
        assert_eq!(from_magic(b"\0\0\0\x20ftypM4A "), Some(ContainerFormat::Mp4));
        assert_eq!(from_magic(b"RIFF\0\0\0\0WAVE"), Some(ContainerFormat::Wav));
        assert_eq!(from_magic(b"FORM\0\0\0\0AIFC"), Some(ContainerFormat::Aiff));
        assert_eq!(from_magic(&[0xFF, 0xF1, 0x50, 0x80]), Some(ContainerFormat::Adts));
        assert_eq!(from_magic(&[0xFF, 0xFB, 0x90, 0x64]), Some(ContainerFormat::Mp3));
        assert_eq!(from_magic(b"hello"), None);
    }

    #[test]
    fn ogg_codecs() {
        let mut page = b"OggS".to_vec();
        page.extend_from_slice(&[0; 22]);
        page.push(1);
        page.push(19);
        let mut opus = page.clone();
        opus.extend_from_slice(b"OpusHead");
        let mut vorbis = page;
        vorbis.extend_from_slice(b"\x01vorbis");
        assert_eq!(from_magic(&opus), Some(ContainerFormat::OggOpus));
        assert_eq!(from_magic(&vorbis), Some(ContainerFormat::OggVorbis));
    }

    #[test]
    fn id3_tag_is_skipped() {
        let mut bytes = vec![b'I', b'D', b'3', 4, 0, 0, 0, 0, 0, 2, 0, 0];
        bytes.extend_from_slice(&[0xFF, 0xF1, 0x50]);
        assert_eq!(from_magic(&bytes), Some(ContainerFormat::Adts));
        // A tag longer than the sniffed prefix leaves the extension to decide.
        let long_tag = [b'I', b'D', b'3', 4, 0, 0, 0, 0, 0x10, 0];
        assert_eq!(from_magic(&long_tag), None);
        assert_eq!(
            detect(&long_tag, Path::new("track.AAC")).unwrap(),
            ContainerFormat::Adts
        );
    }

    #[test]
    fn magic_wins_over_extension() {
        assert_eq!(
            detect(b"fLaC", Path::new("mislabelled.mp3")).unwrap(),
            ContainerFormat::Flac
        );
        assert!(matches!(
            detect(b"????", Path::new("notes.txt")),
            Err(DecodeError::UnsupportedFormat(_))
        ));
    }
}
