use std::io;

/// Coarse classification of a [`DecodeError`], used by callers that only need
/// to decide how to report a failed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedContainer,
    UnsupportedFormat,
    CorruptStream,
    Io,
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed container: {0}")]
    MalformedContainer(String),
    #[error("chunk not found: {path}")]
    ChunkNotFound { path: String },
    #[error("variable-length integer not terminated within 5 bytes")]
    MalformedVarInt,
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("corrupt stream: {0}")]
    CorruptStream(String),
    #[error("audio sink error: {0}")]
    Sink(String),
    #[error("{role} task failed: {details}")]
    TaskJoin { role: &'static str, details: String },
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::MalformedContainer(_) | DecodeError::ChunkNotFound { .. } => {
                ErrorKind::MalformedContainer
            }
            DecodeError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            DecodeError::MalformedVarInt | DecodeError::CorruptStream(_) => {
                ErrorKind::CorruptStream
            }
            DecodeError::Io(_) | DecodeError::Sink(_) | DecodeError::TaskJoin { .. } => {
                ErrorKind::Io
            }
        }
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        DecodeError::MalformedContainer(msg.into())
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        DecodeError::UnsupportedFormat(msg.into())
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        DecodeError::CorruptStream(msg.into())
    }
}

impl From<claxon::Error> for DecodeError {
    fn from(err: claxon::Error) -> Self {
        match err {
            claxon::Error::IoError(io) => DecodeError::Io(io),
            claxon::Error::FormatError(msg) => DecodeError::CorruptStream(msg.to_string()),
            claxon::Error::Unsupported(msg) => DecodeError::UnsupportedFormat(msg.to_string()),
        }
    }
}

impl From<symphonia::core::errors::Error> for DecodeError {
    fn from(err: symphonia::core::errors::Error) -> Self {
        use symphonia::core::errors::Error as SymphoniaError;
        match err {
            SymphoniaError::IoError(io) => DecodeError::Io(io),
            SymphoniaError::Unsupported(msg) => DecodeError::UnsupportedFormat(msg.to_string()),
            other => DecodeError::CorruptStream(other.to_string()),
        }
    }
}

impl From<lewton::header::HeaderReadError> for DecodeError {
    fn from(err: lewton::header::HeaderReadError) -> Self {
        DecodeError::CorruptStream(format!("Vorbis header: {err}"))
    }
}

impl From<lewton::audio::AudioReadError> for DecodeError {
    fn from(err: lewton::audio::AudioReadError) -> Self {
        DecodeError::CorruptStream(format!("Vorbis packet: {err}"))
    }
}

impl From<opus::Error> for DecodeError {
    fn from(err: opus::Error) -> Self {
        DecodeError::CorruptStream(format!("Opus: {err}"))
    }
}
