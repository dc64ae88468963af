use std::fmt;

/// Part of the stream an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Header,
    Metadata,
    Payload,
    Transport,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Header => "header",
            Stage::Metadata => "metadata",
            Stage::Payload => "payload",
            Stage::Transport => "transport",
        })
    }
}

/// Errors raised while encoding or decoding an image stream.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The array cannot be streamed. Raised before any byte is written.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The header text does not follow the protocol.
    #[error("protocol error at header token {position} ({token:?}): {reason}")]
    Protocol {
        position: usize,
        token: String,
        reason: String,
    },

    /// The metadata block is malformed or truncated.
    #[error("metadata error at byte {offset}: {reason}")]
    Metadata { offset: usize, reason: String },

    /// The stream ended before the expected number of bytes.
    #[error("{stage} ended after {offset} bytes, expected {expected}")]
    ShortStream {
        stage: Stage,
        offset: u64,
        expected: u64,
    },

    /// Fewer or more bytes were produced than predicted.
    #[error("{stage} size calculation mismatch: predicted {expected} bytes, wrote {actual}")]
    LengthMismatch {
        stage: Stage,
        expected: u64,
        actual: u64,
    },

    /// The underlying stream failed.
    #[error("{stage} I/O error at byte {offset}: {source}")]
    Io {
        stage: Stage,
        offset: u64,
        source: std::io::Error,
    },
}

impl CodecError {
    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        CodecError::Validation(reason.into())
    }

    pub(crate) fn protocol(position: usize, token: &str, reason: impl Into<String>) -> Self {
        CodecError::Protocol {
            position,
            token: token.to_string(),
            reason: reason.into(),
        }
    }

    /// Classify a failed read or write of `stage` at stream byte `offset`.
    pub(crate) fn from_io(stage: Stage, offset: u64, expected: u64, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            CodecError::ShortStream {
                stage,
                offset,
                expected,
            }
        } else {
            CodecError::Io {
                stage,
                offset,
                source: err,
            }
        }
    }

    /// Stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            CodecError::Validation(_) | CodecError::Protocol { .. } => Stage::Header,
            CodecError::Metadata { .. } => Stage::Metadata,
            CodecError::ShortStream { stage, .. }
            | CodecError::LengthMismatch { stage, .. }
            | CodecError::Io { stage, .. } => *stage,
        }
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
