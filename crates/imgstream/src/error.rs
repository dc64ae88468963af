use std::time::Duration;

use imgstream_codec::{CodecError, Stage};
use imgstream_transport::TransportError;

/// Errors surfaced by a whole transfer.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The stream itself is invalid or incomplete.
    #[error(transparent)]
    Codec(CodecError),

    /// The transport failed while handling the given stage.
    #[error("transport failure during {stage}: {source}")]
    Transport {
        stage: Stage,
        #[source]
        source: TransportError,
    },

    /// No peer became ready within the wait bound.
    #[error("timed out during {stage} after {waited:?}")]
    Timeout { stage: Stage, waited: Duration },
}

impl StreamError {
    /// Classify a transport failure raised while handling `stage`.
    pub fn transport(stage: Stage, err: TransportError) -> Self {
        match err {
            TransportError::Timeout { waited } => StreamError::Timeout { stage, waited },
            source => StreamError::Transport { stage, source },
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            StreamError::Codec(err) => err.stage(),
            StreamError::Transport { stage, .. } | StreamError::Timeout { stage, .. } => *stage,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StreamError::Timeout { .. })
    }
}

impl From<CodecError> for StreamError {
    /// Recovers transport failures that reached the codec through the
    /// `std::io` adaptors of the session.
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io {
                stage,
                offset,
                source,
            } => {
                let carries_transport = source
                    .get_ref()
                    .is_some_and(|inner| inner.is::<TransportError>());
                if !carries_transport {
                    return StreamError::Codec(CodecError::Io {
                        stage,
                        offset,
                        source,
                    });
                }
                match source.into_inner().map(|inner| inner.downcast::<TransportError>()) {
                    Some(Ok(transport)) => StreamError::transport(stage, *transport),
                    _ => StreamError::Transport {
                        stage,
                        source: TransportError::Disconnected(format!(
                            "unreadable failure at byte {offset}"
                        )),
                    },
                }
            }
            other => StreamError::Codec(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn through_io(err: TransportError, stage: Stage) -> StreamError {
        let io: std::io::Error = err.into();
        StreamError::from(CodecError::Io {
            stage,
            offset: 17,
            source: io,
        })
    }

    #[test]
    fn flush_timeout_becomes_timeout() {
        let err = through_io(
            TransportError::Timeout {
                waited: Duration::from_secs(2),
            },
            Stage::Payload,
        );
        assert!(err.is_timeout());
        assert_eq!(err.stage(), Stage::Payload);
    }

    #[test]
    fn broken_ack_stays_transport() {
        let err = through_io(TransportError::BrokenAck { received: 3 }, Stage::Header);
        assert!(matches!(
            err,
            StreamError::Transport {
                stage: Stage::Header,
                source: TransportError::BrokenAck { received: 3 }
            }
        ));
    }

    #[test]
    fn plain_io_stays_codec() {
        let err = StreamError::from(CodecError::Io {
            stage: Stage::Metadata,
            offset: 4,
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe"),
        });
        assert!(matches!(err, StreamError::Codec(CodecError::Io { .. })));
        assert_eq!(err.stage(), Stage::Metadata);
    }

    #[test]
    fn validation_keeps_header_stage() {
        let err = StreamError::from(CodecError::Validation("empty".into()));
        assert_eq!(err.stage(), Stage::Header);
        assert!(!err.is_timeout());
    }
}
