/// Botwire error types.
///
/// One taxonomy for the whole runtime; I/O failures surface only through
/// `TransportIo` and there is no unwind path across the service thread.
use std::io;
use thiserror::Error;

/// Main error type for botwire operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Socket creation, resolution, connect, or option failure.
    /// Fatal for this connection; no service thread is started.
    #[error("transport setup: {0}")]
    TransportSetup(#[source] io::Error),

    /// A read or write completed with an error, or the peer closed.
    /// Triggers connection teardown.
    #[error("transport I/O: {0}")]
    TransportIo(#[source] io::Error),

    /// A payload failed schema validation. The message is dropped and the
    /// stream continues.
    #[error("payload validation failed for {kind}: {reason}")]
    DecodeValidation { kind: &'static str, reason: String },

    /// An outbound payload is too large for the 16-bit length field.
    #[error("payload of {size} bytes exceeds the frame limit")]
    FrameOverflow { size: usize },

    /// Controllable/configuration mismatch during agent spawn.
    /// The offending entry is skipped; the remaining indices proceed.
    #[error("agent protocol: {0}")]
    AgentProtocol(String),

    /// Cooperative shutdown was requested. Not a failure, but it travels the
    /// same teardown path.
    #[error("quit requested")]
    QuitRequested,
}

/// Result type alias for botwire operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn setup(err: io::Error) -> Self {
        Self::TransportSetup(err)
    }

    pub fn io(err: io::Error) -> Self {
        Self::TransportIo(err)
    }

    pub fn validation(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::DecodeValidation {
            kind,
            reason: reason.into(),
        }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::AgentProtocol(msg.into())
    }

    /// Whether this error tears down the connection.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::TransportSetup(_) | Self::TransportIo(_) | Self::QuitRequested
        )
    }

    /// Whether the stream continues after this error is logged.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DecodeValidation { .. } | Self::FrameOverflow { .. } | Self::AgentProtocol(_)
        )
    }
}
