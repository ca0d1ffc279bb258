//! Engine error taxonomy.
//!
//! Every fallible engine operation returns [`EngineError`]. The flat numeric
//! codes exposed by [`EngineError::code`] are stable and intended for callers
//! that forward engine failures across an FFI or process boundary.

use std::io;

/// Result whose Err variant is [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;

/// Failures surfaced by the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A caller-supplied argument was missing or malformed.
    #[error("invalid parameter: {0}")]
    InvalidParams(&'static str),

    /// An API call arrived in the wrong lifecycle state.
    #[error("invalid lifecycle state: {0}")]
    InvalidState(&'static str),

    /// Bad HTTP syntax or an oversize field.
    #[error("validation failed: {0}")]
    ValidationFailed(&'static str),

    /// The request URI has no registered handler.
    #[error("no endpoint registered for URI")]
    NotRegistered,

    /// The URI is registered but not for the request method.
    #[error("method not allowed for endpoint")]
    MethodNotAllowed,

    /// An endpoint registration collided with an existing URI.
    #[error("endpoint already registered")]
    AlreadyRegistered,

    /// The request body exceeded the per-connection data cap.
    #[error("payload exceeds per-connection limit")]
    PayloadTooLarge,

    /// The peer stayed idle past the configured connection timeout.
    #[error("connection timed out")]
    Timeout,

    /// The peer reset the connection.
    #[error("connection reset by peer")]
    ConnectionReset,

    /// The peer closed the connection mid-message.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// TLS handshake or record-layer failure.
    #[error("TLS failure: {0}")]
    Tls(String),

    /// The operation raced an in-progress shutdown.
    #[error("shutdown in progress")]
    ShutdownInProgress,

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),

    /// Underlying socket I/O failure not covered by a more specific kind.
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),
}

impl EngineError {
    /// Stable flat error code for this kind.
    pub fn code(&self) -> u32 {
        match self {
            EngineError::InvalidParams(_) => 61001,
            EngineError::InvalidState(_) => 61002,
            EngineError::ValidationFailed(_) => 61003,
            EngineError::NotRegistered => 61004,
            EngineError::MethodNotAllowed => 61005,
            EngineError::AlreadyRegistered => 61006,
            EngineError::PayloadTooLarge => 61007,
            EngineError::Timeout => 61008,
            EngineError::ConnectionReset => 61009,
            EngineError::ConnectionClosed => 61010,
            EngineError::Tls(_) => 61011,
            EngineError::ShutdownInProgress => 61012,
            EngineError::Internal(_) => 61013,
            EngineError::Io(_) => 61014,
        }
    }

    /// Classifies a socket read/write failure into the engine taxonomy.
    pub(crate) fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => EngineError::Timeout,
            io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => {
                EngineError::ConnectionReset
            }
            io::ErrorKind::ConnectionAborted | io::ErrorKind::UnexpectedEof => {
                EngineError::ConnectionClosed
            }
            _ => EngineError::Io(err),
        }
    }

    /// True for kinds that mean the peer is gone and the connection must be
    /// torn down without any further framing.
    pub(crate) fn is_disconnect(&self) -> bool {
        matches!(
            self,
            EngineError::Timeout
                | EngineError::ConnectionReset
                | EngineError::ConnectionClosed
                | EngineError::Tls(_)
                | EngineError::Io(_)
        )
    }
}

#[cfg(test)]
mod test {
    use super::EngineError;
    use std::io;

    #[test]
    fn codes_are_distinct_per_kind() {
        let errors = [
            EngineError::InvalidParams("x"),
            EngineError::InvalidState("x"),
            EngineError::ValidationFailed("x"),
            EngineError::NotRegistered,
            EngineError::MethodNotAllowed,
            EngineError::AlreadyRegistered,
            EngineError::PayloadTooLarge,
            EngineError::Timeout,
            EngineError::ConnectionReset,
            EngineError::ConnectionClosed,
            EngineError::Tls(String::new()),
            EngineError::ShutdownInProgress,
            EngineError::Internal(String::new()),
        ];

        let mut codes: Vec<u32> = errors.iter().map(EngineError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(errors.len(), codes.len());
    }

    #[test]
    fn read_timeout_maps_to_timeout_kind() {
        let err = EngineError::from_io(io::Error::from(io::ErrorKind::WouldBlock));
        assert!(matches!(err, EngineError::Timeout));
        let err = EngineError::from_io(io::Error::from(io::ErrorKind::TimedOut));
        assert!(matches!(err, EngineError::Timeout));
    }

    #[test]
    fn peer_reset_maps_to_connection_reset() {
        let err = EngineError::from_io(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(matches!(err, EngineError::ConnectionReset));
        assert!(err.is_disconnect());
    }
}
