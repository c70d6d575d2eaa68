use thiserror::Error;

/// Errors that can occur during peer communication.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Network I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote end refused the TCP connection.
    #[error("connection refused")]
    ConnectionRefused,

    /// The peer sent an invalid handshake.
    #[error("invalid handshake")]
    InvalidHandshake,

    /// The peer's info hash doesn't match ours.
    #[error("info hash mismatch")]
    InfoHashMismatch,

    /// Received a malformed protocol message.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Received an unknown message ID.
    #[error("invalid message id: {0}")]
    InvalidMessageId(u8),

    /// A length prefix described an implausibly large frame.
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// Protocol violation by the peer (unexpected message type or order).
    #[error("protocol violation: {0}")]
    Violation(String),

    /// The connection was closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// No chunk arrived within the per-request window.
    #[error("request timed out")]
    Timeout,
}
