//! Error types for the echoprint crate.

use std::io;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving connections.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP/2 protocol error (framing, stream state, HPACK).
    #[error("HTTP/2 protocol error: {0}")]
    Protocol(String),

    /// Malformed TLS ClientHello.
    #[error("ClientHello dissection failed: {0}")]
    Dissect(String),

    /// TLS handshake or acceptor setup error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// QUIC/HTTP3 adapter error.
    #[error("QUIC error: {0}")]
    Quic(String),

    /// Invalid or unloadable configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Analytics sink failure. Best-effort, logged and ignored.
    #[error("Analytics error: {0}")]
    Analytics(#[from] mongodb::error::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Timed out waiting for the peer.
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl Error {
    /// Create an HTTP/2 protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Create a dissection error.
    pub fn dissect(message: impl Into<String>) -> Self {
        Self::Dissect(message.into())
    }

    /// Create a TLS error.
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create a QUIC error.
    pub fn quic(message: impl Into<String>) -> Self {
        Self::Quic(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    /// True when the underlying cause is an ordinary peer disconnect
    /// (reset, broken pipe, EOF). These terminate a connection silently.
    pub fn is_benign_disconnect(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            Self::Protocol(msg) => msg.contains("connection closed"),
            _ => false,
        }
    }
}
