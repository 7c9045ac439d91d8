//! Error types for the transport crate.

use thiserror::Error;

/// Errors that can occur in transport operations.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("handshake failed: {0}")]
    Handshake(String),
}

impl TransportError {
    /// Stable label for logs.
    pub fn error_type(&self) -> &'static str {
        use gunnel_core::{ERROR_CONFIG, ERROR_IO, ERROR_TLS};
        match self {
            TransportError::Io(_) => ERROR_IO,
            TransportError::Tls(_) | TransportError::Handshake(_) => ERROR_TLS,
            TransportError::Config(_) => ERROR_CONFIG,
        }
    }
}
