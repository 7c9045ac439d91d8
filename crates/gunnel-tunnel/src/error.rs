//! Error types for the tunnel crate.

use gunnel_config::ConfigError;
use gunnel_core::{
    ERROR_BIND, ERROR_CONFIG, ERROR_CONNECT, ERROR_DETACH, ERROR_ENDPOINT, ERROR_IO,
    ERROR_PRIVILEGE, ERROR_RESOURCE, ERROR_TIMEOUT, EndpointError,
};
use gunnel_transport::TransportError;
use thiserror::Error;

use crate::privilege::PrivilegeError;

/// Everything that can stop a tunnel or one of its connections.
#[derive(Error, Debug)]
pub enum TunnelError {
    /// Usage was requested; the payload is the text to print.
    #[error("{0}")]
    Usage(String),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Endpoint(#[from] EndpointError),

    #[error("{0}")]
    Privilege(#[from] PrivilegeError),

    #[error("failed to detach: {0}")]
    Detach(String),

    #[error("cannot listen on {0}")]
    BindFailed(String),

    #[error("TLS context: {0}")]
    TlsContext(TransportError),

    #[error("cannot connect to {0}")]
    RemoteConnectFailed(String),

    #[error("connect to {0} timed out")]
    ConnectTimeout(String),

    #[error("handshake failed: {0}")]
    HandshakeFailed(TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TunnelError {
    /// Process exit status for a fatal error.
    ///
    /// Per-connection errors never end the process; they share the generic
    /// runtime status only so the mapping stays total.
    pub fn exit_code(&self) -> u8 {
        match self {
            TunnelError::Usage(_) => 1,
            TunnelError::Config(_) => 2,
            TunnelError::Endpoint(EndpointError::ResourceExhausted) => 4,
            TunnelError::Endpoint(_) => 3,
            TunnelError::Privilege(e) => e.exit_code(),
            TunnelError::Detach(_) => 9,
            TunnelError::BindFailed(_) => 10,
            TunnelError::TlsContext(_) => 11,
            TunnelError::RemoteConnectFailed(_)
            | TunnelError::ConnectTimeout(_)
            | TunnelError::HandshakeFailed(_)
            | TunnelError::Io(_) => 12,
        }
    }

    /// Stable label for logs.
    pub fn error_type(&self) -> &'static str {
        match self {
            TunnelError::Usage(_) | TunnelError::Config(_) => ERROR_CONFIG,
            TunnelError::Endpoint(EndpointError::ResourceExhausted) => ERROR_RESOURCE,
            TunnelError::Endpoint(_) => ERROR_ENDPOINT,
            TunnelError::Privilege(_) => ERROR_PRIVILEGE,
            TunnelError::Detach(_) => ERROR_DETACH,
            TunnelError::BindFailed(_) => ERROR_BIND,
            TunnelError::TlsContext(e) | TunnelError::HandshakeFailed(e) => e.error_type(),
            TunnelError::RemoteConnectFailed(_) => ERROR_CONNECT,
            TunnelError::ConnectTimeout(_) => ERROR_TIMEOUT,
            TunnelError::Io(_) => ERROR_IO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_fatal_exit_codes_are_distinct() {
        let fatal = [
            TunnelError::Usage(String::new()),
            TunnelError::Config(ConfigError::Validation("backlog".into())),
            TunnelError::Endpoint(EndpointError::InvalidEndpoint(String::new())),
            TunnelError::Endpoint(EndpointError::ResourceExhausted),
            TunnelError::Privilege(PrivilegeError::InvalidGroup("staff".into())),
            TunnelError::Privilege(PrivilegeError::InvalidUser("www".into())),
            TunnelError::Privilege(PrivilegeError::GroupTransitionFailed("staff".into())),
            TunnelError::Privilege(PrivilegeError::UserTransitionFailed("www".into())),
            TunnelError::Detach("fork".into()),
            TunnelError::BindFailed("0.0.0.0:25".into()),
            TunnelError::TlsContext(TransportError::Config("no cert".into())),
            TunnelError::Io(std::io::Error::other("runtime")),
        ];
        let codes: HashSet<u8> = fatal.iter().map(TunnelError::exit_code).collect();
        assert_eq!(codes.len(), fatal.len());
        assert!(!codes.contains(&0));
    }

    #[test]
    fn test_unknown_service_is_an_endpoint_error() {
        let err = TunnelError::from(EndpointError::UnknownService("nosuch".into()));
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.error_type(), ERROR_ENDPOINT);
    }
}
