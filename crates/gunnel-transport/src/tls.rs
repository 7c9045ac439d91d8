//! TLS session adapter.
//!
//! A [`TlsContext`] is built once at startup and shared read-only by every
//! worker. [`TlsContext::establish`] wraps one raw socket in a session and
//! drives the handshake to completion; tokio-rustls retries would-block and
//! interrupted outcomes on readiness, so only a real failure or the timeout
//! ends it early.

use std::sync::Arc;
use std::time::Duration;

use gunnel_config::{TlsConfig, TlsRole};
use gunnel_core::DEFAULT_SERVER_NAME;
use rustls::pki_types::ServerName;
use tokio_rustls::{TlsAcceptor, TlsConnector, TlsStream};
use tracing::debug;

use crate::error::TransportError;
use crate::leg::Leg;
use crate::socket::Socket;
use crate::tls_config::{client_config, server_config};

/// Process-wide TLS state for one role.
#[derive(Clone)]
pub enum TlsContext {
    /// Terminates TLS on accepted connections.
    Server(TlsAcceptor),
    /// Originates TLS towards the remote endpoint.
    Client {
        connector: TlsConnector,
        server_name: ServerName<'static>,
    },
}

impl TlsContext {
    /// Build the context for `role`.
    ///
    /// `remote_host` is the host part of the remote endpoint; the client role
    /// uses it as the server name unless one is configured explicitly.
    pub fn new(
        role: TlsRole,
        cfg: &TlsConfig,
        remote_host: Option<&str>,
    ) -> Result<Self, TransportError> {
        match role {
            TlsRole::Server => Ok(TlsContext::Server(TlsAcceptor::from(Arc::new(
                server_config(cfg)?,
            )))),
            TlsRole::Client => {
                let name = resolve_server_name(cfg.server_name.as_deref(), remote_host);
                let server_name = ServerName::try_from(name.to_string())
                    .map_err(|e| TransportError::Config(format!("invalid server name '{}': {}", name, e)))?;
                Ok(TlsContext::Client {
                    connector: TlsConnector::from(Arc::new(client_config(cfg)?)),
                    server_name,
                })
            }
        }
    }

    pub fn role(&self) -> TlsRole {
        match self {
            TlsContext::Server(_) => TlsRole::Server,
            TlsContext::Client { .. } => TlsRole::Client,
        }
    }

    /// Run the handshake over `socket` and return the session as a leg.
    ///
    /// On failure the socket is dropped; the relay must not start.
    pub async fn establish(&self, socket: Socket, timeout: Duration) -> Result<Leg, TransportError> {
        let handshake = async {
            match self {
                TlsContext::Server(acceptor) => {
                    acceptor.accept(socket).await.map(TlsStream::Server)
                }
                TlsContext::Client {
                    connector,
                    server_name,
                } => connector
                    .connect(server_name.clone(), socket)
                    .await
                    .map(TlsStream::Client),
            }
        };

        let stream = match tokio::time::timeout(timeout, handshake).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(TransportError::Handshake(e.to_string())),
            Err(_) => {
                return Err(TransportError::Handshake(format!(
                    "timed out after {:?}",
                    timeout
                )));
            }
        };

        let (_, session) = stream.get_ref();
        debug!(
            version = ?session.protocol_version(),
            suite = ?session.negotiated_cipher_suite().map(|s| s.suite()),
            "TLS session established"
        );
        Ok(Leg::Tls(Box::new(stream)))
    }
}

/// Server name for the client role: configured name, else the remote host,
/// else `localhost`. Local socket paths are never used as names.
fn resolve_server_name<'a>(configured: Option<&'a str>, remote_host: Option<&'a str>) -> &'a str {
    configured
        .filter(|name| !name.is_empty())
        .or(remote_host.filter(|host| !host.starts_with(gunnel_core::PATH_SEPARATOR)))
        .unwrap_or(DEFAULT_SERVER_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_server_name() {
        assert_eq!(resolve_server_name(Some("mail.example"), Some("10.0.0.1")), "mail.example");
        assert_eq!(resolve_server_name(None, Some("imap.example")), "imap.example");
        assert_eq!(resolve_server_name(None, None), "localhost");
        assert_eq!(resolve_server_name(Some(""), None), "localhost");
        assert_eq!(resolve_server_name(None, Some("/run/tls.sock")), "localhost");
    }

    #[test]
    fn test_client_context_accepts_ip_server_name() {
        let ctx = TlsContext::new(TlsRole::Client, &TlsConfig::default(), Some("127.0.0.1")).unwrap();
        assert_eq!(ctx.role(), TlsRole::Client);
        match ctx {
            TlsContext::Client { server_name, .. } => {
                assert!(matches!(server_name, ServerName::IpAddress(_)));
            }
            TlsContext::Server(_) => unreachable!(),
        }
    }

    #[test]
    fn test_server_context_requires_certificate() {
        assert!(TlsContext::new(TlsRole::Server, &TlsConfig::default(), None).is_err());
    }
}
