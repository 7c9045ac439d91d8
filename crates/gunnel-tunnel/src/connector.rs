//! Outbound connector.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use gunnel_core::Target;
use gunnel_transport::Socket;
use tokio::net::{TcpStream, UnixStream};
use tracing::debug;

use crate::error::TunnelError;

/// Connect to the remote target, trying every resolved address in order.
///
/// Host names are resolved on each call so address changes are picked up.
/// Without a host the loopback addresses are used. `timeout` bounds each
/// candidate attempt.
pub async fn connect(target: &Target, timeout: Option<Duration>) -> Result<Socket, TunnelError> {
    match target {
        Target::Local(path) => connect_local(path, timeout).await,
        Target::Network { host, port } => {
            let candidates = match host {
                Some(host) => tokio::net::lookup_host((host.as_str(), *port))
                    .await
                    .map_err(|e| {
                        TunnelError::RemoteConnectFailed(format!("{}: {}", target, e))
                    })?
                    .collect(),
                None => vec![
                    SocketAddr::from((Ipv6Addr::LOCALHOST, *port)),
                    SocketAddr::from((Ipv4Addr::LOCALHOST, *port)),
                ],
            };

            let mut last_err = None;
            for addr in candidates {
                match with_timeout(timeout, TcpStream::connect(addr)).await {
                    Ok(stream) => {
                        debug!(remote = %addr, "connected");
                        return Ok(Socket::from_tcp(stream)?);
                    }
                    Err(e) => {
                        debug!(candidate = %addr, error = %e, "connect candidate failed");
                        last_err = Some(e);
                    }
                }
            }
            Err(match last_err {
                Some(e) if e.kind() == io::ErrorKind::TimedOut => {
                    TunnelError::ConnectTimeout(target.to_string())
                }
                Some(e) => TunnelError::RemoteConnectFailed(format!("{}: {}", target, e)),
                None => TunnelError::RemoteConnectFailed(format!("{}: no address", target)),
            })
        }
    }
}

async fn connect_local(path: &Path, timeout: Option<Duration>) -> Result<Socket, TunnelError> {
    match with_timeout(timeout, UnixStream::connect(path)).await {
        Ok(stream) => Ok(Socket::from_unix(stream)?),
        Err(e) if e.kind() == io::ErrorKind::TimedOut => {
            Err(TunnelError::ConnectTimeout(path.display().to_string()))
        }
        Err(e) => Err(TunnelError::RemoteConnectFailed(format!(
            "{}: {}",
            path.display(),
            e
        ))),
    }
}

async fn with_timeout<T>(
    timeout: Option<Duration>,
    fut: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or_else(|_| Err(io::ErrorKind::TimedOut.into())),
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_loopback_without_host() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let target = Target::Network { host: None, port };

        let (connected, accepted) = tokio::join!(connect(&target, None), listener.accept());
        assert!(connected.is_ok());
        assert!(accepted.is_ok());
    }

    #[tokio::test]
    async fn test_connect_by_name() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let target = Target::Network {
            host: Some("localhost".into()),
            port,
        };
        let (connected, _) = tokio::join!(
            connect(&target, Some(Duration::from_secs(5))),
            listener.accept()
        );
        assert!(connected.is_ok());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let target = Target::Network {
            host: Some("127.0.0.1".into()),
            port,
        };
        let err = connect(&target, None).await.unwrap_err();
        assert!(matches!(err, TunnelError::RemoteConnectFailed(_)));
    }

    #[tokio::test]
    async fn test_connect_missing_local_socket() {
        let dir = tempfile::tempdir().unwrap();
        let target = Target::Local(dir.path().join("absent.sock"));
        let err = connect(&target, None).await.unwrap_err();
        assert!(matches!(err, TunnelError::RemoteConnectFailed(_)));
    }
}
