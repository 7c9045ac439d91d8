//! Listening socket setup.
//!
//! Binding happens synchronously at startup, before the runtime exists and
//! while the process still holds its initial identity, so privileged ports
//! work. The std listener is handed to tokio once the runtime is up.

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener as StdUnixListener, UnixStream as StdUnixStream};
use std::path::{Path, PathBuf};

use gunnel_core::{Endpoint, Target};
use gunnel_transport::Socket;
use socket2::{Domain, Protocol, Socket as RawSocket, Type};
use tracing::{debug, info};

use crate::error::TunnelError;

/// A bound and listening socket, not yet registered with a runtime.
#[derive(Debug)]
pub enum BoundListener {
    Tcp(std::net::TcpListener),
    Unix {
        listener: StdUnixListener,
        path: PathBuf,
    },
}

impl BoundListener {
    /// Local address of a TCP listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            BoundListener::Tcp(l) => l.local_addr().ok(),
            BoundListener::Unix { .. } => None,
        }
    }

    /// Register with the current tokio runtime.
    pub fn into_listener(self) -> io::Result<Listener> {
        match self {
            BoundListener::Tcp(l) => {
                l.set_nonblocking(true)?;
                Ok(Listener::Tcp(tokio::net::TcpListener::from_std(l)?))
            }
            BoundListener::Unix { listener, path } => {
                listener.set_nonblocking(true)?;
                Ok(Listener::Unix {
                    listener: tokio::net::UnixListener::from_std(listener)?,
                    path,
                })
            }
        }
    }
}

impl fmt::Display for BoundListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundListener::Tcp(l) => match l.local_addr() {
                Ok(addr) => write!(f, "{}", addr),
                Err(_) => f.write_str("tcp"),
            },
            BoundListener::Unix { path, .. } => write!(f, "{}", path.display()),
        }
    }
}

/// A listening socket owned by the accept loop.
#[derive(Debug)]
pub enum Listener {
    Tcp(tokio::net::TcpListener),
    Unix {
        listener: tokio::net::UnixListener,
        path: PathBuf,
    },
}

impl Listener {
    /// Accept one connection as a raw socket, with a printable peer name.
    pub async fn accept(&self) -> io::Result<(Socket, String)> {
        match self {
            Listener::Tcp(l) => {
                let (stream, peer) = l.accept().await?;
                Ok((Socket::from_tcp(stream)?, peer.to_string()))
            }
            Listener::Unix { listener, path } => {
                let (stream, _) = listener.accept().await?;
                Ok((Socket::from_unix(stream)?, path.display().to_string()))
            }
        }
    }
}

/// Bind and listen on `endpoint`, trying each candidate address in turn.
pub fn bind(endpoint: &Endpoint, backlog: u32) -> Result<BoundListener, TunnelError> {
    match endpoint.target()? {
        Target::Local(path) => bind_local(&path, backlog),
        Target::Network { host, port } => {
            let candidates = bind_candidates(host.as_deref(), port)
                .map_err(|e| TunnelError::BindFailed(format!("{}: {}", endpoint, e)))?;
            let mut last_err = None;
            for addr in candidates {
                match bind_tcp(addr, backlog) {
                    Ok(listener) => {
                        info!(local = %addr, backlog, "listening");
                        return Ok(BoundListener::Tcp(listener));
                    }
                    Err(e) => {
                        debug!(candidate = %addr, error = %e, "bind candidate failed");
                        last_err = Some(e);
                    }
                }
            }
            Err(TunnelError::BindFailed(match last_err {
                Some(e) => format!("{}: {}", endpoint, e),
                None => format!("{}: no usable address", endpoint),
            }))
        }
    }
}

/// Wildcard addresses when no host is given (IPv6 first, dual-stack).
fn bind_candidates(host: Option<&str>, port: u16) -> io::Result<Vec<SocketAddr>> {
    match host {
        None => Ok(vec![
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, port)),
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
        ]),
        Some(host) => Ok((host, port).to_socket_addrs()?.collect()),
    }
}

fn bind_tcp(addr: SocketAddr, backlog: u32) -> io::Result<std::net::TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    // A failed candidate's socket is closed when it goes out of scope.
    let socket = RawSocket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    if addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog.min(i32::MAX as u32) as i32)?;
    Ok(socket.into())
}

fn bind_local(path: &Path, backlog: u32) -> Result<BoundListener, TunnelError> {
    let failed = |e: io::Error| TunnelError::BindFailed(format!("{}: {}", path.display(), e));

    // A socket file left behind by an earlier run would make bind fail.
    if let Ok(meta) = std::fs::symlink_metadata(path)
        && meta.file_type().is_socket()
    {
        match StdUnixStream::connect(path) {
            Ok(_) => {
                return Err(TunnelError::BindFailed(format!(
                    "{}: socket is in use by another process",
                    path.display()
                )));
            }
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                debug!(path = %path.display(), "removing stale socket file");
                std::fs::remove_file(path).map_err(failed)?;
            }
            // Anything else (e.g. permission denied) is left for bind to report.
            Err(e) => debug!(path = %path.display(), error = %e, "socket file probe failed"),
        }
    }

    let socket = RawSocket::new(Domain::UNIX, Type::STREAM, None).map_err(failed)?;
    let addr = socket2::SockAddr::unix(path).map_err(failed)?;
    socket.bind(&addr).map_err(failed)?;
    socket
        .listen(backlog.min(i32::MAX as u32) as i32)
        .map_err(failed)?;

    info!(local = %path.display(), backlog, "listening");
    Ok(BoundListener::Unix {
        listener: socket.into(),
        path: path.to_path_buf(),
    })
}
