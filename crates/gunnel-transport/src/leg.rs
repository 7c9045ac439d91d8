//! The leg type handed to the relay engine.

use std::fmt;
use std::future::Future;
use std::io;
use std::net::Shutdown;
use std::time::Duration;

use gunnel_core::io::{LegEvent, RelayLeg, UrgentDelivery};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_rustls::TlsStream;
use tracing::debug;

use crate::socket::Socket;

/// Upper bound on sending close_notify to a peer that stopped reading.
const CLOSE_NOTIFY_TIMEOUT: Duration = Duration::from_secs(1);

/// One side of a relay.
pub enum Leg {
    /// Raw socket, with an expedited channel when it is TCP.
    Plain(Socket),
    /// Established TLS session. Expedited data travels inline.
    Tls(Box<TlsStream<Socket>>),
}

impl Leg {
    pub fn is_tls(&self) -> bool {
        matches!(self, Leg::Tls(_))
    }
}

impl fmt::Debug for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leg::Plain(socket) => f.debug_tuple("Plain").field(socket).finish(),
            Leg::Tls(stream) => f.debug_tuple("Tls").field(stream.get_ref().0).finish(),
        }
    }
}

impl From<Socket> for Leg {
    fn from(socket: Socket) -> Self {
        Leg::Plain(socket)
    }
}

impl RelayLeg for Leg {
    fn next_event<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = io::Result<LegEvent>> + Send + 'a {
        async move {
            match self {
                Leg::Plain(socket) => socket.next_event(buf).await,
                // rustls keeps decrypted bytes buffered if this read is
                // dropped, so the relay may race it against the other leg.
                Leg::Tls(stream) => match stream.read(buf).await {
                    Ok(0) => Ok(LegEvent::Closed),
                    Ok(n) => Ok(LegEvent::Data(n)),
                    // Peer closed the transport without close_notify.
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(LegEvent::Closed),
                    Err(e) => Err(e),
                },
            }
        }
    }

    fn send<'a>(&'a mut self, data: &'a [u8]) -> impl Future<Output = io::Result<()>> + Send + 'a {
        async move {
            match self {
                Leg::Plain(socket) => socket.send(data).await,
                Leg::Tls(stream) => {
                    stream.write_all(data).await?;
                    stream.flush().await
                }
            }
        }
    }

    fn send_urgent<'a>(
        &'a mut self,
        data: &'a [u8],
    ) -> impl Future<Output = io::Result<UrgentDelivery>> + Send + 'a {
        async move {
            match self {
                Leg::Plain(socket) => socket.send_urgent(data).await,
                Leg::Tls(stream) => {
                    stream.write_all(data).await?;
                    stream.flush().await?;
                    Ok(UrgentDelivery::Inline)
                }
            }
        }
    }

    fn close(&mut self) -> impl Future<Output = ()> + Send + '_ {
        async move {
            match self {
                Leg::Plain(socket) => socket.close().await,
                Leg::Tls(stream) => {
                    match tokio::time::timeout(CLOSE_NOTIFY_TIMEOUT, stream.shutdown()).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => debug!(error = %e, "close_notify failed"),
                        Err(_) => debug!("close_notify timed out"),
                    }
                    let _ = stream.get_ref().0.shutdown(Shutdown::Both);
                }
            }
        }
    }
}
