//! Relay worker: optional TLS session setup, then the relay itself.

use std::time::Duration;

use gunnel_config::{Config, TlsRole};
use gunnel_core::Target;
use gunnel_core::io::{RelayEnd, RelayOptions, RelayStats, relay};
use gunnel_transport::{Leg, Socket, TlsContext};

use crate::error::TunnelError;

/// Read-only state shared by every worker of one tunnel.
#[derive(Clone)]
pub struct WorkerContext {
    /// Where accepted connections are forwarded.
    pub remote: Target,
    /// Present in the TLS modes; its role decides which leg is encrypted.
    pub tls: Option<TlsContext>,
    pub relay: RelayOptions,
    pub connect_timeout: Option<Duration>,
    pub handshake_timeout: Duration,
}

impl WorkerContext {
    pub fn new(config: &Config, remote: Target, tls: Option<TlsContext>) -> Self {
        Self {
            remote,
            tls,
            relay: RelayOptions {
                buffer_size: config.relay.buffer_size,
                idle_timeout: config.relay.idle_timeout(),
            },
            connect_timeout: config.relay.connect_timeout(),
            handshake_timeout: config.relay.handshake_timeout(),
        }
    }
}

/// Run one connection pair to completion.
///
/// A failed handshake drops both sockets without relaying anything.
pub async fn run(
    inbound: Socket,
    outbound: Socket,
    ctx: &WorkerContext,
) -> Result<(RelayEnd, RelayStats), TunnelError> {
    let (inbound, outbound) = match &ctx.tls {
        None => (Leg::from(inbound), Leg::from(outbound)),
        Some(tls) => match tls.role() {
            TlsRole::Server => {
                let session = establish(tls, inbound, &outbound, ctx).await?;
                (session, Leg::from(outbound))
            }
            TlsRole::Client => {
                let session = establish(tls, outbound, &inbound, ctx).await?;
                (Leg::from(inbound), session)
            }
        },
    };

    Ok(relay(inbound, outbound, &ctx.relay).await?)
}

async fn establish(
    tls: &TlsContext,
    raw: Socket,
    other: &Socket,
    ctx: &WorkerContext,
) -> Result<Leg, TunnelError> {
    match tls.establish(raw, ctx.handshake_timeout).await {
        Ok(session) => Ok(session),
        Err(e) => {
            let _ = other.shutdown(std::net::Shutdown::Both);
            Err(TunnelError::HandshakeFailed(e))
        }
    }
}

