//! Bidirectional relay between two legs.
//!
//! Each cycle waits for whichever leg wakes first, services expedited data
//! before ordinary data, and writes the result to the opposite leg in full.
//! The relay ends as soon as either leg reports end-of-stream or an error;
//! both legs are then shut down in both directions before returning, on the
//! error path too.
//!
//! There is no buffering beyond one read per direction: a slow writer
//! delays the next cycle rather than dropping data.

use std::io;
use std::time::Duration;

use tracing::trace;

use super::{LegEvent, RelayLeg};
use crate::defaults::DEFAULT_RELAY_BUFFER_SIZE;

/// Tunables for one relay.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Read buffer size per direction.
    pub buffer_size: usize,
    /// End the relay when neither leg wakes for this long.
    pub idle_timeout: Option<Duration>,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_RELAY_BUFFER_SIZE,
            idle_timeout: None,
        }
    }
}

/// Which leg of the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The accepted connection.
    Inbound,
    /// The connection to the remote endpoint.
    Outbound,
}

/// Why a relay finished without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// The given leg reached end-of-stream.
    Closed(Side),
    /// Neither leg woke within the idle timeout.
    IdleTimeout,
}

/// Byte counters for one relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Ordinary bytes copied inbound -> outbound.
    pub inbound_bytes: u64,
    /// Ordinary bytes copied outbound -> inbound.
    pub outbound_bytes: u64,
    /// Expedited bytes copied in either direction.
    pub urgent_bytes: u64,
}

/// Relay between `inbound` and `outbound` until one side ends.
pub async fn relay<A, B>(
    mut inbound: A,
    mut outbound: B,
    options: &RelayOptions,
) -> io::Result<(RelayEnd, RelayStats)>
where
    A: RelayLeg,
    B: RelayLeg,
{
    let mut stats = RelayStats::default();
    let result = pump(&mut inbound, &mut outbound, options, &mut stats).await;

    tokio::join!(inbound.close(), outbound.close());

    result.map(|end| (end, stats))
}

async fn pump<A, B>(
    inbound: &mut A,
    outbound: &mut B,
    options: &RelayOptions,
    stats: &mut RelayStats,
) -> io::Result<RelayEnd>
where
    A: RelayLeg,
    B: RelayLeg,
{
    let size = options.buffer_size.max(1);
    let mut in_buf = vec![0u8; size];
    let mut out_buf = vec![0u8; size];

    loop {
        let wake = async {
            tokio::select! {
                event = inbound.next_event(&mut in_buf) => (Side::Inbound, event),
                event = outbound.next_event(&mut out_buf) => (Side::Outbound, event),
            }
        };

        let (side, event) = match options.idle_timeout {
            Some(idle) => match tokio::time::timeout(idle, wake).await {
                Ok(woke) => woke,
                Err(_) => return Ok(RelayEnd::IdleTimeout),
            },
            None => wake.await,
        };

        match (side, event?) {
            (side, LegEvent::Closed) => return Ok(RelayEnd::Closed(side)),
            (Side::Inbound, LegEvent::Urgent(n)) => {
                let delivery = outbound.send_urgent(&in_buf[..n]).await?;
                trace!(bytes = n, ?delivery, "expedited data relayed inbound -> outbound");
                stats.urgent_bytes += n as u64;
            }
            (Side::Outbound, LegEvent::Urgent(n)) => {
                let delivery = inbound.send_urgent(&out_buf[..n]).await?;
                trace!(bytes = n, ?delivery, "expedited data relayed outbound -> inbound");
                stats.urgent_bytes += n as u64;
            }
            (Side::Inbound, LegEvent::Data(n)) => {
                outbound.send(&in_buf[..n]).await?;
                stats.inbound_bytes += n as u64;
            }
            (Side::Outbound, LegEvent::Data(n)) => {
                inbound.send(&out_buf[..n]).await?;
                stats.outbound_bytes += n as u64;
            }
        }
    }
}
