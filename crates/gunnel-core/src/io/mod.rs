//! Relay transports and the bidirectional relay engine.

mod relay;

use std::future::Future;
use std::io;

pub use relay::{RelayEnd, RelayOptions, RelayStats, Side, relay};

/// What a leg produced when it woke up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegEvent {
    /// `n` bytes of expedited (out-of-band) data were read into the buffer.
    Urgent(usize),
    /// `n` bytes of ordinary data were read into the buffer.
    Data(usize),
    /// The peer closed its side of the stream.
    Closed,
}

/// How expedited bytes reached the opposite leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrgentDelivery {
    /// Sent on the leg's own expedited channel.
    Expedited,
    /// The leg has no expedited channel; sent in the ordinary stream.
    Inline,
}

/// One side of a relay: either a raw socket or an encrypted session.
///
/// `next_event` must be cancel-safe. The relay races both legs and drops
/// the loser's future, so no bytes may be consumed before the returned
/// future resolves.
pub trait RelayLeg: Send {
    /// Wait until the leg has expedited data, ordinary data or end-of-stream.
    ///
    /// Expedited data is reported before ordinary data when both are
    /// pending. Interrupted waits and reads are retried internally.
    fn next_event<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = io::Result<LegEvent>> + Send + 'a;

    /// Write all of `data` to the leg.
    fn send<'a>(&'a mut self, data: &'a [u8]) -> impl Future<Output = io::Result<()>> + Send + 'a;

    /// Write expedited data, falling back to the ordinary stream when the leg
    /// has no expedited channel.
    fn send_urgent<'a>(
        &'a mut self,
        data: &'a [u8],
    ) -> impl Future<Output = io::Result<UrgentDelivery>> + Send + 'a {
        async move {
            self.send(data).await?;
            Ok(UrgentDelivery::Inline)
        }
    }

    /// Shut the leg down in both directions. Errors are swallowed.
    fn close(&mut self) -> impl Future<Output = ()> + Send + '_;
}
