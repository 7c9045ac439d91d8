//! Relay legs for gunnel.
//!
//! A leg is one side of a relay: either a raw [`Socket`] (TCP or local
//! stream socket, with an expedited-data channel on TCP) or a TLS session
//! layered on top of one. Both implement [`gunnel_core::io::RelayLeg`].
//!
//! - [`socket`]: readiness-driven raw socket with out-of-band support.
//! - [`leg`]: the [`Leg`] enum the relay workers hand to the relay engine.
//! - [`tls_config`]: rustls contexts built from the `[tls]` settings.
//! - [`tls`]: the per-connection session adapter (handshake with timeout).

pub mod error;
pub mod leg;
pub mod socket;
pub mod tls;
pub mod tls_config;

pub use error::TransportError;
pub use leg::Leg;
pub use socket::Socket;
pub use tls::TlsContext;
