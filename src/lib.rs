//! # gunnel
//!
//! TCP tunnel daemons: accept on a local endpoint, forward to a remote one,
//! optionally adding or removing a TLS layer on the way, and relay both
//! directions (out-of-band data included) under an unprivileged identity.
//!
//! ## Crates
//!
//! - [`gunnel_core`] - Endpoint parser, defaults and the relay engine
//! - [`gunnel_config`] - Configuration loading, overrides and validation
//! - [`gunnel_transport`] - Raw socket and TLS session legs
//! - [`gunnel_tunnel`] - Listener, privilege transition and accept loop

pub use gunnel_config as config;
pub use gunnel_core as core;
pub use gunnel_transport as transport;
pub use gunnel_tunnel as tunnel;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use gunnel_config::{Config, TunnelMode, load_config, validate_config};
    pub use gunnel_core::{Endpoint, EndpointError};
    pub use gunnel_tunnel::{ServeSummary, TunnelError, WorkerContext, run, serve};
}
