//! Listener, privilege transition, accept loop and relay workers.
//!
//! [`cli::run`] drives one tunnel mode from start to finish:
//!
//! 1. configuration (file + command line) is resolved and validated
//! 2. the target identity is looked up and probed in a child process
//! 3. endpoints are parsed, the TLS context is built, the listener is bound
//! 4. [`daemon::commit`] detaches and drops the identity
//! 5. the runtime starts and [`server::serve`] accepts until shutdown
//!
//! The pieces are public so they can be driven directly, e.g. from tests.

pub mod cli;
pub mod connector;
pub mod daemon;
pub mod error;
pub mod listener;
pub mod privilege;
pub mod server;
pub mod worker;

pub use cli::{TlsTunnelArgs, TunnelArgs, run};
pub use error::TunnelError;
pub use server::{ServeSummary, serve};
pub use worker::WorkerContext;
