//! Core types shared across gunnel crates.
//!
//! This crate provides:
//! - Default configuration values
//! - Error kind labels for logging
//! - The generalized endpoint parser
//! - The bidirectional relay engine

pub mod defaults;
pub mod endpoint;
pub mod errors;
pub mod io;

pub use defaults::*;
pub use endpoint::{Endpoint, EndpointError, Target};
pub use errors::*;

/// Project name.
pub const PROJECT_NAME: &str = "gunnel";
/// Project version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
