//! Configuration loading, CLI overrides and validation.
//!
//! A tunnel is configured from an optional file (json, yaml or toml) with
//! command-line flags applied on top. The result is validated once for the
//! selected [`TunnelMode`] and treated as immutable afterwards.

mod cli;
mod defaults;
mod loader;
mod types;
mod validate;

pub use cli::{CliOverrides, TlsOverrides, apply_overrides, apply_tls_overrides};
pub use loader::{ConfigError, ConfigFormat, load_config};
pub use types::*;
pub use validate::validate_config;
