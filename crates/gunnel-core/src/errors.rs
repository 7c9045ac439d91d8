//! Error kind labels for logging.
//!
//! These constants provide consistent error classification across all crates.

/// Endpoint string could not be parsed or resolved.
pub const ERROR_ENDPOINT: &str = "endpoint";
/// Configuration error.
pub const ERROR_CONFIG: &str = "config";
/// Identity lookup or switch failed.
pub const ERROR_PRIVILEGE: &str = "privilege";
/// Detaching from the terminal failed.
pub const ERROR_DETACH: &str = "detach";
/// Listening socket could not be set up.
pub const ERROR_BIND: &str = "bind";
/// Outbound connection failed.
pub const ERROR_CONNECT: &str = "connect";
/// TLS context or handshake error.
pub const ERROR_TLS: &str = "tls";
/// I/O error.
pub const ERROR_IO: &str = "io";
/// Timeout error.
pub const ERROR_TIMEOUT: &str = "timeout";
/// Allocation failed.
pub const ERROR_RESOURCE: &str = "resource";
