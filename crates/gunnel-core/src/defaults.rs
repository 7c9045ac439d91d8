//! Default configuration values.
//!
//! Centralized default constants for use across all crates.

// ============================================================================
// Identity Defaults
// ============================================================================

/// Account the relay workers run as after the privilege transition.
pub const DEFAULT_USER: &str = "nobody";
/// Group the relay workers run as after the privilege transition.
pub const DEFAULT_GROUP: &str = "nogroup";
/// Working directory of a detached daemon.
pub const DEFAULT_WORKING_DIR: &str = "/";

// ============================================================================
// Endpoint Defaults
// ============================================================================

/// Separator between the host (or path) and port components.
pub const ENDPOINT_SEPARATOR: char = ',';
/// A component starting with this character names a local socket.
pub const PATH_SEPARATOR: char = '/';
/// TLS server name used when the remote endpoint has no host.
pub const DEFAULT_SERVER_NAME: &str = "localhost";

// ============================================================================
// Socket Defaults
// ============================================================================

/// Default listen backlog.
pub const DEFAULT_LISTEN_BACKLOG: u32 = 5;
/// Default relay buffer size per direction.
pub const DEFAULT_RELAY_BUFFER_SIZE: usize = 2048;
/// Largest expedited read attempted per wake.
pub const URGENT_BUFFER_SIZE: usize = 1;

// ============================================================================
// Timeout Defaults
// ============================================================================

/// Default outbound connect timeout in seconds (0 = OS default).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
/// Default TLS handshake timeout in seconds.
pub const DEFAULT_TLS_HANDSHAKE_TIMEOUT_SECS: u64 = 10;
/// Default relay idle timeout in seconds (0 = never).
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 0;

// ============================================================================
// TLS Defaults
// ============================================================================

/// Cipher policy meaning "whatever the TLS engine considers safe".
pub const DEFAULT_CIPHER_POLICY: &str = "NORMAL";
/// Default minimum TLS version.
pub const DEFAULT_TLS_MIN_VERSION: &str = "tls12";
/// Default maximum TLS version.
pub const DEFAULT_TLS_MAX_VERSION: &str = "tls13";
