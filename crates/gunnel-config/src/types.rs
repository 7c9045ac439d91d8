//! Configuration type definitions.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults::*;

/// Which tunnel variant is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TunnelMode {
    /// Accept plaintext, forward over TLS.
    PlainToTls,
    /// Terminate TLS, forward plaintext.
    TlsToPlain,
    /// Forward plaintext unchanged.
    PlainToPlain,
}

/// The side of the handshake a mode performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsRole {
    /// Originate TLS on the outbound leg.
    Client,
    /// Terminate TLS on the inbound leg.
    Server,
}

impl TunnelMode {
    /// Subcommand name of the mode.
    pub fn name(self) -> &'static str {
        match self {
            TunnelMode::PlainToTls => "plain-to-tls",
            TunnelMode::TlsToPlain => "tls-to-plain",
            TunnelMode::PlainToPlain => "plain-to-plain",
        }
    }

    pub fn tls_role(self) -> Option<TlsRole> {
        match self {
            TunnelMode::PlainToTls => Some(TlsRole::Client),
            TunnelMode::TlsToPlain => Some(TlsRole::Server),
            TunnelMode::PlainToPlain => None,
        }
    }
}

impl fmt::Display for TunnelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tunnel: TunnelConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The two endpoints and the looping behaviour.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Local endpoint to listen on, `[host|path][,port]`.
    #[serde(default)]
    pub local: Option<String>,
    /// Remote endpoint to forward to, `[host|path][,port]`.
    #[serde(default)]
    pub remote: Option<String>,
    /// Serve exactly one connection, then stop.
    #[serde(default)]
    pub one_shot: bool,
    /// Stay attached to the terminal (identity is still dropped).
    #[serde(default)]
    pub foreground: bool,
}

/// Unprivileged identity the tunnel assumes before serving.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_group")]
    pub group: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user: default_user(),
            group: default_group(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Certificate chain file path (PEM format).
    #[serde(default)]
    pub cert: Option<String>,
    /// Private key file path (PEM format). Defaults to `cert`.
    #[serde(default)]
    pub key: Option<String>,
    /// CA chain used to verify the peer.
    #[serde(default)]
    pub ca: Option<String>,
    /// Cipher policy: `NORMAL` for engine defaults, or a list of suite names.
    #[serde(default = "default_ciphers")]
    pub ciphers: String,
    /// Server name presented by the client role. Defaults to the remote host.
    #[serde(default)]
    pub server_name: Option<String>,
    /// Minimum TLS version (tls12, tls13). Default: tls12
    #[serde(default = "default_min_tls_version")]
    pub min_version: String,
    /// Maximum TLS version (tls12, tls13). Default: tls13
    #[serde(default = "default_max_tls_version")]
    pub max_version: String,
}

impl TlsConfig {
    /// Key file, falling back to the certificate file (bundled PEM).
    pub fn key_path(&self) -> Option<&str> {
        self.key.as_deref().or(self.cert.as_deref())
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert: None,
            key: None,
            ca: None,
            ciphers: default_ciphers(),
            server_name: None,
            min_version: default_min_tls_version(),
            max_version: default_max_tls_version(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Read buffer size per direction (bytes).
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Idle timeout (seconds, 0 = never).
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Outbound connect timeout (seconds, 0 = OS default).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// TLS handshake timeout (seconds).
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    /// Listen backlog.
    #[serde(default = "default_backlog")]
    pub backlog: u32,
}

impl RelayConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.idle_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.connect_timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            idle_timeout_secs: default_idle_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
            backlog: default_backlog(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Base log level (trace, debug, info, warn, error). Default: info
    #[serde(default)]
    pub level: Option<String>,
    /// Output format: pretty, compact, json. Default: pretty
    #[serde(default)]
    pub format: Option<String>,
    /// Output target: stderr, stdout or a file path. Default: stderr
    #[serde(default)]
    pub output: Option<String>,
    /// Per-module level overrides, e.g. `gunnel_tunnel = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, String>,
}
