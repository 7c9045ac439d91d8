//! CLI override definitions and application logic.

use clap::Parser;

use crate::Config;

/// Flags shared by every tunnel mode.
#[derive(Debug, Clone, Parser, Default)]
pub struct CliOverrides {
    /// Local endpoint, `[host|path][,port]`
    #[arg(short = 'l', long = "local", value_name = "ENDPOINT")]
    pub local: Option<String>,
    /// Remote endpoint, `[host|path][,port]`
    #[arg(short = 'r', long = "remote", value_name = "ENDPOINT")]
    pub remote: Option<String>,
    /// User to run as
    #[arg(short = 'u', long = "user")]
    pub user: Option<String>,
    /// Group to run as
    #[arg(short = 'g', long = "group")]
    pub group: Option<String>,
    /// Serve one connection, then exit
    #[arg(short = 'o', long = "one-shot")]
    pub one_shot: bool,
    /// Do not detach from the terminal
    #[arg(long)]
    pub foreground: bool,
    /// Relay buffer size per direction (bytes)
    #[arg(long)]
    pub buffer_size: Option<usize>,
    /// Relay idle timeout (seconds, 0 = never)
    #[arg(long)]
    pub idle_timeout_secs: Option<u64>,
    /// Outbound connect timeout (seconds, 0 = OS default)
    #[arg(long)]
    pub connect_timeout_secs: Option<u64>,
    /// Listen backlog
    #[arg(long)]
    pub backlog: Option<u32>,
    /// Override log level (trace/debug/info/warn/error)
    #[arg(long)]
    pub log_level: Option<String>,
    /// Log format (pretty/compact/json)
    #[arg(long)]
    pub log_format: Option<String>,
    /// Log output (stderr/stdout/<file>)
    #[arg(long)]
    pub log_output: Option<String>,
}

/// Flags of the TLS-capable modes.
#[derive(Debug, Clone, Parser, Default)]
pub struct TlsOverrides {
    /// Certificate file (PEM)
    #[arg(short = 'c', long = "cert")]
    pub cert: Option<String>,
    /// Private key file (PEM), defaults to the certificate file
    #[arg(short = 'k', long = "key")]
    pub key: Option<String>,
    /// CA chain file (PEM)
    #[arg(short = 'a', long = "ca-file")]
    pub ca: Option<String>,
    /// Cipher policy
    #[arg(short = 'C', long = "ciphers")]
    pub ciphers: Option<String>,
    /// Server name sent to the remote peer
    #[arg(long)]
    pub server_name: Option<String>,
    /// Minimum TLS version (tls12, tls13)
    #[arg(long)]
    pub tls_min_version: Option<String>,
    /// Maximum TLS version (tls12, tls13)
    #[arg(long)]
    pub tls_max_version: Option<String>,
    /// TLS handshake timeout (seconds)
    #[arg(long)]
    pub handshake_timeout_secs: Option<u64>,
}

pub fn apply_overrides(config: &mut Config, overrides: &CliOverrides) {
    if let Some(v) = &overrides.local {
        config.tunnel.local = Some(v.clone());
    }
    if let Some(v) = &overrides.remote {
        config.tunnel.remote = Some(v.clone());
    }
    if let Some(v) = &overrides.user {
        config.identity.user = v.clone();
    }
    if let Some(v) = &overrides.group {
        config.identity.group = v.clone();
    }
    if overrides.one_shot {
        config.tunnel.one_shot = true;
    }
    if overrides.foreground {
        config.tunnel.foreground = true;
    }
    if let Some(v) = overrides.buffer_size {
        config.relay.buffer_size = v;
    }
    if let Some(v) = overrides.idle_timeout_secs {
        config.relay.idle_timeout_secs = v;
    }
    if let Some(v) = overrides.connect_timeout_secs {
        config.relay.connect_timeout_secs = v;
    }
    if let Some(v) = overrides.backlog {
        config.relay.backlog = v;
    }
    if let Some(v) = &overrides.log_level {
        config.logging.level = Some(v.clone());
    }
    if let Some(v) = &overrides.log_format {
        config.logging.format = Some(v.clone());
    }
    if let Some(v) = &overrides.log_output {
        config.logging.output = Some(v.clone());
    }
}

pub fn apply_tls_overrides(config: &mut Config, overrides: &TlsOverrides) {
    if let Some(v) = &overrides.cert {
        config.tls.cert = Some(v.clone());
    }
    if let Some(v) = &overrides.key {
        config.tls.key = Some(v.clone());
    }
    if let Some(v) = &overrides.ca {
        config.tls.ca = Some(v.clone());
    }
    if let Some(v) = &overrides.ciphers {
        config.tls.ciphers = v.clone();
    }
    if let Some(v) = &overrides.server_name {
        config.tls.server_name = Some(v.clone());
    }
    if let Some(v) = &overrides.tls_min_version {
        config.tls.min_version = v.clone();
    }
    if let Some(v) = &overrides.tls_max_version {
        config.tls.max_version = v.clone();
    }
    if let Some(v) = overrides.handshake_timeout_secs {
        config.relay.handshake_timeout_secs = v;
    }
}
