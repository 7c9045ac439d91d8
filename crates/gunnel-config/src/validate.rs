//! Configuration validation logic.
//!
//! Endpoint strings are not checked here; they are parsed by
//! `gunnel_core::Endpoint`, which reports its own error kind.

use crate::loader::ConfigError;
use crate::{Config, TlsRole, TunnelMode};

const TLS_VERSIONS: [&str; 2] = ["tls12", "tls13"];
const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

pub fn validate_config(config: &Config, mode: TunnelMode) -> Result<(), ConfigError> {
    if config.identity.user.trim().is_empty() {
        return Err(ConfigError::Validation("identity.user is empty".into()));
    }
    if config.identity.group.trim().is_empty() {
        return Err(ConfigError::Validation("identity.group is empty".into()));
    }
    if config.relay.buffer_size == 0 {
        return Err(ConfigError::Validation(
            "relay.buffer_size must be > 0".into(),
        ));
    }
    if config.relay.backlog == 0 {
        return Err(ConfigError::Validation("relay.backlog must be > 0".into()));
    }
    if let Some(format) = &config.logging.format
        && !LOG_FORMATS.contains(&format.as_str())
    {
        return Err(ConfigError::Validation(format!(
            "logging.format must be one of: {:?}",
            LOG_FORMATS
        )));
    }

    match mode.tls_role() {
        Some(role) => validate_tls(config, role),
        None => Ok(()),
    }
}

fn validate_tls(config: &Config, role: TlsRole) -> Result<(), ConfigError> {
    let tls = &config.tls;

    if role == TlsRole::Server && tls.cert.as_deref().is_none_or(|c| c.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "tls.cert is required to terminate TLS".into(),
        ));
    }
    if tls.key.is_some() && tls.cert.is_none() {
        return Err(ConfigError::Validation(
            "tls.key given without tls.cert".into(),
        ));
    }
    if config.relay.handshake_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "relay.handshake_timeout_secs must be > 0".into(),
        ));
    }
    if !TLS_VERSIONS.contains(&tls.min_version.as_str()) {
        return Err(ConfigError::Validation(format!(
            "tls.min_version must be one of: {:?}",
            TLS_VERSIONS
        )));
    }
    if !TLS_VERSIONS.contains(&tls.max_version.as_str()) {
        return Err(ConfigError::Validation(format!(
            "tls.max_version must be one of: {:?}",
            TLS_VERSIONS
        )));
    }
    if tls.min_version == "tls13" && tls.max_version == "tls12" {
        return Err(ConfigError::Validation(
            "tls.min_version cannot be greater than tls.max_version".into(),
        ));
    }
    if tls.ciphers.trim().is_empty() {
        return Err(ConfigError::Validation("tls.ciphers is empty".into()));
    }
    Ok(())
}
