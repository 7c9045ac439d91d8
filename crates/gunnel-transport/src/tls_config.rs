//! rustls configuration built from the `[tls]` settings.
//!
//! Both roles share the same version bounds and cipher policy handling.
//! The server role loads its certificate chain and key, and requests (but
//! does not require) client certificates when a CA file is configured. The
//! client role trusts the CA file alone when one is given, the bundled web
//! PKI roots otherwise, and presents a client certificate when configured.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use gunnel_config::TlsConfig;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, SupportedProtocolVersion};
use tracing::{info, warn};

use crate::error::TransportError;

/// Policies that keep the engine's own cipher suite selection.
const ENGINE_DEFAULT_POLICIES: [&str; 2] = ["NORMAL", "DEFAULT"];

static TLS12_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS12];
static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];
static TLS12_AND_13: &[&SupportedProtocolVersion] =
    &[&rustls::version::TLS12, &rustls::version::TLS13];

/// Build the server-side configuration for terminating TLS.
pub fn server_config(cfg: &TlsConfig) -> Result<rustls::ServerConfig, TransportError> {
    let cert_path = cfg
        .cert
        .as_deref()
        .ok_or_else(|| TransportError::Config("no certificate configured".into()))?;
    let key_path = cfg.key_path().unwrap_or(cert_path);

    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;
    let provider = crypto_provider(&cfg.ciphers)?;

    let builder = rustls::ServerConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(protocol_versions(&cfg.min_version, &cfg.max_version))
        .map_err(|e| TransportError::Config(format!("TLS version error: {}", e)))?;

    let config = if let Some(ca_path) = &cfg.ca {
        let roots = load_root_store(ca_path)?;
        let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
            .allow_unauthenticated()
            .build()
            .map_err(|e| TransportError::Config(format!("client verifier error: {}", e)))?;
        builder
            .with_client_cert_verifier(verifier)
            .with_single_cert(certs, key)?
    } else {
        builder.with_no_client_auth().with_single_cert(certs, key)?
    };

    info!(
        min_version = %cfg.min_version,
        max_version = %cfg.max_version,
        client_auth = cfg.ca.is_some(),
        ciphers = %cfg.ciphers,
        "TLS server context ready"
    );
    Ok(config)
}

/// Build the client-side configuration for originating TLS.
pub fn client_config(cfg: &TlsConfig) -> Result<rustls::ClientConfig, TransportError> {
    let provider = crypto_provider(&cfg.ciphers)?;

    let roots = match &cfg.ca {
        Some(ca_path) => load_root_store(ca_path)?,
        None => RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        },
    };

    let builder = rustls::ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(protocol_versions(&cfg.min_version, &cfg.max_version))
        .map_err(|e| TransportError::Config(format!("TLS version error: {}", e)))?
        .with_root_certificates(roots);

    let config = match &cfg.cert {
        Some(cert_path) => {
            let key_path = cfg.key_path().unwrap_or(cert_path);
            builder.with_client_auth_cert(load_certs(cert_path)?, load_private_key(key_path)?)?
        }
        None => builder.with_no_client_auth(),
    };

    info!(
        min_version = %cfg.min_version,
        max_version = %cfg.max_version,
        custom_ca = cfg.ca.is_some(),
        client_cert = cfg.cert.is_some(),
        ciphers = %cfg.ciphers,
        "TLS client context ready"
    );
    Ok(config)
}

fn protocol_versions(min: &str, max: &str) -> &'static [&'static SupportedProtocolVersion] {
    match (min, max) {
        ("tls13", "tls13") => TLS13_ONLY,
        ("tls12", "tls12") => TLS12_ONLY,
        _ => TLS12_AND_13,
    }
}

/// Crypto provider restricted to the suites named by `policy`.
///
/// `policy` is either one of the engine default keywords or a list of suite
/// names separated by `:` or `,`. Unknown names are logged and skipped; a
/// list with no known name at all is an error.
pub fn crypto_provider(policy: &str) -> Result<Arc<CryptoProvider>, TransportError> {
    let default_provider = CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()));

    let policy = policy.trim();
    if ENGINE_DEFAULT_POLICIES
        .iter()
        .any(|p| p.eq_ignore_ascii_case(policy))
    {
        return Ok(default_provider);
    }

    let all_suites = &default_provider.cipher_suites;
    let mut selected = Vec::new();
    let mut not_found = Vec::new();

    for name in policy.split([':', ',']).map(str::trim).filter(|n| !n.is_empty()) {
        if let Some(suite) = all_suites.iter().find(|s| {
            let debug_name = format!("{:?}", s.suite());
            debug_name.eq_ignore_ascii_case(name) || debug_name.ends_with(name)
        }) {
            if !selected.contains(suite) {
                selected.push(*suite);
            }
        } else {
            not_found.push(name);
        }
    }

    if !not_found.is_empty() {
        warn!(
            not_found = ?not_found,
            available = ?all_suites.iter().map(|s| format!("{:?}", s.suite())).collect::<Vec<_>>(),
            "some cipher suites not found"
        );
    }

    if selected.is_empty() {
        return Err(TransportError::Config(format!(
            "no valid cipher suites in policy '{}'",
            policy
        )));
    }

    Ok(Arc::new(CryptoProvider {
        cipher_suites: selected,
        ..(*default_provider).clone()
    }))
}

/// Load certificates from a PEM file.
pub fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let mut reader = BufReader::new(File::open(path)?);
    let certs = rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(TransportError::Config(format!(
            "no certificates found in {}",
            path
        )));
    }
    Ok(certs)
}

/// Load the first private key from a PEM file.
pub fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>, TransportError> {
    let mut reader = BufReader::new(File::open(path)?);
    loop {
        match rustls_pemfile::read_one(&mut reader)? {
            Some(rustls_pemfile::Item::Pkcs8Key(key)) => return Ok(PrivateKeyDer::Pkcs8(key)),
            Some(rustls_pemfile::Item::Pkcs1Key(key)) => return Ok(PrivateKeyDer::Pkcs1(key)),
            Some(rustls_pemfile::Item::Sec1Key(key)) => return Ok(PrivateKeyDer::Sec1(key)),
            Some(_) => continue,
            None => break,
        }
    }
    Err(TransportError::Config(format!(
        "no private key found in {}",
        path
    )))
}

fn load_root_store(path: &str) -> Result<RootCertStore, TransportError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots
            .add(cert)
            .map_err(|e| TransportError::Config(format!("failed to add CA cert: {}", e)))?;
    }
    Ok(roots)
}
