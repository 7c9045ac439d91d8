//! Mode arguments and the startup sequence.
//!
//! Startup is synchronous up to the moment the identity is dropped: config,
//! probe, endpoints, TLS context and the listening socket are all prepared
//! while the process is still single-threaded, then the runtime is built.

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Args;
use gunnel_config::{
    CliOverrides, Config, ConfigError, LoggingConfig, TlsOverrides, TunnelMode,
    apply_overrides, apply_tls_overrides, load_config, validate_config,
};
use gunnel_core::Endpoint;
use gunnel_transport::TlsContext;
use tracing::info;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::daemon;
use crate::error::TunnelError;
use crate::listener;
use crate::privilege::{self, Identity};
use crate::server;
use crate::worker::WorkerContext;

/// Arguments shared by every mode.
#[derive(Args, Debug, Clone, Default)]
pub struct TunnelArgs {
    /// Config file path (json/jsonc/yaml/toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: CliOverrides,

    /// Show usage and the active settings, then exit
    #[arg(short = 'h', long = "help")]
    pub help: bool,
}

/// Arguments of the TLS-capable modes.
#[derive(Args, Debug, Clone, Default)]
pub struct TlsTunnelArgs {
    #[command(flatten)]
    pub tunnel: TunnelArgs,

    #[command(flatten)]
    pub tls: TlsOverrides,
}

/// Build the effective configuration: file, then command line overrides.
pub fn resolve_config(
    args: &TunnelArgs,
    tls: Option<&TlsOverrides>,
) -> Result<Config, TunnelError> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    apply_overrides(&mut config, &args.overrides);
    if let Some(tls) = tls {
        apply_tls_overrides(&mut config, tls);
    }
    Ok(config)
}

/// Run one tunnel mode until it stops.
pub fn run(
    mode: TunnelMode,
    args: &TunnelArgs,
    tls: Option<&TlsOverrides>,
) -> Result<(), TunnelError> {
    let config = resolve_config(args, tls)?;
    if args.help {
        return Err(TunnelError::Usage(usage(mode, &config)));
    }
    validate_config(&config, mode)?;
    init_tracing(&config.logging)?;

    let identity = Identity::lookup(&config.identity.user, &config.identity.group)?;
    privilege::probe(&identity)?;

    let local = Endpoint::parse_opt(config.tunnel.local.as_deref())?;
    let remote = Endpoint::parse_opt(config.tunnel.remote.as_deref())?;
    let remote_target = remote.target()?;

    let tls_ctx = match mode.tls_role() {
        Some(role) => Some(
            TlsContext::new(role, &config.tls, remote.host()).map_err(TunnelError::TlsContext)?,
        ),
        None => None,
    };

    let bound = listener::bind(&local, config.relay.backlog)?;
    info!(
        %mode,
        local = %bound,
        remote = %remote_target,
        one_shot = config.tunnel.one_shot,
        "tunnel ready"
    );

    daemon::commit(&identity, config.tunnel.foreground)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let listener = bound.into_listener()?;
        let ctx = Arc::new(WorkerContext::new(&config, remote_target, tls_ctx));
        server::serve_until_signalled(listener, ctx, config.tunnel.one_shot).await;
        Ok::<(), TunnelError>(())
    })
}

/// Usage line plus the settings that would be used.
pub fn usage(mode: TunnelMode, config: &Config) -> String {
    fn or_none(value: Option<&str>) -> &str {
        value.filter(|v| !v.is_empty()).unwrap_or("none")
    }

    let mut out = String::new();
    let _ = write!(
        out,
        "Usage: {} {} -l [host|path,]port -r [host|path,]port [-u user] [-g group] [-o]",
        gunnel_core::PROJECT_NAME,
        mode
    );
    if mode.tls_role().is_some() {
        out.push_str("\n\t\t[-c certfile] [-a cafile] [-k keyfile] [-C cipher-policy]");
    }
    out.push_str("\n\nActive settings:\n");

    let _ = writeln!(out, "\tProcess owner:   {}", config.identity.user);
    let _ = writeln!(out, "\tProcess group:   {}", config.identity.group);
    let _ = writeln!(out, "\tLocal port:      {}", or_none(config.tunnel.local.as_deref()));
    let _ = writeln!(out, "\tRemote port:     {}", or_none(config.tunnel.remote.as_deref()));
    let _ = writeln!(out, "\tOne shot server: {}", config.tunnel.one_shot);
    if mode.tls_role().is_some() {
        let tls = &config.tls;
        let _ = writeln!(out, "\tCertificate:     {}", or_none(tls.cert.as_deref()));
        let _ = writeln!(out, "\tKey file:        {}", or_none(tls.key_path()));
        let _ = writeln!(out, "\tCA-chain:        {}", or_none(tls.ca.as_deref()));
        let _ = writeln!(out, "\tCipher policy:   {}", tls.ciphers);
    }
    out
}

/// Install the global subscriber.
///
/// A log file is opened here, before the identity is dropped, so it stays
/// writable afterwards.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), TunnelError> {
    let base_level = config.level.as_deref().unwrap_or("info");
    let mut filter_str = base_level.to_string();
    for (module, level) in &config.filters {
        filter_str.push(',');
        filter_str.push_str(module);
        filter_str.push('=');
        filter_str.push_str(level);
    }
    let filter = EnvFilter::try_new(&filter_str).unwrap_or_else(|_| EnvFilter::new("info"));

    let (writer, ansi) = match config.output.as_deref().unwrap_or("stderr") {
        "stderr" => (BoxMakeWriter::new(io::stderr), true),
        "stdout" => (BoxMakeWriter::new(io::stdout), true),
        path => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| ConfigError::Io {
                    path: PathBuf::from(path),
                    source,
                })?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format.as_deref().unwrap_or("pretty") {
        "json" => registry
            .with(fmt::layer().json().with_writer(writer))
            .try_init(),
        "compact" => registry
            .with(fmt::layer().compact().with_ansi(ansi).with_writer(writer))
            .try_init(),
        _ => registry
            .with(fmt::layer().with_ansi(ansi).with_writer(writer))
            .try_init(),
    };
    if result.is_err() {
        // A subscriber is already installed (embedding harness); keep it.
        tracing::debug!("global subscriber already set");
    }
    Ok(())
}
