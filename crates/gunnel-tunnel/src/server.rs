//! The accept loop.
//!
//! Listening: accept one connection. Connecting: open the outbound side; a
//! failure only costs that connection. Spawned: the pair moves into a worker
//! task and the loop keeps nothing of it. Draining: on shutdown, or after
//! the first spawn in one-shot mode, the listener is closed and the loop
//! waits for every in-flight worker to finish on its own.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use gunnel_core::io::RelayLeg;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::connector::connect;
use crate::listener::Listener;
use crate::worker::{self, WorkerContext};

/// Pause after an accept error that is not transient, so a persistent
/// condition (e.g. descriptor exhaustion) does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// What the loop did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeSummary {
    /// Connections accepted.
    pub accepted: u64,
    /// Connections dropped because the remote could not be reached.
    pub connect_failures: u64,
    /// Workers spawned.
    pub spawned: u64,
    /// Workers that ended with an error or panicked.
    pub worker_failures: u64,
}

/// Serve connections until shutdown (or after one connection in one-shot mode).
pub async fn serve(
    listener: Listener,
    ctx: Arc<WorkerContext>,
    one_shot: bool,
    shutdown: CancellationToken,
) -> ServeSummary {
    let mut workers: JoinSet<bool> = JoinSet::new();
    let mut summary = ServeSummary::default();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("shutdown requested");
                break;
            }
            Some(done) = workers.join_next(), if !workers.is_empty() => {
                reap(done, &mut summary);
                while let Some(done) = workers.try_join_next() {
                    reap(done, &mut summary);
                }
            }
            accepted = listener.accept() => {
                let (mut inbound, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) if is_transient(&e) => continue,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        continue;
                    }
                };
                summary.accepted += 1;
                let id = summary.accepted;
                debug!(id, peer = %peer, "accepted");

                let outbound = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        inbound.close().await;
                        info!("shutdown requested");
                        break;
                    }
                    result = connect(&ctx.remote, ctx.connect_timeout) => result,
                };
                let outbound = match outbound {
                    Ok(socket) => socket,
                    Err(e) => {
                        warn!(
                            id,
                            peer = %peer,
                            error = %e,
                            error_type = e.error_type(),
                            "remote connect failed"
                        );
                        inbound.close().await;
                        summary.connect_failures += 1;
                        continue;
                    }
                };

                let ctx = ctx.clone();
                workers.spawn(
                    async move {
                        match worker::run(inbound, outbound, &ctx).await {
                            Ok((end, stats)) => {
                                info!(
                                    ?end,
                                    inbound_bytes = stats.inbound_bytes,
                                    outbound_bytes = stats.outbound_bytes,
                                    urgent_bytes = stats.urgent_bytes,
                                    "relay finished"
                                );
                                true
                            }
                            Err(e) => {
                                warn!(error = %e, error_type = e.error_type(), "relay failed");
                                false
                            }
                        }
                    }
                    .instrument(info_span!("relay", id, peer = %peer)),
                );
                summary.spawned += 1;

                if one_shot {
                    info!("one-shot connection spawned, no further accepts");
                    break;
                }
            }
        }
    }

    drop(listener);
    if !workers.is_empty() {
        info!(in_flight = workers.len(), "draining relays");
    }
    while let Some(done) = workers.join_next().await {
        reap(done, &mut summary);
    }
    info!(
        accepted = summary.accepted,
        spawned = summary.spawned,
        connect_failures = summary.connect_failures,
        worker_failures = summary.worker_failures,
        "accept loop stopped"
    );
    summary
}

fn reap(done: Result<bool, JoinError>, summary: &mut ServeSummary) {
    match done {
        Ok(true) => {}
        Ok(false) => summary.worker_failures += 1,
        Err(e) => {
            error!(error = %e, "relay worker panicked");
            summary.worker_failures += 1;
        }
    }
}

/// Accept outcomes that only concern the connection being accepted.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

/// Wait for Ctrl+C or SIGTERM.
pub async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Run [`serve`] until Ctrl+C/SIGTERM.
pub async fn serve_until_signalled(
    listener: Listener,
    ctx: Arc<WorkerContext>,
    one_shot: bool,
) -> ServeSummary {
    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();

    let signals = tokio::spawn(async move {
        shutdown_signal_handler().await;
        shutdown_signal.cancel();
    });

    let summary = serve(listener, ctx, one_shot, shutdown).await;
    signals.abort();
    summary
}
