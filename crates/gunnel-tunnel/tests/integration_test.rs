//! End-to-end tunnel tests over loopback.
//!
//! Each test binds a tunnel listener on an ephemeral port, points it at a
//! local echo service and drives the accept loop directly with [`serve`],
//! skipping the privilege transition that `run` performs.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use gunnel_config::{Config, TlsConfig, TlsRole};
use gunnel_core::io::{LegEvent, RelayLeg};
use gunnel_core::{Endpoint, Target};
use gunnel_transport::{Socket, TlsContext, tls_config};
use gunnel_tunnel::listener;
use gunnel_tunnel::{ServeSummary, WorkerContext, serve};
use rustls::pki_types::ServerName;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UnixListener};
use tokio::task::JoinHandle;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tokio_util::sync::CancellationToken;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

struct RunningTunnel {
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<ServeSummary>,
}

impl RunningTunnel {
    async fn stop(self) -> ServeSummary {
        self.shutdown.cancel();
        tokio::time::timeout(TEST_TIMEOUT, self.handle)
            .await
            .expect("accept loop did not stop")
            .unwrap()
    }
}

fn start_tunnel(remote: Target, tls: Option<TlsContext>, one_shot: bool) -> RunningTunnel {
    let bound = listener::bind(&Endpoint::parse("127.0.0.1,0").unwrap(), 5).unwrap();
    let addr = bound.local_addr().unwrap();
    let listener = bound.into_listener().unwrap();
    let ctx = Arc::new(WorkerContext::new(&Config::default(), remote, tls));
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(serve(listener, ctx, one_shot, shutdown.clone()));
    RunningTunnel {
        addr,
        shutdown,
        handle,
    }
}

fn loopback(port: u16) -> Target {
    Target::Network {
        host: Some("127.0.0.1".into()),
        port,
    }
}

async fn echo<S: AsyncRead + AsyncWrite + Unpin>(stream: S) {
    let (mut reader, mut writer) = tokio::io::split(stream);
    let _ = tokio::io::copy(&mut reader, &mut writer).await;
}

async fn start_echo_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(echo(stream));
        }
    });
    port
}

async fn start_tls_echo_server(cfg: &TlsConfig) -> u16 {
    let acceptor = TlsAcceptor::from(Arc::new(tls_config::server_config(cfg).unwrap()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                if let Ok(tls) = acceptor.accept(stream).await {
                    echo(tls).await;
                }
            });
        }
    });
    port
}

/// Self-signed certificate and key bundled in one PEM file.
fn write_bundle(dir: &TempDir) -> String {
    let certified = rcgen::generate_simple_self_signed(vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
    ])
    .unwrap();
    let path = dir.path().join("bundle.pem");
    let pem = format!("{}{}", certified.cert.pem(), certified.key_pair.serialize_pem());
    std::fs::write(&path, pem).unwrap();
    path.to_string_lossy().into_owned()
}

async fn round_trip<S: AsyncRead + AsyncWrite + Unpin>(stream: &mut S, payload: &[u8]) {
    stream.write_all(payload).await.unwrap();
    let mut buf = vec![0u8; payload.len()];
    tokio::time::timeout(TEST_TIMEOUT, stream.read_exact(&mut buf))
        .await
        .expect("echo timed out")
        .unwrap();
    assert_eq!(buf, payload);
}

#[tokio::test]
async fn test_plain_to_plain_relay() {
    let echo_port = start_echo_server().await;
    let tunnel = start_tunnel(loopback(echo_port), None, false);

    let mut client = TcpStream::connect(tunnel.addr).await.unwrap();
    round_trip(&mut client, b"EHLO gunnel\r\n").await;
    round_trip(&mut client, &[0x5a; 8192]).await;

    // A second concurrent client gets its own relay.
    let mut other = TcpStream::connect(tunnel.addr).await.unwrap();
    round_trip(&mut other, b"QUIT\r\n").await;

    drop(client);
    drop(other);
    let summary = tunnel.stop().await;
    assert_eq!(summary.accepted, 2);
    assert_eq!(summary.spawned, 2);
    assert_eq!(summary.connect_failures, 0);
}

#[tokio::test]
async fn test_one_shot_serves_single_connection() {
    let echo_port = start_echo_server().await;
    let tunnel = start_tunnel(loopback(echo_port), None, true);
    let addr = tunnel.addr;

    let mut client = TcpStream::connect(addr).await.unwrap();
    round_trip(&mut client, b"once").await;
    drop(client);

    // The loop drains the single relay and returns without being cancelled.
    let summary = tokio::time::timeout(TEST_TIMEOUT, tunnel.handle)
        .await
        .expect("one-shot loop did not finish")
        .unwrap();
    assert_eq!(summary.spawned, 1);
    assert_eq!(summary.accepted, 1);

    // The listening socket is gone.
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_remote_failure_keeps_listener_serving() {
    let dead_port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let tunnel = start_tunnel(loopback(dead_port), None, false);

    for _ in 0..2 {
        let mut client = TcpStream::connect(tunnel.addr).await.unwrap();
        let mut buf = [0u8; 1];
        let n = tokio::time::timeout(TEST_TIMEOUT, client.read(&mut buf))
            .await
            .expect("inbound side was not closed")
            .unwrap_or(0);
        assert_eq!(n, 0);
    }

    let summary = tunnel.stop().await;
    assert_eq!(summary.accepted, 2);
    assert_eq!(summary.connect_failures, 2);
    assert_eq!(summary.spawned, 0);
}

#[tokio::test]
async fn test_tls_to_plain() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = write_bundle(&dir);
    let echo_port = start_echo_server().await;

    let server_cfg = TlsConfig {
        cert: Some(bundle.clone()),
        ..TlsConfig::default()
    };
    let tls = TlsContext::new(TlsRole::Server, &server_cfg, None).unwrap();
    let tunnel = start_tunnel(loopback(echo_port), Some(tls), false);

    let client_cfg = TlsConfig {
        ca: Some(bundle),
        ..TlsConfig::default()
    };
    let connector = TlsConnector::from(Arc::new(tls_config::client_config(&client_cfg).unwrap()));
    let tcp = TcpStream::connect(tunnel.addr).await.unwrap();
    let mut tls_stream = connector
        .connect(ServerName::try_from("localhost").unwrap(), tcp)
        .await
        .unwrap();

    round_trip(&mut tls_stream, b"a001 CAPABILITY\r\n").await;
    tls_stream.shutdown().await.unwrap();
    drop(tls_stream);

    let summary = tunnel.stop().await;
    assert_eq!(summary.spawned, 1);
    assert_eq!(summary.worker_failures, 0);
}

#[tokio::test]
async fn test_tls_handshake_failure_is_contained() {
    let dir = tempfile::tempdir().unwrap();
    let echo_port = start_echo_server().await;
    let server_cfg = TlsConfig {
        cert: Some(write_bundle(&dir)),
        ..TlsConfig::default()
    };
    let tls = TlsContext::new(TlsRole::Server, &server_cfg, None).unwrap();
    let tunnel = start_tunnel(loopback(echo_port), Some(tls), false);

    // Plaintext where a ClientHello is expected.
    let mut client = TcpStream::connect(tunnel.addr).await.unwrap();
    client.write_all(b"GET / HTTP/1.0\r\n\r\n").await.unwrap();
    let mut buf = Vec::new();
    let _ = tokio::time::timeout(TEST_TIMEOUT, client.read_to_end(&mut buf)).await;

    // The tunnel keeps accepting.
    let mut again = TcpStream::connect(tunnel.addr).await.unwrap();
    again.write_all(b"still not TLS").await.unwrap();
    let _ = tokio::time::timeout(TEST_TIMEOUT, again.read_to_end(&mut buf)).await;

    let summary = tunnel.stop().await;
    assert_eq!(summary.spawned, 2);
    assert_eq!(summary.worker_failures, 2);
}

#[tokio::test]
async fn test_plain_to_tls() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = write_bundle(&dir);
    let server_cfg = TlsConfig {
        cert: Some(bundle.clone()),
        ..TlsConfig::default()
    };
    let tls_port = start_tls_echo_server(&server_cfg).await;

    let client_cfg = TlsConfig {
        ca: Some(bundle),
        server_name: Some("localhost".into()),
        ..TlsConfig::default()
    };
    let tls = TlsContext::new(TlsRole::Client, &client_cfg, Some("127.0.0.1")).unwrap();
    let tunnel = start_tunnel(loopback(tls_port), Some(tls), false);

    let mut client = TcpStream::connect(tunnel.addr).await.unwrap();
    round_trip(&mut client, b"* OK plaintext in, TLS out\r\n").await;
    drop(client);

    let summary = tunnel.stop().await;
    assert_eq!(summary.spawned, 1);
}

#[tokio::test]
async fn test_local_socket_remote() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("echo.sock");
    let unix = UnixListener::bind(&path).unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = unix.accept().await {
            tokio::spawn(echo(stream));
        }
    });

    let remote = Endpoint::parse(path.to_str().unwrap())
        .unwrap()
        .target()
        .unwrap();
    assert_eq!(remote, Target::Local(path.clone()));
    let tunnel = start_tunnel(remote, None, false);

    let mut client = TcpStream::connect(tunnel.addr).await.unwrap();
    round_trip(&mut client, b"over a local socket").await;
    drop(client);
    tunnel.stop().await;
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_urgent_data_crosses_tunnel_expedited() {
    let remote_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let remote_port = remote_listener.local_addr().unwrap().port();
    let tunnel = start_tunnel(loopback(remote_port), None, false);

    let client = TcpStream::connect(tunnel.addr).await.unwrap();
    let (accepted, _) = remote_listener.accept().await.unwrap();
    let mut remote = Socket::from_tcp(accepted).unwrap();

    socket2::SockRef::from(&client)
        .send_out_of_band(b"!")
        .unwrap();

    let mut buf = [0u8; 16];
    let event = tokio::time::timeout(TEST_TIMEOUT, remote.next_event(&mut buf))
        .await
        .expect("no urgent data arrived")
        .unwrap();
    assert_eq!(event, LegEvent::Urgent(1));
    assert_eq!(buf[0], b'!');

    drop(client);
    assert_eq!(
        tokio::time::timeout(TEST_TIMEOUT, remote.next_event(&mut buf))
            .await
            .unwrap()
            .unwrap(),
        LegEvent::Closed
    );
    tunnel.stop().await;
}
