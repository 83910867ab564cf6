//! TCP transport tests: listener, client, and stream closure handling.

use std::net::SocketAddr;
use std::time::Duration;

use mavping::error::Error;
use mavping::pinger::{Pinger, PingerConfig};
use mavping::protocol::{FrameCodec, Inbound, PingMessage};
use mavping::responder::{ResponderService, ShutdownReason};
use mavping::signals::SignalHandler;
use mavping::transport::{open, MavConnection, TcpTransport, Transport, TransportConfig};
use mavping::types::{Endpoint, EndpointIdentity, PeerIdentity};

fn any_local() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

// ============================================================================
// Plain transport
// ============================================================================

#[tokio::test]
async fn test_tcp_bind_and_connect() {
    let config = TransportConfig::default();
    let acceptor = TcpTransport::bind(any_local(), &config).unwrap();
    let addr = acceptor.local_addr().unwrap();
    assert!(addr.port() > 0);

    let server = tokio::spawn(async move { acceptor.accept_one().await.unwrap() });
    let client = TcpTransport::connect(addr, &config).await.unwrap();
    let server = server.await.unwrap();

    assert_eq!(client.transport_type(), "tcp");
    assert!(client.is_connected());
    assert_eq!(client.remote_addr(), addr);
    assert_eq!(server.remote_addr(), client.local_addr());

    client.send(b"mavlink").await.unwrap();
    let mut buf = [0u8; 16];
    let n = server.recv(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"mavlink");
}

#[tokio::test]
async fn test_tcp_connect_refused() {
    // Grab a free port, then release it
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();

    let result = TcpTransport::connect(addr, &TransportConfig::default()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_tcp_peer_close_reads_zero() {
    let config = TransportConfig::default();
    let acceptor = TcpTransport::bind(any_local(), &config).unwrap();
    let addr = acceptor.local_addr().unwrap();

    let server = tokio::spawn(async move { acceptor.accept_one().await.unwrap() });
    let client = TcpTransport::connect(addr, &config).await.unwrap();
    let server = server.await.unwrap();

    client.close().await.unwrap();
    let mut buf = [0u8; 16];
    assert_eq!(server.recv(&mut buf).await.unwrap(), 0);
    assert!(!server.is_connected());
}

// ============================================================================
// Framed connections
// ============================================================================

#[tokio::test]
async fn test_responder_over_tcpin_until_client_leaves() {
    let config = TransportConfig::default();
    let acceptor = TcpTransport::bind(any_local(), &config).unwrap();
    let addr = acceptor.local_addr().unwrap();

    let handler = SignalHandler::new();
    let shutdown = handler.shutdown_signal();
    let server = tokio::spawn(async move {
        let transport = acceptor.accept_one().await.unwrap();
        let connection = MavConnection::new(
            Box::new(transport),
            FrameCodec::standard(),
            EndpointIdentity::new(1, 1),
            4096,
        );
        let mut service = ResponderService::new(connection);
        let reason = service.run(shutdown).await.unwrap();
        (reason, service.stats())
    });

    let endpoint = Endpoint::TcpOut {
        addr: addr.to_string(),
    };
    let mut client = MavConnection::open(
        &endpoint,
        FrameCodec::standard(),
        EndpointIdentity::new(12, 1),
        &config,
    )
    .await
    .unwrap();

    client.send_message(&PingMessage::new(0, 42, 0, 0)).await.unwrap();
    let Inbound::Frame(frame, _) = client.recv_frame_timeout(Duration::from_secs(2)).await.unwrap()
    else {
        panic!("expected ping reply");
    };
    let reply: PingMessage = frame.decode_message().unwrap();
    assert_eq!((reply.seq, reply.target_system, reply.target_component), (42, 12, 1));

    client.close().await.unwrap();
    drop(client);

    let (reason, stats) = tokio::time::timeout(Duration::from_secs(2), server)
        .await
        .expect("responder kept running after close")
        .unwrap();
    assert_eq!(reason, ShutdownReason::TransportClosed);
    assert_eq!(stats.replies_sent, 1);
}

#[tokio::test]
async fn test_recv_frame_reports_closure() {
    let config = TransportConfig::default();
    let acceptor = TcpTransport::bind(any_local(), &config).unwrap();
    let addr = acceptor.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let transport = acceptor.accept_one().await.unwrap();
        transport.close().await.unwrap();
    });

    let transport = open(&Endpoint::TcpOut { addr: addr.to_string() }, &config)
        .await
        .unwrap();
    let mut connection =
        MavConnection::new(transport, FrameCodec::standard(), EndpointIdentity::default(), 4096);
    server.await.unwrap();

    let result = connection.recv_frame().await;
    assert!(matches!(result, Err(Error::TransportClosed)), "{result:?}");
}

#[tokio::test]
async fn test_pinger_stops_when_stream_closes() {
    let config = TransportConfig::default();
    let acceptor = TcpTransport::bind(any_local(), &config).unwrap();
    let addr = acceptor.local_addr().unwrap();

    // Read the first request, then hang up
    let server = tokio::spawn(async move {
        let transport = acceptor.accept_one().await.unwrap();
        let mut buf = [0u8; 64];
        let n = transport.recv(&mut buf).await.unwrap();
        assert!(n > 0);
        transport.close().await.unwrap();
    });

    let connection = MavConnection::open(
        &Endpoint::TcpOut {
            addr: addr.to_string(),
        },
        FrameCodec::standard(),
        EndpointIdentity::new(255, 190),
        &config,
    )
    .await
    .unwrap();
    let mut pinger = Pinger::new(
        connection,
        PingerConfig {
            count: Some(5),
            timeout: Duration::from_secs(2),
            ..PingerConfig::new(PeerIdentity::new(1, 1))
        },
    );

    let handler = SignalHandler::new();
    let summary = pinger.run(handler.shutdown_signal(), |_| {}).await.unwrap();
    server.await.unwrap();

    assert_eq!(summary.transmitted, 1);
    assert_eq!(summary.received, 0);
    assert_eq!(summary.lost, 0);
}
