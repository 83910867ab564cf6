//! Ping responder over real UDP sockets on localhost.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::task::JoinHandle;

use mavping::error::{Error, Result};
use mavping::protocol::{FrameCodec, Inbound, MessageData, PingMessage};
use mavping::responder::{ResponderService, ResponderState, ResponderStats, ShutdownReason};
use mavping::signals::SignalHandler;
use mavping::transport::{MavConnection, TransportConfig, UdpTransport};
use mavping::types::EndpointIdentity;

const RESPONDER: EndpointIdentity = EndpointIdentity {
    system_id: 1,
    component_id: 1,
};
const CLIENT: EndpointIdentity = EndpointIdentity {
    system_id: 12,
    component_id: 1,
};

type ServiceHandle = JoinHandle<(Result<ShutdownReason>, ResponderStats, ResponderState)>;

fn start_responder(handler: &SignalHandler) -> (SocketAddr, ServiceHandle) {
    let config = TransportConfig::default();
    let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), &config).unwrap();
    let addr = transport.local_addr().unwrap();

    let connection = MavConnection::new(
        Box::new(transport),
        FrameCodec::standard(),
        RESPONDER,
        config.read_buffer_size,
    );
    let mut service = ResponderService::new(connection);
    let shutdown = handler.shutdown_signal();

    let handle = tokio::spawn(async move {
        let result = service.run(shutdown).await;
        (result, service.stats(), service.state())
    });
    (addr, handle)
}

async fn client(server: SocketAddr) -> MavConnection {
    let config = TransportConfig::default();
    let transport = UdpTransport::connect(server, &config).await.unwrap();
    MavConnection::new(
        Box::new(transport),
        FrameCodec::standard(),
        CLIENT,
        config.read_buffer_size,
    )
}

#[tokio::test]
async fn test_broadcast_ping_gets_addressed_reply() {
    let handler = SignalHandler::new();
    let (addr, handle) = start_responder(&handler);
    let mut client = client(addr).await;

    client
        .send_message(&PingMessage::new(123_456, 42, 0, 0))
        .await
        .unwrap();

    let inbound = client.recv_frame_timeout(Duration::from_secs(2)).await.unwrap();
    let Inbound::Frame(frame, _) = inbound else {
        panic!("expected a known frame");
    };
    assert_eq!(frame.message_id, PingMessage::ID);
    assert_eq!(frame.system_id, RESPONDER.system_id);
    assert_eq!(frame.component_id, RESPONDER.component_id);

    let reply: PingMessage = frame.decode_message().unwrap();
    assert_eq!(reply.seq, 42);
    assert_eq!(reply.target_system, 12);
    assert_eq!(reply.target_component, 1);

    handler.request_shutdown();
    let (result, stats, state) = handle.await.unwrap();
    assert_eq!(result.unwrap(), ShutdownReason::Cancelled);
    assert_eq!(state, ResponderState::Shutdown);
    assert_eq!(stats.pings_seen, 1);
    assert_eq!(stats.replies_sent, 1);
}

#[tokio::test]
async fn test_addressed_ping_is_ignored() {
    let handler = SignalHandler::new();
    let (addr, handle) = start_responder(&handler);
    let mut client = client(addr).await;

    // Addressed to the responder itself: still not a broadcast, so no answer
    client
        .send_message(&PingMessage::new(0, 7, 1, 1))
        .await
        .unwrap();
    client
        .send_message(&PingMessage::new(0, 8, 0, 1))
        .await
        .unwrap();

    let result = client.recv_frame_timeout(Duration::from_millis(300)).await;
    assert!(matches!(result, Err(Error::Timeout)), "{result:?}");

    // A broadcast afterwards is still answered
    client
        .send_message(&PingMessage::new(0, 9, 0, 0))
        .await
        .unwrap();
    let inbound = client.recv_frame_timeout(Duration::from_secs(2)).await.unwrap();
    let reply: PingMessage = inbound.frame().decode_message().unwrap();
    assert_eq!(reply.seq, 9);

    handler.request_shutdown();
    let (result, stats, _) = handle.await.unwrap();
    assert_eq!(result.unwrap(), ShutdownReason::Cancelled);
    assert_eq!(stats.pings_seen, 3);
    assert_eq!(stats.ignored_pings, 2);
    assert_eq!(stats.replies_sent, 1);
}

#[tokio::test]
async fn test_garbage_between_requests() {
    let handler = SignalHandler::new();
    let (addr, handle) = start_responder(&handler);

    let config = TransportConfig::default();
    let raw = UdpTransport::connect(addr, &config).await.unwrap();
    let mut codec = FrameCodec::standard();

    let mut datagram = vec![0x00, 0x13, 0x37];
    datagram.extend_from_slice(&codec.encode_message(CLIENT, &PingMessage::new(0, 1, 0, 0)));
    mavping::transport::Transport::send(&raw, &datagram).await.unwrap();

    let mut client = MavConnection::new(Box::new(raw), FrameCodec::standard(), CLIENT, 4096);
    let inbound = client.recv_frame_timeout(Duration::from_secs(2)).await.unwrap();
    assert_eq!(inbound.frame().decode_message::<PingMessage>().unwrap().seq, 1);

    handler.request_shutdown();
    let (result, _, _) = handle.await.unwrap();
    assert_eq!(result.unwrap(), ShutdownReason::Cancelled);
}

#[tokio::test]
async fn test_shutdown_before_any_traffic() {
    let handler = SignalHandler::new();
    let (_, handle) = start_responder(&handler);

    tokio::time::sleep(Duration::from_millis(20)).await;
    handler.request_shutdown();

    let (result, stats, state) = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("responder did not stop")
        .unwrap();
    assert_eq!(result.unwrap(), ShutdownReason::Cancelled);
    assert_eq!(state, ResponderState::Shutdown);
    assert_eq!(stats, ResponderStats::default());
}
