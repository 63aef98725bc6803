//! End-to-end sessions over loopback TCP
//!
//! Uses the stock collaborators built from a TOML config.


use integration_harness::{
    KEY, PeerBehavior, PeerStats, eventually, expect_state, serve_connection,
};
use remdesk_client::{
    ErrorKind, NO_ERROR, PresharedKeyVerifier, RuntimeConfig, RuntimeHandle, Services,
    SessionState,
};
use remdesk_protocol::{PeerId, WireMessage};
use remdesk_transport::{FramedTransport, Transport};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::net::TcpListener;

async fn tcp_peer(id: &str, behavior: PeerBehavior) -> (SocketAddr, Arc<PeerStats>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let verifier = Arc::new(PresharedKeyVerifier::new(PeerId::new(id).unwrap(), KEY.to_vec()));
    let stats = Arc::new(PeerStats::default());

    let peer_stats = stats.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            peer_stats.connections.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(serve_connection(
                Box::new(FramedTransport::new(stream)),
                verifier.clone(),
                peer_stats.clone(),
                behavior,
            ));
        }
    });

    (addr, stats)
}

fn runtime_for(peers: &[(&str, SocketAddr)]) -> RuntimeHandle {
    let mut toml = format!(
        "[security]\nclient_id = \"tcp-test\"\npreshared_key = \"{}\"\n\n[transport.peers]\n",
        hex::encode(KEY)
    );
    for (id, addr) in peers {
        toml.push_str(&format!("\"{}\" = \"{}\"\n", id, addr));
    }

    let config = RuntimeConfig::parse(&toml).unwrap();
    let services = Services::from_config(&config).unwrap();
    RuntimeHandle::init(config, services)
}

#[tokio::test]
async fn test_directory_peer_over_tcp() {
    let (addr, stats) = tcp_peer("desk-1", PeerBehavior::Echo).await;
    let runtime = runtime_for(&[("desk-1", addr)]);

    let id = runtime.start_session("desk-1").unwrap();
    expect_state(&runtime, id, SessionState::Active).await;
    assert_eq!(stats.accepted.load(Ordering::SeqCst), 1);

    runtime.stop_session(id).unwrap();
    expect_state(&runtime, id, SessionState::Closed).await;
    eventually(|| stats.closes.load(Ordering::SeqCst) == 1).await;
    assert_eq!(runtime.get_error(id), NO_ERROR);
}

#[tokio::test]
async fn test_host_port_peer_id() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let peer_id = addr.to_string();

    // The verifier expects to be addressed by the same id the client dials
    let verifier = Arc::new(PresharedKeyVerifier::new(
        PeerId::new(peer_id.clone()).unwrap(),
        KEY.to_vec(),
    ));
    let stats = Arc::new(PeerStats::default());
    let peer_stats = stats.clone();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        serve_connection(
            Box::new(FramedTransport::new(stream)),
            verifier,
            peer_stats,
            PeerBehavior::CloseAfterAuth,
        )
        .await;
    });

    let runtime = runtime_for(&[]);
    let id = runtime.start_session(&peer_id).unwrap();
    expect_state(&runtime, id, SessionState::Closed).await;
    assert_eq!(stats.accepted.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.get_error(id), NO_ERROR);
}

#[tokio::test]
async fn test_unknown_directory_name_fails() {
    let runtime = runtime_for(&[]);

    let id = runtime.start_session("not-in-directory").unwrap();
    expect_state(&runtime, id, SessionState::Failed).await;
    assert_eq!(
        runtime.last_error(id).unwrap().kind(),
        ErrorKind::TransportError
    );
}

#[tokio::test]
async fn test_garbage_after_handshake_fails_session() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let verifier = PresharedKeyVerifier::new(PeerId::new("desk-1").unwrap(), KEY.to_vec());

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut transport = FramedTransport::new(stream);
        if let Ok(WireMessage::AuthRequest(request)) = transport.recv_message().await {
            verifier.respond(&request, &mut transport).await.unwrap();
        }
        transport.send(vec![0xde, 0xad, 0xbe, 0xef]).await.unwrap();
        // Keep the socket open so only the bad message can fail the session
        let _ = transport.recv().await;
    });

    let runtime = runtime_for(&[("desk-1", addr)]);
    let id = runtime.start_session("desk-1").unwrap();
    expect_state(&runtime, id, SessionState::Failed).await;
    assert!(runtime.get_error(id).starts_with("TransportError: "));
}
