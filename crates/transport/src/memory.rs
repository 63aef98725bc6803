//! In-process transport
//!
//! `MemoryNetwork` lets a peer `bind` an identifier and accept connections,
//! while the same network acts as a `Connector` for clients. Useful for tests
//! and for embedding a peer in the same process.

use crate::{Connector, Transport, TransportError};
use async_trait::async_trait;
use dashmap::DashMap;
use remdesk_protocol::PeerId;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace};

/// One end of an in-memory connection
pub struct MemoryTransport {
    tx: Option<UnboundedSender<Vec<u8>>>,
    rx: UnboundedReceiver<Vec<u8>>,
}

impl MemoryTransport {
    /// Create a connected pair
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(a_tx),
                rx: b_rx,
            },
            Self {
                tx: Some(b_tx),
                rx: a_rx,
            },
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, message: Vec<u8>) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::ConnectionClosed)?;
        trace!("Sending in-memory message: {} bytes", message.len());
        tx.send(message).map_err(|_| TransportError::ConnectionClosed)
    }

    async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        self.rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        Ok(())
    }
}

/// Accepts connections for one bound peer id
pub struct MemoryListener {
    peer: PeerId,
    incoming: UnboundedReceiver<MemoryTransport>,
}

impl MemoryListener {
    /// Wait for the next connection; `None` once unbound
    pub async fn accept(&mut self) -> Option<MemoryTransport> {
        self.incoming.recv().await
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }
}

/// Registry of in-memory peers
#[derive(Default)]
pub struct MemoryNetwork {
    /// Map PeerId -> listener queue
    listeners: DashMap<PeerId, UnboundedSender<MemoryTransport>>,
}

impl MemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Start accepting connections for `peer`, replacing any earlier binding
    pub fn bind(&self, peer: &PeerId) -> MemoryListener {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.insert(peer.clone(), tx);
        debug!("Bound in-memory peer {}", peer);
        MemoryListener {
            peer: peer.clone(),
            incoming: rx,
        }
    }

    /// Stop accepting connections for `peer`
    pub fn unbind(&self, peer: &PeerId) {
        self.listeners.remove(peer);
    }

    /// Get number of bound peers
    pub fn count(&self) -> usize {
        self.listeners.len()
    }
}

#[async_trait]
impl Connector for MemoryNetwork {
    async fn connect(&self, peer: &PeerId) -> Result<Box<dyn Transport>, TransportError> {
        let listener = self
            .listeners
            .get(peer)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                TransportError::ConnectionFailed(format!("peer {} is not reachable", peer))
            })?;

        let (local, remote) = MemoryTransport::pair();
        listener.send(remote).map_err(|_| {
            TransportError::ConnectionFailed(format!("peer {} stopped listening", peer))
        })?;

        trace!("Connected in-memory to {}", peer);
        Ok(Box::new(local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_and_exchange() {
        let network = MemoryNetwork::new();
        let peer = PeerId::new("peer-1").unwrap();
        let mut listener = network.bind(&peer);

        let mut client = network.connect(&peer).await.unwrap();
        let mut server = listener.accept().await.unwrap();

        client.send(b"hello".to_vec()).await.unwrap();
        assert_eq!(server.recv().await.unwrap(), b"hello");

        server.send(b"world".to_vec()).await.unwrap();
        assert_eq!(client.recv().await.unwrap(), b"world");
    }

    #[tokio::test]
    async fn test_unbound_peer_unreachable() {
        let network = MemoryNetwork::new();
        let peer = PeerId::new("nobody").unwrap();

        assert!(matches!(
            network.connect(&peer).await,
            Err(TransportError::ConnectionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_close_is_seen_by_remote() {
        let (mut a, mut b) = MemoryTransport::pair();
        a.close().await.unwrap();

        assert!(matches!(b.recv().await, Err(TransportError::ConnectionClosed)));
        assert!(matches!(
            a.send(vec![1]).await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_unbind() {
        let network = MemoryNetwork::new();
        let peer = PeerId::new("peer-2").unwrap();
        let _listener = network.bind(&peer);
        assert_eq!(network.count(), 1);

        network.unbind(&peer);
        assert_eq!(network.count(), 0);
        assert!(network.connect(&peer).await.is_err());
    }
}
