//! WebSocket transport through a rendezvous relay

use crate::{Connector, Transport, TransportError};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use remdesk_protocol::PeerId;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async_with_config,
    tungstenite::{
        Message,
        client::IntoClientRequest,
        http::{HeaderName, HeaderValue, Request, header},
        protocol::WebSocketConfig,
    },
};
use tracing::{debug, info, trace};

/// WebSocket connector configuration
#[derive(Debug, Clone)]
pub struct WsConnectorConfig {
    /// Rendezvous base URL; the peer id is appended as the last path segment
    pub rendezvous_url: String,

    /// Authorization token
    pub token: Option<String>,

    /// Custom headers
    pub headers: Vec<(String, String)>,

    /// User-Agent sent with the upgrade request
    pub user_agent: String,
}

impl Default for WsConnectorConfig {
    fn default() -> Self {
        Self {
            rendezvous_url: String::new(),
            token: None,
            headers: Vec::new(),
            user_agent: format!("remdesk/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Connects to peers through a WebSocket rendezvous service
pub struct WsConnector {
    config: WsConnectorConfig,
}

impl WsConnector {
    pub fn new(config: WsConnectorConfig) -> Self {
        Self { config }
    }

    /// URL used to reach `peer`
    pub fn peer_url(&self, peer: &PeerId) -> String {
        format!(
            "{}/{}",
            self.config.rendezvous_url.trim_end_matches('/'),
            peer
        )
    }

    /// Build the HTTP upgrade request for `peer`
    fn build_request(&self, peer: &PeerId) -> Result<Request<()>, TransportError> {
        let url = self.peer_url(peer);
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", url, e)))?;

        let headers = request.headers_mut();

        headers.insert(header::USER_AGENT, header_value(&self.config.user_agent)?);

        if let Some(token) = &self.config.token {
            headers.insert(
                header::AUTHORIZATION,
                header_value(&format!("Bearer {}", token))?,
            );
        }

        for (key, value) in &self.config.headers {
            let name = key
                .parse::<HeaderName>()
                .map_err(|e| TransportError::InvalidUrl(format!("header {}: {}", key, e)))?;
            headers.insert(name, header_value(value)?);
        }

        Ok(request)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, TransportError> {
    value
        .parse::<HeaderValue>()
        .map_err(|e| TransportError::InvalidUrl(format!("header value: {}", e)))
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, peer: &PeerId) -> Result<Box<dyn Transport>, TransportError> {
        let request = self.build_request(peer)?;

        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(16 << 20); // 16MB
        ws_config.max_frame_size = Some(16 << 20);

        debug!("Connecting to {} via {}", peer, self.config.rendezvous_url);

        let (stream, response) = connect_async_with_config(request, Some(ws_config), false)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        info!(
            "Connected to {} through rendezvous, status: {}",
            peer,
            response.status()
        );

        Ok(Box::new(WsTransport { stream }))
    }
}

/// A session carried over one WebSocket
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, message: Vec<u8>) -> Result<(), TransportError> {
        trace!("Sending binary frame: {} bytes", message.len());
        self.stream
            .send(Message::Binary(message.into()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(data.to_vec()),
                Some(Ok(Message::Close(_))) | None => return Err(TransportError::ConnectionClosed),
                // Pings are answered by tungstenite on the next read/write
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        debug!("Closing WebSocket connection");
        self.stream
            .close(None)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}
