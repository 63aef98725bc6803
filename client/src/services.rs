//! External collaborators used by every session

use crate::auth::{PresharedKeyAuthenticator, SharedAuthenticator};
use crate::config::{RuntimeConfig, TransportKind};
use crate::dataplane::{NullDataPlane, SharedDataPlane};
use anyhow::{Context, Result};
use remdesk_transport::{
    SharedConnector, TcpConnector, TcpConnectorConfig, WsConnector, WsConnectorConfig,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Transport, authentication and data-plane collaborators
#[derive(Clone)]
pub struct Services {
    pub connector: SharedConnector,
    pub authenticator: SharedAuthenticator,
    pub data_plane: SharedDataPlane,
}

impl Services {
    pub fn new(
        connector: SharedConnector,
        authenticator: SharedAuthenticator,
        data_plane: SharedDataPlane,
    ) -> Self {
        Self {
            connector,
            authenticator,
            data_plane,
        }
    }

    /// Build the stock collaborators described by `config`
    pub fn from_config(config: &RuntimeConfig) -> Result<Self> {
        let connector: SharedConnector = match config.transport.kind {
            TransportKind::Tcp => {
                info!(
                    "Using TCP transport ({} directory entries)",
                    config.transport.peers.len()
                );
                Arc::new(TcpConnector::new(TcpConnectorConfig {
                    directory: config.transport.peers.clone(),
                }))
            }
            TransportKind::Websocket => {
                let url = config
                    .transport
                    .rendezvous_url
                    .clone()
                    .context("transport.rendezvous_url is required for the websocket transport")?;
                info!("Using WebSocket transport via {}", url);
                Arc::new(WsConnector::new(WsConnectorConfig {
                    rendezvous_url: url,
                    token: config.transport.token.clone(),
                    ..Default::default()
                }))
            }
        };

        let key = config
            .security
            .key_bytes()
            .context("security.preshared_key is not valid hex")?;
        if key.is_empty() {
            warn!("No pre-shared key configured; handshakes will be signed with an empty key");
        }

        Ok(Self {
            connector,
            authenticator: Arc::new(PresharedKeyAuthenticator::new(
                config.security.client_id.clone(),
                key,
            )),
            data_plane: Arc::new(NullDataPlane),
        })
    }

    /// Replace the data plane
    pub fn with_data_plane(mut self, data_plane: SharedDataPlane) -> Self {
        self.data_plane = data_plane;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_default_config() {
        assert!(Services::from_config(&RuntimeConfig::default()).is_ok());
    }

    #[test]
    fn test_websocket_without_url_fails() {
        let mut config = RuntimeConfig::default();
        config.transport.kind = TransportKind::Websocket;
        assert!(Services::from_config(&config).is_err());
    }
}
