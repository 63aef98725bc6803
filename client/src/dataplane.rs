//! Hand-off point between an active session and the media/control layer

use crate::state::SessionId;
use async_trait::async_trait;
use remdesk_protocol::SessionFrame;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Frame queued by the data plane for sending to the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    pub channel: u16,
    pub payload: Vec<u8>,
}

impl OutboundFrame {
    pub fn new(channel: u16, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            channel,
            payload: payload.into(),
        }
    }
}

/// Consumer of active sessions
///
/// `on_active` is called once per session when it becomes active and
/// hands over the outbound queue; `on_closed` follows exactly once if
/// `on_active` was called.
#[async_trait]
pub trait DataPlane: Send + Sync {
    async fn on_active(&self, session: SessionId, outbound: mpsc::Sender<OutboundFrame>);

    async fn on_frame(&self, session: SessionId, frame: SessionFrame);

    async fn on_closed(&self, session: SessionId);
}

pub type SharedDataPlane = Arc<dyn DataPlane>;

/// Discards everything
pub struct NullDataPlane;

#[async_trait]
impl DataPlane for NullDataPlane {
    async fn on_active(&self, _session: SessionId, _outbound: mpsc::Sender<OutboundFrame>) {}

    async fn on_frame(&self, _session: SessionId, _frame: SessionFrame) {}

    async fn on_closed(&self, _session: SessionId) {}
}
