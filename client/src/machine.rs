//! Per-session connection state machine
//!
//! Each session runs as one task: connect, authenticate, serve the data
//! plane, then close. Cancellation and per-state timeouts are raced against
//! every blocking step.

use crate::config::TimeoutConfig;
use crate::dataplane::OutboundFrame;
use crate::error::{ErrorKind, SessionError};
use crate::error_channel::ErrorChannel;
use crate::registry::RuntimeInner;
use crate::services::Services;
use crate::state::{SessionSlot, SessionState};
use remdesk_protocol::{ControlMessage, SessionFrame, WireMessage};
use remdesk_transport::{Transport, TransportError};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Why the session stopped driving
enum Exit {
    /// Local stop request
    Stopped(Option<Box<dyn Transport>>),
    /// Peer sent an orderly close
    PeerClosed(Box<dyn Transport>),
    /// Any failure, already classified
    Failed(SessionError),
}

/// What to do after an inbound message
enum Inbound {
    Continue,
    PeerClosed,
}

pub(crate) struct SessionTask {
    slot: Arc<SessionSlot>,
    cancel: CancellationToken,
    services: Services,
    timeouts: TimeoutConfig,
    outbound_queue: usize,
    errors: Arc<ErrorChannel>,
    registry: Weak<RuntimeInner>,
    activated: bool,
    sent: u64,
}

impl SessionTask {
    pub(crate) fn new(
        slot: Arc<SessionSlot>,
        cancel: CancellationToken,
        services: Services,
        timeouts: TimeoutConfig,
        outbound_queue: usize,
        errors: Arc<ErrorChannel>,
        registry: Weak<RuntimeInner>,
    ) -> Self {
        Self {
            slot,
            cancel,
            services,
            timeouts,
            outbound_queue,
            errors,
            registry,
            activated: false,
            sent: 0,
        }
    }

    pub(crate) async fn run(mut self) {
        match self.drive().await {
            Exit::Stopped(transport) => self.close(transport, "stopped by client").await,
            Exit::PeerClosed(transport) => self.close(Some(transport), "closed by peer").await,
            Exit::Failed(error) => self.fail(error).await,
        }

        if let Some(registry) = self.registry.upgrade() {
            registry.retire(self.slot.id());
        }
    }

    async fn drive(&mut self) -> Exit {
        if self.cancel.is_cancelled() {
            return Exit::Stopped(None);
        }

        // Connecting
        self.slot.transition(SessionState::Connecting);
        let connect_timeout = self.timeouts.connect();
        let mut transport = {
            let connect = timeout(
                connect_timeout,
                self.services.connector.connect(self.slot.peer()),
            );
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Exit::Stopped(None),
                result = connect => match result {
                    Ok(Ok(transport)) => transport,
                    Ok(Err(e)) => return Exit::Failed(e.into()),
                    Err(_) => return Exit::Failed(self.timed_out("connecting", connect_timeout)),
                },
            }
        };

        // Authenticating
        self.slot.transition(SessionState::Authenticating);
        let auth_timeout = self.timeouts.auth();
        let auth = {
            let authenticate = timeout(
                auth_timeout,
                self.services
                    .authenticator
                    .authenticate(self.slot.peer(), transport.as_mut()),
            );
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                result = authenticate => Some(result),
            }
        };
        match auth {
            None => return Exit::Stopped(Some(transport)),
            Some(Ok(Ok(()))) => {}
            Some(Ok(Err(e))) => return Exit::Failed(e.into()),
            Some(Err(_)) => return Exit::Failed(self.timed_out("authenticating", auth_timeout)),
        }

        // Active
        self.slot.transition(SessionState::Active);
        info!("Session {} to {} is active", self.slot.id(), self.slot.peer());
        self.serve(transport).await
    }

    async fn serve(&mut self, mut transport: Box<dyn Transport>) -> Exit {
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundFrame>(self.outbound_queue);
        self.services
            .data_plane
            .on_active(self.slot.id(), outbound_tx)
            .await;
        self.activated = true;

        let idle = self.timeouts.idle();
        let keepalive_every = self.timeouts.keepalive();
        let mut keepalive = tokio::time::interval_at(Instant::now() + keepalive_every, keepalive_every);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut idle_deadline = Instant::now() + idle;
        let mut ping_nonce = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Exit::Stopped(Some(transport)),
                _ = tokio::time::sleep_until(idle_deadline) => {
                    return Exit::Failed(self.timed_out("waiting for peer traffic", idle));
                }
                received = transport.recv_message() => match received {
                    Ok(message) => {
                        idle_deadline = Instant::now() + idle;
                        match self.handle_inbound(message, transport.as_mut()).await {
                            Ok(Inbound::Continue) => {}
                            Ok(Inbound::PeerClosed) => return Exit::PeerClosed(transport),
                            Err(e) => return Exit::Failed(e),
                        }
                    }
                    Err(TransportError::ConnectionClosed) => {
                        return Exit::Failed(SessionError::new(
                            ErrorKind::TransportError,
                            format!("connection to {} lost", self.slot.peer()),
                        ));
                    }
                    Err(e) => return Exit::Failed(e.into()),
                },
                Some(frame) = outbound_rx.recv() => {
                    self.sent += 1;
                    let message = WireMessage::Frame(SessionFrame::new(frame.channel, self.sent, frame.payload));
                    if let Err(e) = transport.send_message(&message).await {
                        return Exit::Failed(e.into());
                    }
                }
                _ = keepalive.tick() => {
                    ping_nonce += 1;
                    trace!("Session {}: ping {}", self.slot.id(), ping_nonce);
                    let ping = WireMessage::Control(ControlMessage::Ping { nonce: ping_nonce });
                    if let Err(e) = transport.send_message(&ping).await {
                        return Exit::Failed(e.into());
                    }
                }
            }
        }
    }

    async fn handle_inbound(
        &self,
        message: WireMessage,
        transport: &mut dyn Transport,
    ) -> Result<Inbound, SessionError> {
        match message {
            WireMessage::Frame(frame) => {
                self.services.data_plane.on_frame(self.slot.id(), frame).await;
            }
            WireMessage::Control(ControlMessage::Ping { nonce }) => {
                transport
                    .send_message(&WireMessage::Control(ControlMessage::Pong { nonce }))
                    .await?;
            }
            WireMessage::Control(ControlMessage::Pong { nonce }) => {
                trace!("Session {}: pong {}", self.slot.id(), nonce);
            }
            WireMessage::Control(ControlMessage::Close { reason }) => {
                info!(
                    "Session {}: {} closed the session ({})",
                    self.slot.id(),
                    self.slot.peer(),
                    reason
                );
                return Ok(Inbound::PeerClosed);
            }
            other => {
                debug!(
                    "Session {}: ignoring {} while active",
                    self.slot.id(),
                    other.kind()
                );
            }
        }
        Ok(Inbound::Continue)
    }

    /// Closing -> Closed, bounded by the closing timeout
    async fn close(&mut self, transport: Option<Box<dyn Transport>>, reason: &str) {
        self.slot.transition(SessionState::Closing);

        if let Some(mut transport) = transport {
            let closing = self.timeouts.closing();
            let shutdown = async {
                let close = WireMessage::Control(ControlMessage::Close {
                    reason: reason.to_string(),
                });
                // The peer may already be gone
                let _ = transport.send_message(&close).await;
                transport.close().await
            };

            match timeout(closing, shutdown).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Session {}: error while closing: {}", self.slot.id(), e),
                Err(_) => warn!(
                    "Session {}: transport did not close within {:?}, dropping it",
                    self.slot.id(),
                    closing
                ),
            }
        }

        if self.activated {
            self.services.data_plane.on_closed(self.slot.id()).await;
        }

        self.slot.transition(SessionState::Closed);
        info!("Session {} to {} closed ({})", self.slot.id(), self.slot.peer(), reason);
    }

    async fn fail(&mut self, error: SessionError) {
        warn!("Session {} to {} failed: {}", self.slot.id(), self.slot.peer(), error);

        // Record first so an observer that sees Failed also sees the cause
        self.errors.record_session(self.slot.id(), error);

        if self.activated {
            self.services.data_plane.on_closed(self.slot.id()).await;
        }

        self.slot.transition(SessionState::Failed);

        // A stop that raced with the failure still ends in Closed
        if self.cancel.is_cancelled() {
            debug!("Session {}: stop requested while failing", self.slot.id());
            self.slot.transition(SessionState::Closed);
        }
    }

    fn timed_out(&self, phase: &str, limit: Duration) -> SessionError {
        SessionError::new(
            ErrorKind::Timeout,
            format!("{} ({}) timed out after {:?}", phase, self.slot.peer(), limit),
        )
    }
}
