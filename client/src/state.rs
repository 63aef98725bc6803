//! Session identifiers, lifecycle states and state publication

use remdesk_protocol::PeerId;
use std::fmt;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

/// Runtime-unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SessionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Lifecycle of one connection attempt
///
/// ```text
/// Idle -> Connecting -> Authenticating -> Active -> Closing -> Closed
///   \________\_______________\_______________\_________\--> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Connecting,
    Authenticating,
    Active,
    Closing,
    Closed,
    Failed,
}

impl SessionState {
    /// Closed and Failed end the attempt
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    /// States that block a second session to the same peer
    pub fn is_live(self) -> bool {
        matches!(
            self,
            SessionState::Idle
                | SessionState::Connecting
                | SessionState::Authenticating
                | SessionState::Active
        )
    }

    /// Whether `self -> next` is a legal transition
    ///
    /// `Failed -> Closed` is only taken when the registry reclaims a failed
    /// session.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Idle, Connecting) => true,
            (Connecting, Authenticating) => true,
            (Authenticating, Active) => true,
            (Closing, Closed) => true,
            (Failed, Closed) => true,
            (Idle | Connecting | Authenticating | Active, Closing) => true,
            (Idle | Connecting | Authenticating | Active | Closing, Failed) => true,
            _ => false,
        }
    }

    /// Stable code used by the C ABI
    pub fn code(self) -> i32 {
        match self {
            SessionState::Idle => 0,
            SessionState::Connecting => 1,
            SessionState::Authenticating => 2,
            SessionState::Active => 3,
            SessionState::Closing => 4,
            SessionState::Closed => 5,
            SessionState::Failed => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Authenticating => "authenticating",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Published on every state transition
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub session: SessionId,
    pub peer: PeerId,
    pub state: SessionState,
}

/// Point-in-time view of a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub peer: PeerId,
    pub state: SessionState,
}

/// Shared state cell of one session
///
/// Every transition goes through `send_if_modified`, which holds the watch
/// lock, so two transitions of the same session never interleave.
pub(crate) struct SessionSlot {
    id: SessionId,
    peer: PeerId,
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionSlot {
    pub(crate) fn new(
        id: SessionId,
        peer: PeerId,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            id,
            peer,
            state,
            events,
        }
    }

    pub(crate) fn id(&self) -> SessionId {
        self.id
    }

    pub(crate) fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub(crate) fn current(&self) -> SessionState {
        *self.state.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub(crate) fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            peer: self.peer.clone(),
            state: self.current(),
        }
    }

    /// Apply a legal transition; returns false and changes nothing otherwise
    ///
    /// The event is published while the watch lock is held, so subscribers
    /// see transitions of one session in the order they were applied.
    pub(crate) fn transition(&self, next: SessionState) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if !current.can_transition_to(next) {
                return false;
            }
            debug!("Session {} ({}): {} -> {}", self.id, self.peer, current, next);
            *current = next;
            self.publish(next);
            true
        });

        if !changed {
            debug!(
                "Session {} ({}): ignored transition to {} from {}",
                self.id,
                self.peer,
                next,
                self.current()
            );
        }
        changed
    }

    /// Move to Closed regardless of the current state
    pub(crate) fn force_closed(&self) {
        self.state.send_if_modified(|current| {
            if *current == SessionState::Closed {
                return false;
            }
            warn!(
                "Session {} ({}): forced from {} to closed",
                self.id, self.peer, current
            );
            *current = SessionState::Closed;
            self.publish(SessionState::Closed);
            true
        });
    }

    fn publish(&self, state: SessionState) {
        // No subscribers is fine
        let _ = self.events.send(SessionEvent {
            session: self.id,
            peer: self.peer.clone(),
            state,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    fn slot() -> (SessionSlot, broadcast::Receiver<SessionEvent>) {
        let (tx, rx) = broadcast::channel(16);
        let slot = SessionSlot::new(SessionId::new(1), PeerId::new("peer-42").unwrap(), tx);
        (slot, rx)
    }

    #[test]
    fn test_happy_path_is_legal() {
        let path = [Idle, Connecting, Authenticating, Active, Closing, Closed];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?}", pair);
        }
    }

    #[test]
    fn test_no_skipping_forward() {
        assert!(!Idle.can_transition_to(Active));
        assert!(!Connecting.can_transition_to(Active));
        assert!(!Active.can_transition_to(Closed));
        assert!(!Active.can_transition_to(Connecting));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!Closed.can_transition_to(Failed));
        assert!(!Closed.can_transition_to(Idle));
        assert!(!Failed.can_transition_to(Idle));
        assert!(Failed.can_transition_to(Closed));
        for state in [Idle, Connecting, Authenticating, Active, Closing] {
            assert!(state.can_transition_to(Failed));
            assert!(!state.is_terminal());
        }
    }

    #[test]
    fn test_slot_rejects_illegal_transition() {
        let (slot, mut events) = slot();

        assert!(!slot.transition(Active));
        assert_eq!(slot.current(), Idle);
        assert!(events.try_recv().is_err());

        assert!(slot.transition(Connecting));
        let event = events.try_recv().unwrap();
        assert_eq!(event.state, Connecting);
        assert_eq!(event.session, SessionId::new(1));
    }

    #[test]
    fn test_concurrent_reclaim_publishes_in_order() {
        for _ in 0..200 {
            let (slot, mut events) = slot();
            slot.transition(Connecting);
            let _ = events.try_recv();

            std::thread::scope(|scope| {
                scope.spawn(|| slot.transition(Failed));
                scope.spawn(|| {
                    while !slot.transition(Closed) {
                        std::hint::spin_loop();
                    }
                });
            });

            assert_eq!(events.try_recv().unwrap().state, Failed);
            assert_eq!(events.try_recv().unwrap().state, Closed);
            assert!(events.try_recv().is_err());
        }
    }

    #[test]
    fn test_force_closed_publishes_once() {
        let (slot, mut events) = slot();
        slot.transition(Connecting);
        let _ = events.try_recv();

        slot.force_closed();
        slot.force_closed();

        assert_eq!(slot.current(), Closed);
        assert_eq!(events.try_recv().unwrap().state, Closed);
        assert!(events.try_recv().is_err());
    }
}
