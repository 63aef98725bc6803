//! Session registry and the runtime handle
//!
//! `RuntimeHandle` owns every session it starts. All mutations of the
//! session table (start, stop, retirement, cleanup) hold one lock so id
//! allocation and capacity checks stay consistent.

use crate::config::RuntimeConfig;
use crate::error::{ErrorKind, SessionError};
use crate::error_channel::{ErrorChannel, ErrorTarget};
use crate::machine::SessionTask;
use crate::services::Services;
use crate::state::{SessionEvent, SessionId, SessionInfo, SessionSlot, SessionState};
use parking_lot::Mutex;
use remdesk_protocol::PeerId;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct SessionEntry {
    slot: Arc<SessionSlot>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    retired: bool,
}

struct SessionTable {
    next_id: u64,
    sessions: BTreeMap<SessionId, SessionEntry>,
    /// Terminal sessions, oldest first
    retired: VecDeque<SessionId>,
}

pub(crate) struct RuntimeInner {
    config: RuntimeConfig,
    services: Services,
    spawner: Handle,
    table: Mutex<SessionTable>,
    errors: Arc<ErrorChannel>,
    events: broadcast::Sender<SessionEvent>,
    closed: AtomicBool,
}

impl RuntimeInner {
    /// Called by a session task once it has reached a terminal state
    pub(crate) fn retire(&self, id: SessionId) {
        let mut table = self.table.lock();
        let Some(entry) = table.sessions.get_mut(&id) else {
            return;
        };
        if entry.retired {
            return;
        }
        entry.retired = true;
        table.retired.push_back(id);

        // The newest terminal session always stays queryable
        let keep = self.config.runtime.retained_sessions.max(1);
        while table.retired.len() > keep {
            let Some(oldest) = table.retired.pop_front() else {
                break;
            };
            table.sessions.remove(&oldest);
            self.errors.forget(oldest);
            debug!("Pruned session {}", oldest);
        }
    }
}

/// Handle to one initialized session runtime
///
/// Clones share the same runtime. After `cleanup`, every operation on any
/// clone fails with `InvalidHandle`.
#[derive(Clone)]
pub struct RuntimeHandle {
    inner: Arc<RuntimeInner>,
}

impl RuntimeHandle {
    /// Initialize a runtime on the current Tokio runtime
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, like `tokio::spawn`.
    pub fn init(config: RuntimeConfig, services: Services) -> Self {
        Self::init_on(Handle::current(), config, services)
    }

    /// Initialize a runtime whose session tasks run on `spawner`
    pub fn init_on(spawner: Handle, config: RuntimeConfig, services: Services) -> Self {
        let (events, _) = broadcast::channel(config.runtime.event_capacity.max(1));
        info!(
            "remdesk runtime v{} initialized (max {} sessions)",
            crate::VERSION,
            config.runtime.max_sessions
        );

        Self {
            inner: Arc::new(RuntimeInner {
                config,
                services,
                spawner,
                table: Mutex::new(SessionTable {
                    next_id: 1,
                    sessions: BTreeMap::new(),
                    retired: VecDeque::new(),
                }),
                errors: Arc::new(ErrorChannel::new()),
                events,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Library version
    pub fn version() -> &'static str {
        crate::VERSION
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Whether `cleanup` has run
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Start a session to `peer_id` and return its id without waiting
    pub fn start_session(&self, peer_id: &str) -> Result<SessionId, SessionError> {
        let result = self.try_start(peer_id);
        if let Err(e) = &result {
            debug!("start_session({:?}) rejected: {}", peer_id, e);
            self.inner.errors.record_runtime(e.clone());
        }
        result
    }

    fn try_start(&self, peer_id: &str) -> Result<SessionId, SessionError> {
        let peer = PeerId::new(peer_id)
            .map_err(|e| SessionError::new(ErrorKind::InvalidPeerId, e.to_string()))?;
        let inner = &self.inner;

        let mut table = inner.table.lock();
        if inner.closed.load(Ordering::Acquire) {
            return Err(invalid_handle());
        }

        if let Some(existing) = table
            .sessions
            .values()
            .find(|e| e.slot.peer() == &peer && e.slot.current().is_live())
        {
            return Err(SessionError::new(
                ErrorKind::DuplicateSession,
                format!(
                    "session {} to {} is still {}",
                    existing.slot.id(),
                    peer,
                    existing.slot.current()
                ),
            ));
        }

        let in_flight = table
            .sessions
            .values()
            .filter(|e| !e.slot.current().is_terminal())
            .count();
        if in_flight >= inner.config.runtime.max_sessions {
            return Err(SessionError::new(
                ErrorKind::RegistryFull,
                format!("{} sessions already in progress", in_flight),
            ));
        }

        let id = SessionId::new(table.next_id);
        table.next_id += 1;

        let slot = Arc::new(SessionSlot::new(id, peer.clone(), inner.events.clone()));
        let cancel = CancellationToken::new();
        let task = SessionTask::new(
            slot.clone(),
            cancel.clone(),
            inner.services.clone(),
            inner.config.timeouts.clone(),
            inner.config.runtime.outbound_queue,
            inner.errors.clone(),
            Arc::downgrade(inner),
        );
        let handle = inner.spawner.spawn(task.run());

        table.sessions.insert(
            id,
            SessionEntry {
                slot,
                cancel,
                task: Some(handle),
                retired: false,
            },
        );

        info!("Started session {} to {}", id, peer);
        Ok(id)
    }

    /// Ask a session to stop; returns before the transport is closed
    pub fn stop_session(&self, id: SessionId) -> Result<(), SessionError> {
        let result = self.try_stop(id);
        if let Err(e) = &result {
            debug!("stop_session({}) rejected: {}", id, e);
            self.inner.errors.record_runtime(e.clone());
        }
        result
    }

    fn try_stop(&self, id: SessionId) -> Result<(), SessionError> {
        let table = self.inner.table.lock();
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(invalid_handle());
        }

        let entry = table.sessions.get(&id).ok_or_else(|| unknown_session(id))?;
        if matches!(
            entry.slot.current(),
            SessionState::Closing | SessionState::Closed
        ) {
            debug!("Session {} is already stopping", id);
            return Ok(());
        }

        // Cancel before looking for Failed: the task checks the token after
        // it fails, so one of the two sides always reclaims
        debug!("Cancelling session {}", id);
        entry.cancel.cancel();
        if entry.slot.current() == SessionState::Failed {
            // Reclaim without touching the error record
            entry.slot.transition(SessionState::Closed);
        }
        Ok(())
    }

    /// Current state of a session
    pub fn state(&self, id: SessionId) -> Result<SessionState, SessionError> {
        self.with_slot(id, |slot| slot.current())
    }

    /// Follow the state of one session
    pub fn watch(&self, id: SessionId) -> Result<watch::Receiver<SessionState>, SessionError> {
        self.with_slot(id, |slot| slot.subscribe())
    }

    /// Notification channel for every transition of every session
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Snapshot of known sessions, in id order
    pub fn sessions(&self) -> Result<Vec<SessionInfo>, SessionError> {
        let table = self.inner.table.lock();
        if self.inner.closed.load(Ordering::Acquire) {
            drop(table);
            return Err(self.reject(invalid_handle()));
        }
        Ok(table.sessions.values().map(|e| e.slot.info()).collect())
    }

    /// Last error text for the runtime or a session; never fails
    pub fn get_error(&self, target: impl Into<ErrorTarget>) -> String {
        self.inner.errors.text(target.into())
    }

    /// Full error record, if any
    pub fn last_error(&self, target: impl Into<ErrorTarget>) -> Option<SessionError> {
        self.inner.errors.record(target.into()).map(|r| r.error)
    }

    /// Stop every session and invalidate the handle
    ///
    /// Waits up to the grace period for sessions to close; tasks that do not
    /// finish in time are aborted and their sessions marked closed.
    pub async fn cleanup(&self) {
        let entries: Vec<SessionEntry> = {
            let mut table = self.inner.table.lock();
            if self.inner.closed.swap(true, Ordering::AcqRel) {
                warn!("cleanup called on a runtime that is already cleaned up");
                return;
            }
            table.retired.clear();
            std::mem::take(&mut table.sessions).into_values().collect()
        };

        info!("Cleaning up {} sessions", entries.len());
        for entry in &entries {
            entry.cancel.cancel();
        }

        let grace = self.inner.config.runtime.grace_period();
        let deadline = tokio::time::Instant::now() + grace;
        for mut entry in entries {
            let mut aborted = false;
            if let Some(task) = entry.task.take() {
                let abort = task.abort_handle();
                if tokio::time::timeout_at(deadline, task).await.is_err() {
                    abort.abort();
                    aborted = true;
                    warn!(
                        "Session {} to {} did not close within {:?}; discarding it",
                        entry.slot.id(),
                        entry.slot.peer(),
                        grace
                    );
                }
            }

            match entry.slot.current() {
                SessionState::Failed if !aborted => {
                    entry.slot.transition(SessionState::Closed);
                }
                SessionState::Closed => {}
                _ => entry.slot.force_closed(),
            }
        }

        info!("Runtime cleaned up");
    }

    fn with_slot<T>(
        &self,
        id: SessionId,
        f: impl FnOnce(&SessionSlot) -> T,
    ) -> Result<T, SessionError> {
        let result = {
            let table = self.inner.table.lock();
            if self.inner.closed.load(Ordering::Acquire) {
                Err(invalid_handle())
            } else {
                table
                    .sessions
                    .get(&id)
                    .map(|e| f(&e.slot))
                    .ok_or_else(|| unknown_session(id))
            }
        };
        result.map_err(|e| self.reject(e))
    }

    fn reject(&self, error: SessionError) -> SessionError {
        self.inner.errors.record_runtime(error.clone());
        error
    }
}

fn invalid_handle() -> SessionError {
    SessionError::new(ErrorKind::InvalidHandle, "runtime has been cleaned up")
}

fn unknown_session(id: SessionId) -> SessionError {
    SessionError::new(ErrorKind::UnknownSession, format!("no session {}", id))
}
