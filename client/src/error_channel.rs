//! Last-error records, polled by the host

use crate::error::SessionError;
use crate::state::SessionId;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::time::SystemTime;

/// Text returned when nothing has been recorded
pub const NO_ERROR: &str = "";

/// What `get_error` is asked about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTarget {
    Runtime,
    Session(SessionId),
}

impl From<SessionId> for ErrorTarget {
    fn from(id: SessionId) -> Self {
        ErrorTarget::Session(id)
    }
}

/// One recorded failure
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub error: SessionError,
    pub recorded_at: SystemTime,
}

impl ErrorRecord {
    fn new(error: SessionError) -> Self {
        Self {
            error,
            recorded_at: SystemTime::now(),
        }
    }
}

/// Last failure per runtime and per session
///
/// Records are overwritten, never appended, and stay readable after the
/// failure is over. A non-empty text does not mean something is failing now.
#[derive(Default)]
pub struct ErrorChannel {
    runtime: RwLock<Option<ErrorRecord>>,
    sessions: DashMap<SessionId, ErrorRecord>,
}

impl ErrorChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a synchronous failure against the runtime
    pub fn record_runtime(&self, error: SessionError) {
        *self.runtime.write() = Some(ErrorRecord::new(error));
    }

    /// Record an asynchronous failure against a session
    pub fn record_session(&self, id: SessionId, error: SessionError) {
        self.sessions.insert(id, ErrorRecord::new(error));
    }

    /// Drop the record of a pruned session
    pub fn forget(&self, id: SessionId) {
        self.sessions.remove(&id);
    }

    pub fn record(&self, target: ErrorTarget) -> Option<ErrorRecord> {
        match target {
            ErrorTarget::Runtime => self.runtime.read().clone(),
            ErrorTarget::Session(id) => self.sessions.get(&id).map(|r| r.value().clone()),
        }
    }

    /// Last error text, or `NO_ERROR`
    pub fn text(&self, target: ErrorTarget) -> String {
        self.record(target)
            .map(|r| r.error.to_string())
            .unwrap_or_else(|| NO_ERROR.to_string())
    }
}
