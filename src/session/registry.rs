//! In-memory table of live sessions
//!
//! Each record owns its own cancellable scheduled tasks: arming a new
//! timer set replaces and aborts the previous one under the record's
//! timer lock, so cancel-and-reschedule is a single atomic operation on
//! the record rather than two independent timer variables.

use super::models::{SessionId, SessionState, SessionStatus};
use crate::error::{EngineError, Result};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// The one pending timer set of a session. At most one set exists per
/// session at any instant.
#[derive(Debug)]
pub enum TimerSet {
    /// Normal two-stage escalation: warning at `Tw`, termination at `Te`
    Monitoring {
        warning: JoinHandle<()>,
        termination: JoinHandle<()>,
    },
    /// Pause path: a single timer that invokes the warning hook on expiry
    Pause { pause: JoinHandle<()> },
}

impl TimerSet {
    fn abort(self) {
        match self {
            TimerSet::Monitoring {
                warning,
                termination,
            } => {
                warning.abort();
                termination.abort();
            }
            TimerSet::Pause { pause } => pause.abort(),
        }
    }
}

/// One live session: its state plus its pending timers
#[derive(Debug)]
pub struct SessionHandle {
    pub id: SessionId,
    pub user_id: String,
    /// Turn processing and timer callbacks serialize through this lock
    pub state: Mutex<SessionState>,
    timers: StdMutex<Option<TimerSet>>,
    /// Registration instant on the tokio clock, for the duration ceiling
    started: tokio::time::Instant,
}

impl SessionHandle {
    fn new(state: SessionState) -> Self {
        Self {
            id: state.id,
            user_id: state.user_id.clone(),
            state: Mutex::new(state),
            timers: StdMutex::new(None),
            started: tokio::time::Instant::now(),
        }
    }

    /// Time since registration
    pub fn age(&self) -> std::time::Duration {
        self.started.elapsed()
    }

    /// Replace the pending timer set, aborting the previous one. The
    /// timer lock is held across abort and install.
    pub fn install_timers(&self, set: TimerSet) {
        let mut guard = self.timers.lock().expect("timer lock poisoned");
        if let Some(old) = guard.take() {
            old.abort();
        }
        *guard = Some(set);
    }

    /// Abort and clear the pending timer set
    pub fn cancel_timers(&self) {
        let mut guard = self.timers.lock().expect("timer lock poisoned");
        if let Some(old) = guard.take() {
            old.abort();
        }
    }
}

/// In-memory table of live sessions keyed by opaque id
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new session. Refuses when a first-match scan finds a
    /// live session for the same user. The scan is not a hard uniqueness
    /// constraint under concurrent creation; see DESIGN.md.
    pub fn insert(&self, state: SessionState) -> Result<Arc<SessionHandle>> {
        if let Some(existing) = self.find_for_user(&state.user_id) {
            return Err(EngineError::State(format!(
                "user {} already has live session {}",
                state.user_id, existing.id
            )));
        }

        let id = state.id;
        let handle = Arc::new(SessionHandle::new(state));
        self.sessions.insert(id, Arc::clone(&handle));
        info!(session_id = %id, user_id = %handle.user_id, "Session registered");
        Ok(handle)
    }

    /// Look up a live session
    pub fn get(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.get(&id).map(|e| Arc::clone(e.value()))
    }

    /// Look up a live session, failing with a state error when unknown
    pub fn get_or_err(&self, id: SessionId) -> Result<Arc<SessionHandle>> {
        self.get(id)
            .ok_or_else(|| EngineError::State(format!("unknown or ended session {}", id)))
    }

    /// First live session for a user, if any
    pub fn find_for_user(&self, user_id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions
            .iter()
            .find(|e| e.value().user_id == user_id)
            .map(|e| Arc::clone(e.value()))
    }

    /// Remove a session, aborting its timers
    pub fn remove(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        let removed = self.sessions.remove(&id).map(|(_, h)| h);
        if let Some(ref handle) = removed {
            handle.cancel_timers();
            debug!(session_id = %id, "Session removed from registry");
        }
        removed
    }

    /// Snapshot of all live handles, for the periodic sweep
    pub fn handles(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions.iter().map(|e| Arc::clone(e.value())).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Abort every outstanding timer and drop all live state
    pub fn shutdown(&self) {
        for handle in self.handles() {
            handle.cancel_timers();
        }
        self.sessions.clear();
        info!("Session registry shut down");
    }
}

/// End a session in place: terminal status, timers aborted, removed from
/// the registry. Returns the final state, or None when the session was
/// already gone or terminal.
pub async fn finalize_session(
    registry: &SessionRegistry,
    id: SessionId,
    status: SessionStatus,
) -> Option<SessionState> {
    debug_assert!(status.is_terminal());
    let handle = registry.get(id)?;
    let final_state = {
        let mut state = handle.state.lock().await;
        if state.status.is_terminal() {
            return None;
        }
        state.status = status;
        state.warning_fired = false;
        state.clone()
    };
    registry.remove(id);
    Some(final_state)
}
