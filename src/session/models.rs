//! Session state owned by the registry

use crate::context::models::{SessionMode, Turn};
use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Ended,
    Cancelled,
}

impl SessionStatus {
    /// Terminal states accept no further operations
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Ended | SessionStatus::Cancelled)
    }
}

/// Persona profile, validated once at ingestion. The core never
/// re-validates these fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub system_prompt: String,
    pub age: Option<u8>,
    pub presenting_concern: Option<String>,
}

impl Persona {
    pub fn new(id: impl Into<String>, name: impl Into<String>, system_prompt: impl Into<String>) -> Result<Self> {
        let persona = Self {
            id: id.into(),
            name: name.into(),
            system_prompt: system_prompt.into(),
            age: None,
            presenting_concern: None,
        };
        if persona.id.trim().is_empty() {
            return Err(EngineError::Validation("persona id must not be empty".into()));
        }
        if persona.system_prompt.trim().is_empty() {
            return Err(EngineError::Validation(
                "persona system prompt must not be empty".into(),
            ));
        }
        Ok(persona)
    }
}

/// Mutable state of one live session. Owned exclusively by the registry;
/// only the session-lifecycle API mutates it.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub id: SessionId,
    pub user_id: String,
    pub persona: Persona,
    pub status: SessionStatus,
    /// Narrative framing used when assembling context for this session
    pub mode: SessionMode,
    /// Ordered, append-only; the sole source of truth for what was said
    pub transcript: Vec<Turn>,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    /// True only while a warning has been issued and the session has not
    /// since received activity or been ended
    pub warning_fired: bool,
}

impl SessionState {
    pub fn new(user_id: impl Into<String>, persona: Persona) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            user_id: user_id.into(),
            persona,
            status: SessionStatus::Active,
            mode: SessionMode::Continuation,
            transcript: Vec::new(),
            started_at: now,
            last_activity_at: now,
            warning_fired: false,
        }
    }

    /// Reconstruct a session from a reloaded transcript. A fresh instance
    /// of the state machine: Active status, fresh timers, week-gap framing.
    pub fn resume(
        id: SessionId,
        user_id: impl Into<String>,
        persona: Persona,
        transcript: Vec<Turn>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id: user_id.into(),
            persona,
            status: SessionStatus::Active,
            mode: SessionMode::WeeklyResumption,
            transcript,
            started_at: now,
            last_activity_at: now,
            warning_fired: false,
        }
    }

    /// Append a turn and refresh the activity timestamp
    pub fn record_turn(&mut self, turn: Turn) {
        self.transcript.push(turn);
        self.last_activity_at = Utc::now();
    }
}

/// Read-only snapshot handed to lifecycle callbacks
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub user_id: String,
    pub persona_id: String,
    pub status: SessionStatus,
    pub turn_count: usize,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl From<&SessionState> for SessionSnapshot {
    fn from(state: &SessionState) -> Self {
        Self {
            id: state.id,
            user_id: state.user_id.clone(),
            persona_id: state.persona.id.clone(),
            status: state.status,
            turn_count: state.transcript.len(),
            started_at: state.started_at,
            last_activity_at: state.last_activity_at,
        }
    }
}
