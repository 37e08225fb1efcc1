//! Persistent transcript store collaborator
//!
//! The engine treats store failures as non-fatal to the live conversation:
//! append errors are logged and swallowed by the turn-processing path, and
//! a post-restart reload may therefore be incomplete.

use crate::context::models::Turn;
use crate::error::{EngineError, Result};
use crate::session::models::SessionId;
use crate::upstream::models::UsageCounters;
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

/// An operator turn and the reply it produced, persisted together
#[derive(Debug, Clone)]
pub struct TurnPair {
    pub operator: Turn,
    pub reply: Turn,
}

/// Append-only transcript persistence
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Append one turn pair with the usage metadata of the call that
    /// produced it
    async fn append(
        &self,
        session_id: SessionId,
        pair: TurnPair,
        usage: UsageCounters,
    ) -> Result<()>;

    /// Load the full transcript for a session in insertion order
    async fn load_all(&self, session_id: SessionId) -> Result<Vec<Turn>>;
}

/// In-memory store used in tests and as the default collaborator
#[derive(Debug, Default)]
pub struct InMemoryTranscriptStore {
    entries: DashMap<SessionId, Vec<(TurnPair, UsageCounters)>>,
}

impl InMemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted pairs for a session
    pub fn pair_count(&self, session_id: SessionId) -> usize {
        self.entries.get(&session_id).map(|e| e.len()).unwrap_or(0)
    }
}

#[async_trait]
impl TranscriptStore for InMemoryTranscriptStore {
    async fn append(
        &self,
        session_id: SessionId,
        pair: TurnPair,
        usage: UsageCounters,
    ) -> Result<()> {
        debug!(%session_id, "Appending turn pair to store");
        self.entries.entry(session_id).or_default().push((pair, usage));
        Ok(())
    }

    async fn load_all(&self, session_id: SessionId) -> Result<Vec<Turn>> {
        let entry = self.entries.get(&session_id).ok_or_else(|| {
            EngineError::Persistence(format!("no transcript for session {}", session_id))
        })?;
        let mut turns = Vec::with_capacity(entry.len() * 2);
        for (pair, _) in entry.iter() {
            turns.push(pair.operator.clone());
            turns.push(pair.reply.clone());
        }
        Ok(turns)
    }
}
