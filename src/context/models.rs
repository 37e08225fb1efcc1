//! Data models for context assembly

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Speaking party within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human operator driving the session
    Therapist,
    /// The simulated persona played by the model
    Patient,
}

impl Role {
    /// Wire role expected by the completion endpoint
    pub fn as_wire_role(&self) -> &'static str {
        match self {
            Role::Therapist => "user",
            Role::Patient => "assistant",
        }
    }

    /// Human-readable label used when rendering dialogue transcripts
    pub fn label(&self) -> &'static str {
        match self {
            Role::Therapist => "Therapist",
            Role::Patient => "Patient",
        }
    }
}

/// One message exchanged by either party. Immutable once created;
/// transcript position carries the dialogue order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Whether this turn continues the same encounter or resumes after a
/// week-long gap. Selects the framing paragraph of the enhanced system
/// segment; the structural position is identical for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Continuation,
    WeeklyResumption,
}

/// Context strategy selected for a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheStrategy {
    /// Full transcript as literal messages
    Simple,
    /// 6-turn window, older turns rendered verbatim into the system segment
    SlidingWindowLiteral,
    /// 6-turn window, older turns summarized into the system segment
    SlidingWindowSummarized,
}

impl CacheStrategy {
    /// Stable label for logging and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStrategy::Simple => "simple",
            CacheStrategy::SlidingWindowLiteral => "sliding-window-literal",
            CacheStrategy::SlidingWindowSummarized => "sliding-window-summarized",
        }
    }
}

/// System segment of a planned request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSegment {
    pub text: String,
    /// Cache annotation is only ever attached here, never to messages
    pub cacheable: bool,
}

/// Planned request shape for one turn. Derived and recomputed per
/// request, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachePlan {
    pub strategy: CacheStrategy,
    pub system_segment: Option<SystemSegment>,
    /// Most recent turns in original order; never more than the window
    /// size when a sliding strategy is in effect
    pub recent_turns: Vec<Turn>,
    pub used_summary: bool,
}
