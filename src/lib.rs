//! Conversational-session engine with prompt-cache-aware context
//! budgeting
//!
//! Sits between a conversational interface and a stateless completion
//! endpoint: turns an ever-growing per-session transcript into a bounded
//! request payload that maximizes reuse of the provider's prompt cache,
//! and tracks each session through a warning/termination inactivity
//! escalation.

pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod session;
pub mod store;
pub mod upstream;

pub use config::Config;
pub use context::{
    CachePlan, CacheStrategy, ContextAssembler, HistorySummarizer, Role, SessionMode, Turn,
};
pub use error::{EngineError, Result};
pub use middleware::{RateLimitConfig, RateLimiter};
pub use session::{
    EngineReply, LifecycleHooks, NoopHooks, Persona, SessionEngine, SessionId, SessionSnapshot,
    SessionStatus,
};
pub use store::{InMemoryTranscriptStore, TranscriptStore, TurnPair};
pub use upstream::{CompletionClient, UpstreamError};
