//! Session lifecycle: registry, inactivity escalation, and the engine
//! that orchestrates per-turn processing

pub mod engine;
pub mod inactivity;
pub mod models;
pub mod registry;

pub use engine::{EngineReply, SessionEngine};
pub use inactivity::{InactivityConfig, InactivityScheduler, LifecycleHooks, NoopHooks};
pub use models::{Persona, SessionId, SessionSnapshot, SessionState, SessionStatus};
pub use registry::{SessionHandle, SessionRegistry};
