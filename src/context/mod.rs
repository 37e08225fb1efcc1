//! Context budgeting: strategy selection, sliding-window assembly,
//! history summarization, and token estimation

pub mod assembler;
pub mod models;
pub mod planner;
pub mod summarizer;
pub mod token_estimator;

pub use assembler::{ContextAssembler, RequestDefaults};
pub use models::{CachePlan, CacheStrategy, Role, SessionMode, SystemSegment, Turn};
pub use planner::{CachePlanner, MIN_CACHEABLE_SYSTEM_TOKENS, WINDOW_SIZE};
pub use summarizer::HistorySummarizer;
pub use token_estimator::{default_estimator, HeuristicEstimator, TiktokenEstimator, TokenEstimator};
