//! Admission control consumed before turns reach the assembler

pub mod rate_limiter;

pub use rate_limiter::{RateLimitConfig, RateLimiter};
