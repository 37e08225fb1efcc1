//! Token estimation with a tiktoken-backed precise path and a
//! deterministic character-ratio fallback

use std::sync::Arc;
use tiktoken_rs::{cl100k_base, CoreBPE};

/// Token estimator trait for different counting strategies
pub trait TokenEstimator: Send + Sync {
    /// Estimate the number of tokens in the given text
    fn estimate(&self, text: &str) -> usize;

    /// Estimate tokens for possibly-absent input; absent input counts
    /// as zero tokens and never errors
    fn estimate_opt(&self, text: Option<&str>) -> usize {
        text.map(|t| self.estimate(t)).unwrap_or(0)
    }
}

/// Tiktoken-based estimator using cl100k_base
pub struct TiktokenEstimator {
    bpe: Arc<CoreBPE>,
}

impl TiktokenEstimator {
    /// Create a new tiktoken estimator; fails if the encoding cannot be
    /// loaded, in which case callers fall back to [`HeuristicEstimator`]
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let bpe = cl100k_base()?;
        Ok(Self { bpe: Arc::new(bpe) })
    }
}

impl TokenEstimator for TiktokenEstimator {
    fn estimate(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Character-ratio fallback: `ceil(len / 4)`. Deterministic for a given
/// input, used when no precise tokenizer is available.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicEstimator;

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.len().div_ceil(4)
    }
}

/// Best-available estimator: tiktoken when it initializes, heuristic
/// otherwise
pub fn default_estimator() -> Arc<dyn TokenEstimator> {
    match TiktokenEstimator::new() {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::warn!("tiktoken initialization failed, using heuristic estimator: {}", e);
            Arc::new(HeuristicEstimator)
        }
    }
}
