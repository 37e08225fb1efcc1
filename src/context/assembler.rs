//! Context assembly: estimator → summarizer → planner → request payload
//!
//! The assembler is pure with respect to the transcript and prompt it is
//! given: repeated calls with identical input produce identical payloads.

use super::models::{CachePlan, SessionMode, Turn};
use super::planner::CachePlanner;
use super::token_estimator::TokenEstimator;
use crate::error::{EngineError, Result};
use crate::metrics::METRICS;
use crate::upstream::models::{CompletionRequest, SystemBlock, WireMessage};
use std::sync::Arc;
use tracing::debug;

/// Request parameters that do not vary per turn
#[derive(Debug, Clone)]
pub struct RequestDefaults {
    pub model: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            model: "claude-3-5-sonnet-20241022".to_string(),
            max_output_tokens: 1024,
            temperature: 0.8,
        }
    }
}

/// Orchestrates token estimation, summarization, and cache planning into
/// the final request payload for a single turn
pub struct ContextAssembler {
    estimator: Arc<dyn TokenEstimator>,
    planner: CachePlanner,
    defaults: RequestDefaults,
}

impl ContextAssembler {
    pub fn new(estimator: Arc<dyn TokenEstimator>, defaults: RequestDefaults) -> Self {
        Self {
            estimator,
            planner: CachePlanner::new(),
            defaults,
        }
    }

    /// Plan the request shape for the given transcript and persona prompt
    pub fn plan(
        &self,
        transcript: &[Turn],
        persona_prompt: &str,
        mode: SessionMode,
    ) -> Result<CachePlan> {
        validate_input(transcript, persona_prompt)?;

        let system_tokens = self.estimator.estimate(persona_prompt);
        let plan = self.planner.plan(transcript, persona_prompt, mode, system_tokens);

        METRICS
            .cache_plans
            .with_label_values(&[plan.strategy.as_str()])
            .inc();
        if plan.used_summary {
            METRICS.summarizations.inc();
        }

        Ok(plan)
    }

    /// Produce the final request payload for the given turn
    pub fn assemble(
        &self,
        transcript: &[Turn],
        persona_prompt: &str,
        mode: SessionMode,
    ) -> Result<CompletionRequest> {
        let plan = self.plan(transcript, persona_prompt, mode)?;
        Ok(self.request_from_plan(&plan))
    }

    /// Translate a plan into the wire payload
    pub fn request_from_plan(&self, plan: &CachePlan) -> CompletionRequest {
        let system = plan
            .system_segment
            .as_ref()
            .map(|s| vec![SystemBlock::text(&s.text, s.cacheable)])
            .unwrap_or_default();

        // Cache annotations never appear on messages; the endpoint
        // rejects them there
        let messages = plan
            .recent_turns
            .iter()
            .map(|t| WireMessage {
                role: t.role.as_wire_role().to_string(),
                content: t.content.clone(),
            })
            .collect::<Vec<_>>();

        debug!(
            strategy = plan.strategy.as_str(),
            messages = messages.len(),
            "Assembled completion request"
        );

        CompletionRequest {
            model: self.defaults.model.clone(),
            max_tokens: self.defaults.max_output_tokens,
            temperature: self.defaults.temperature,
            system,
            messages,
        }
    }
}

/// Fail fast on malformed input; the assembler never silently drops data
fn validate_input(transcript: &[Turn], persona_prompt: &str) -> Result<()> {
    if persona_prompt.trim().is_empty() {
        return Err(EngineError::Validation(
            "persona system prompt must not be empty".to_string(),
        ));
    }
    for (i, turn) in transcript.iter().enumerate() {
        if turn.content.trim().is_empty() {
            return Err(EngineError::Validation(format!(
                "turn {} has empty content",
                i
            )));
        }
    }
    Ok(())
}
