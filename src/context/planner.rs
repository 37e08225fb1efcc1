//! Cache planning: pure strategy selection and request shaping
//!
//! Decides, from transcript length and system-prompt size alone, which of
//! three request shapes to produce and which text carries the provider's
//! cache annotation. Recomputed per request; identical input always yields
//! an identical plan.

use super::models::{CachePlan, CacheStrategy, SessionMode, SystemSegment, Turn};
use super::summarizer::HistorySummarizer;
use tracing::debug;

/// Transcript length at or below which the full transcript is sent verbatim
pub const SIMPLE_MAX_TURNS: usize = 10;

/// Transcript length at or above which older turns are summarized rather
/// than rendered verbatim
pub const SUMMARIZE_MIN_TURNS: usize = 30;

/// Number of most-recent turns kept as literal messages under a sliding
/// strategy
pub const WINDOW_SIZE: usize = 6;

/// Below this size the provider's minimum cacheable-size floor makes a
/// cache annotation a net cost, so it is omitted entirely
pub const MIN_CACHEABLE_SYSTEM_TOKENS: usize = 800;

/// Pure decision function producing the literal request shape
#[derive(Debug, Default, Clone, Copy)]
pub struct CachePlanner {
    summarizer: HistorySummarizer,
}

impl CachePlanner {
    pub fn new() -> Self {
        Self {
            summarizer: HistorySummarizer::new(),
        }
    }

    /// Select a strategy from the transcript length alone; whether the
    /// system segment actually gets a cache annotation is decided in `plan`.
    pub fn select_strategy(&self, message_count: usize) -> CacheStrategy {
        if message_count <= SIMPLE_MAX_TURNS {
            CacheStrategy::Simple
        } else if message_count < SUMMARIZE_MIN_TURNS {
            CacheStrategy::SlidingWindowLiteral
        } else {
            CacheStrategy::SlidingWindowSummarized
        }
    }

    /// Produce the request plan for one turn. Input is assumed validated
    /// by the assembler; this function is pure.
    pub fn plan(
        &self,
        transcript: &[Turn],
        persona_prompt: &str,
        mode: SessionMode,
        system_tokens: usize,
    ) -> CachePlan {
        let strategy = self.select_strategy(transcript.len());

        let plan = match strategy {
            CacheStrategy::Simple => CachePlan {
                strategy,
                system_segment: Some(SystemSegment {
                    text: persona_prompt.to_string(),
                    // Below the caching floor the annotation is omitted;
                    // this is a deliberate cost trade-off
                    cacheable: system_tokens >= MIN_CACHEABLE_SYSTEM_TOKENS,
                }),
                recent_turns: transcript.to_vec(),
                used_summary: false,
            },
            CacheStrategy::SlidingWindowLiteral | CacheStrategy::SlidingWindowSummarized => {
                let split = transcript.len() - WINDOW_SIZE;
                let (older, recent) = transcript.split_at(split);

                let (older_block, used_summary) =
                    if strategy == CacheStrategy::SlidingWindowSummarized {
                        (self.summarizer.summarize(older), true)
                    } else {
                        (render_dialogue(older), false)
                    };

                CachePlan {
                    strategy,
                    system_segment: Some(SystemSegment {
                        text: build_enhanced_system(persona_prompt, mode, &older_block),
                        // The enhanced segment exceeds the caching floor
                        // by construction
                        cacheable: true,
                    }),
                    recent_turns: recent.to_vec(),
                    used_summary,
                }
            }
        };

        debug!(
            strategy = plan.strategy.as_str(),
            message_count = transcript.len(),
            system_tokens,
            recent = plan.recent_turns.len(),
            used_summary = plan.used_summary,
            "Cache plan selected"
        );

        plan
    }
}

/// Render older turns as a role-labeled dialogue transcript
fn render_dialogue(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role.label(), t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Append the framing paragraph and the older-turns block after the
/// original persona prompt. The wording differs between the two modes but
/// the structural position is identical.
fn build_enhanced_system(persona_prompt: &str, mode: SessionMode, older_block: &str) -> String {
    let framing = match mode {
        SessionMode::Continuation => {
            "You are continuing the same session that is already in progress. \
             Stay consistent with everything established so far and pick up \
             naturally from the most recent exchange."
        }
        SessionMode::WeeklyResumption => {
            "A week has passed since the previous session. You are resuming \
             with the same therapist; carry forward what was established \
             before, acknowledging the time that has passed."
        }
    };

    format!(
        "{}\n\n{}\n\nEarlier conversation:\n{}",
        persona_prompt, framing, older_block
    )
}
