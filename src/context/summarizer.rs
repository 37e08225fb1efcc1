//! Lossy summarization of older turns into a short natural-language digest
//!
//! Intentionally a simple bag-of-words classifier: each chunk of turns is
//! reduced to the discussed themes plus the patient's dominant emotional
//! tone. Deterministic, synchronous, no I/O.

use super::models::{Role, Turn};
use tracing::debug;

/// Number of consecutive turns folded into one summary segment
const CHUNK_SIZE: usize = 8;

/// Returned for an empty run of turns
const EMPTY_HISTORY_PLACEHOLDER: &str =
    "The session has just begun; there is no earlier conversation to summarize.";

/// Fallback theme phrase when no topic keywords match
const GENERIC_THEME: &str = "general life circumstances";

/// Fallback emotional tone when no emotion keywords match
const MIXED_EMOTION: &str = "mixed";

/// Ordered topic table; every matching entry is included
const TOPIC_TABLE: &[(&str, &[&str])] = &[
    (
        "work and career stress",
        &["work", "job", "boss", "career", "office", "deadline", "coworker", "workload"],
    ),
    (
        "relationships",
        &[
            "relationship", "partner", "wife", "husband", "friend", "family", "mother",
            "father", "marriage", "divorce",
        ],
    ),
    (
        "difficult emotions",
        &["feel", "feeling", "emotion", "mood", "overwhelmed", "cry", "crying"],
    ),
    (
        "health concerns",
        &["sleep", "health", "eating", "appetite", "exercise", "sick", "pain", "headache"],
    ),
    (
        "personal growth",
        &["goal", "change", "improve", "progress", "learn", "habit", "growth", "better myself"],
    ),
];

/// Ordered emotion table; the first matching entry wins
const EMOTION_TABLE: &[(&str, &[&str])] = &[
    ("anxious", &["anxious", "anxiety", "worried", "nervous", "panic", "stressed", "stress"]),
    ("sad", &["sad", "down", "depressed", "hopeless", "cry", "crying", "lonely", "empty"]),
    ("angry", &["angry", "frustrated", "mad", "irritated", "annoyed", "furious"]),
    ("positive", &["better", "good", "happy", "hopeful", "grateful", "calm", "relieved"]),
    ("tired", &["tired", "exhausted", "drained", "fatigued", "worn out"]),
];

/// Deterministic keyword-table summarizer for older turns
#[derive(Debug, Default, Clone, Copy)]
pub struct HistorySummarizer;

impl HistorySummarizer {
    pub fn new() -> Self {
        Self
    }

    /// Compress a run of older turns into segment sentences.
    /// Empty input yields a fixed placeholder; otherwise `ceil(n / 8)`
    /// sentences joined with a space.
    pub fn summarize(&self, turns: &[Turn]) -> String {
        if turns.is_empty() {
            return EMPTY_HISTORY_PLACEHOLDER.to_string();
        }

        let sentences: Vec<String> = turns
            .chunks(CHUNK_SIZE)
            .enumerate()
            .map(|(i, chunk)| self.summarize_chunk(i + 1, chunk))
            .collect();

        debug!(
            "Summarized {} turns into {} segments",
            turns.len(),
            sentences.len()
        );

        sentences.join(" ")
    }

    fn summarize_chunk(&self, index: usize, chunk: &[Turn]) -> String {
        let themes = self.detect_themes(chunk);
        let emotion = self.detect_emotion(chunk);
        format!(
            "Segment {}: discussed {}. Emotional state: {}.",
            index, themes, emotion
        )
    }

    /// Match the topic table against all turn content in the chunk;
    /// every matching topic is included in table order
    fn detect_themes(&self, chunk: &[Turn]) -> String {
        let combined = chunk
            .iter()
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        let matched: Vec<&str> = TOPIC_TABLE
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| combined.contains(k)))
            .map(|(topic, _)| *topic)
            .collect();

        if matched.is_empty() {
            GENERIC_THEME.to_string()
        } else {
            matched.join(", ")
        }
    }

    /// Match the emotion table against patient turns only; first table
    /// entry that matches any keyword wins
    fn detect_emotion(&self, chunk: &[Turn]) -> &'static str {
        let patient_text = chunk
            .iter()
            .filter(|t| t.role == Role::Patient)
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        EMOTION_TABLE
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| patient_text.contains(k)))
            .map(|(emotion, _)| *emotion)
            .unwrap_or(MIXED_EMOTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: Role, content: &str) -> Turn {
        Turn::new(role, content)
    }

    #[test]
    fn test_empty_history_placeholder() {
        let summarizer = HistorySummarizer::new();
        assert_eq!(summarizer.summarize(&[]), EMPTY_HISTORY_PLACEHOLDER);
    }

    #[test]
    fn test_segment_count_is_ceil_of_chunks() {
        let summarizer = HistorySummarizer::new();
        let turns: Vec<Turn> = (0..17)
            .map(|i| turn(Role::Therapist, &format!("turn {}", i)))
            .collect();
        let summary = summarizer.summarize(&turns);
        // 17 turns -> 3 segments
        assert_eq!(summary.matches("Segment").count(), 3);
        assert!(summary.contains("Segment 1:"));
        assert!(summary.contains("Segment 3:"));
    }

    #[test]
    fn test_theme_detection_includes_all_matches() {
        let summarizer = HistorySummarizer::new();
        let turns = vec![
            turn(Role::Therapist, "How is your job going?"),
            turn(Role::Patient, "Work is rough and my wife and I keep arguing."),
        ];
        let summary = summarizer.summarize(&turns);
        assert!(summary.contains("work and career stress"));
        assert!(summary.contains("relationships"));
    }

    #[test]
    fn test_generic_theme_when_nothing_matches() {
        let summarizer = HistorySummarizer::new();
        let turns = vec![turn(Role::Patient, "The weather was odd on Tuesday.")];
        let summary = summarizer.summarize(&turns);
        assert!(summary.contains(GENERIC_THEME));
    }

    #[test]
    fn test_emotion_first_match_wins_in_table_order() {
        let summarizer = HistorySummarizer::new();
        // "worried" (anxious) and "sad" both present; anxious is earlier
        // in the table so it wins
        let turns = vec![turn(Role::Patient, "I have been worried and sad all week.")];
        let summary = summarizer.summarize(&turns);
        assert!(summary.contains("Emotional state: anxious."));
    }

    #[test]
    fn test_emotion_ignores_therapist_turns() {
        let summarizer = HistorySummarizer::new();
        let turns = vec![
            turn(Role::Therapist, "You sound anxious about this."),
            turn(Role::Patient, "Honestly I slept fine and went for a walk."),
        ];
        let summary = summarizer.summarize(&turns);
        assert!(summary.contains("Emotional state: mixed."));
    }

    #[test]
    fn test_each_segment_sentence_is_well_formed() {
        let summarizer = HistorySummarizer::new();
        let turns: Vec<Turn> = (0..9)
            .map(|i| {
                turn(
                    if i % 2 == 0 { Role::Therapist } else { Role::Patient },
                    "I feel tired because of work deadlines.",
                )
            })
            .collect();
        let summary = summarizer.summarize(&turns);
        for segment in ["Segment 1: discussed", "Segment 2: discussed"] {
            assert!(summary.contains(segment));
        }
        assert!(summary.contains("Emotional state:"));
    }
}
