//! Integration tests for the session engine
//!
//! These tests drive the full turn-processing path against a mock
//! completion endpoint and verify the cache-budgeting behavior end to
//! end.

use session_engine::context::assembler::{ContextAssembler, RequestDefaults};
use session_engine::context::token_estimator::HeuristicEstimator;
use session_engine::store::TurnPair;
use session_engine::upstream::models::UsageCounters;
use session_engine::{
    CacheStrategy, Config, InMemoryTranscriptStore, NoopHooks, Persona, Role, SessionEngine,
    SessionId, SessionMode, TranscriptStore, Turn,
};
use std::sync::Arc;

fn persona() -> Persona {
    Persona::new("p-jordan", "Jordan", "You are Jordan, a 34-year-old patient.").unwrap()
}

fn test_config(api_url: &str) -> Config {
    let mut config = Config::default();
    config.upstream.api_url = api_url.to_string();
    config.rate_limit.max_requests = 100;
    config
}

async fn seed_store(store: &InMemoryTranscriptStore, session_id: SessionId, pairs: usize) {
    for i in 0..pairs {
        store
            .append(
                session_id,
                TurnPair {
                    operator: Turn::new(Role::Therapist, format!("How was day {}?", i)),
                    reply: Turn::new(Role::Patient, format!("Day {} was stressful at work.", i)),
                },
                UsageCounters::default(),
            )
            .await
            .unwrap();
    }
}

async fn mock_completion(server: &mut mockito::ServerGuard, text: &str) -> mockito::Mock {
    server
        .mock("POST", "/")
        .with_status(200)
        .with_body(
            serde_json::json!({
                "content": [{"type": "text", "text": text}],
                "usage": {
                    "input_tokens": 400,
                    "output_tokens": 25,
                    "cache_creation_input_tokens": 300,
                    "cache_read_input_tokens": 0
                }
            })
            .to_string(),
        )
        .expect_at_least(1)
        .create_async()
        .await
}

#[tokio::test]
async fn long_session_turn_uses_summarized_window() {
    let mut server = mockito::Server::new_async().await;
    let _mock = mock_completion(&mut server, "It helps to talk about it.").await;

    let store = Arc::new(InMemoryTranscriptStore::new());
    let session_id = SessionId::new();
    // 16 persisted pairs = 32 prior turns
    seed_store(&store, session_id, 16).await;

    let engine = SessionEngine::new(
        &test_config(&server.url()),
        Arc::clone(&store) as Arc<dyn TranscriptStore>,
        Arc::new(NoopHooks),
    )
    .unwrap();

    let id = engine
        .resume_session(session_id, "user-1", persona())
        .await
        .unwrap();
    assert_eq!(id, session_id);

    let reply = engine.process_turn(id, "And how are you today?").await.unwrap();
    assert_eq!(reply.strategy, CacheStrategy::SlidingWindowSummarized);
    assert!(reply.used_summary);
    assert_eq!(reply.usage.cache_creation_input_tokens, 300);

    // 32 prior + operator + reply
    let snapshot = engine.snapshot(id).await.unwrap();
    assert_eq!(snapshot.turn_count, 34);
    engine.shutdown();
}

#[test]
fn long_transcript_payload_shape() {
    let assembler = ContextAssembler::new(Arc::new(HeuristicEstimator), RequestDefaults::default());

    // 32 prior turns plus one new inbound turn
    let mut transcript: Vec<Turn> = (0..32)
        .map(|i| {
            if i % 2 == 0 {
                Turn::new(Role::Therapist, format!("Question {}", i))
            } else {
                Turn::new(Role::Patient, format!("I felt anxious about work on day {}.", i))
            }
        })
        .collect();
    transcript.push(Turn::new(Role::Therapist, "And how are you today?"));

    let request = assembler
        .assemble(&transcript, "You are Jordan.", SessionMode::Continuation)
        .unwrap();

    // Exactly one cacheable system segment containing generated summary
    // text distinct from the literal transcript
    assert_eq!(request.system.len(), 1);
    assert!(request.system[0].cache_control.is_some());
    assert!(request.system[0].text.contains("Segment 1: discussed"));
    assert!(request.system[0].text.contains("anxious"));
    assert!(!request.system[0].text.contains("Question 0"));

    // Exactly six literal messages, none carrying a cache annotation
    assert_eq!(request.messages.len(), 6);
    assert_eq!(request.messages[5].content, "And how are you today?");
    let json = serde_json::to_value(&request).unwrap();
    for message in json["messages"].as_array().unwrap() {
        assert!(message.get("cache_control").is_none());
    }
}

#[tokio::test]
async fn short_session_sends_full_transcript_uncached() {
    let mut server = mockito::Server::new_async().await;
    let _mock = mock_completion(&mut server, "Hello.").await;

    let store = Arc::new(InMemoryTranscriptStore::new());
    let engine = SessionEngine::new(
        &test_config(&server.url()),
        Arc::clone(&store) as Arc<dyn TranscriptStore>,
        Arc::new(NoopHooks),
    )
    .unwrap();

    let id = engine.create_session("user-1", persona()).await.unwrap();
    for turn in ["Hi Jordan.", "How was your week?"] {
        let reply = engine.process_turn(id, turn).await.unwrap();
        assert_eq!(reply.strategy, CacheStrategy::Simple);
        assert!(!reply.used_summary);
    }
    engine.shutdown();
}

#[tokio::test]
async fn transcript_round_trips_through_store() {
    let store = InMemoryTranscriptStore::new();
    let session_id = SessionId::new();
    seed_store(&store, session_id, 7).await;

    let turns = store.load_all(session_id).await.unwrap();
    assert_eq!(turns.len(), 14);
    for (i, pair) in turns.chunks(2).enumerate() {
        assert_eq!(pair[0].content, format!("How was day {}?", i));
        assert_eq!(pair[0].role, Role::Therapist);
        assert_eq!(pair[1].role, Role::Patient);
    }
}

#[tokio::test]
async fn one_live_session_per_user() {
    let server = mockito::Server::new_async().await;
    let store = Arc::new(InMemoryTranscriptStore::new());
    let engine = SessionEngine::new(
        &test_config(&server.url()),
        Arc::clone(&store) as Arc<dyn TranscriptStore>,
        Arc::new(NoopHooks),
    )
    .unwrap();

    let first = engine.create_session("user-1", persona()).await.unwrap();
    assert!(engine.create_session("user-1", persona()).await.is_err());

    engine.end_session(first).await.unwrap();
    assert!(engine.create_session("user-1", persona()).await.is_ok());
    engine.shutdown();
}
