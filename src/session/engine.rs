//! Per-turn orchestration: admission, transcript append, context
//! assembly, upstream call, reply append, persistence
//!
//! Each session's state lock is held for the whole turn, so turns within
//! a session are processed and appended in arrival order and timer
//! callbacks cannot fire mid-turn. No cross-session ordering is imposed.

use super::inactivity::{InactivityScheduler, LifecycleHooks};
use super::models::{Persona, SessionId, SessionSnapshot, SessionState, SessionStatus};
use super::registry::{finalize_session, SessionRegistry};
use crate::config::Config;
use crate::context::assembler::ContextAssembler;
use crate::context::models::{CacheStrategy, Role, Turn};
use crate::context::token_estimator::default_estimator;
use crate::error::{EngineError, Result};
use crate::metrics::METRICS;
use crate::middleware::rate_limiter::RateLimiter;
use crate::store::{TranscriptStore, TurnPair};
use crate::upstream::client::CompletionClient;
use crate::upstream::models::UsageCounters;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Result of one processed turn
#[derive(Debug, Clone)]
pub struct EngineReply {
    pub session_id: SessionId,
    pub text: String,
    pub strategy: CacheStrategy,
    pub used_summary: bool,
    pub usage: UsageCounters,
}

/// The conversational-session engine. Construct once per process and
/// share by reference; all state lives in injected collaborators rather
/// than hidden globals.
pub struct SessionEngine {
    registry: Arc<SessionRegistry>,
    scheduler: Arc<InactivityScheduler>,
    assembler: ContextAssembler,
    client: CompletionClient,
    store: Arc<dyn TranscriptStore>,
    rate_limiter: Arc<RateLimiter>,
}

impl SessionEngine {
    pub fn new(
        config: &Config,
        store: Arc<dyn TranscriptStore>,
        hooks: Arc<dyn LifecycleHooks>,
    ) -> Result<Self> {
        let inactivity = config.inactivity_config();
        inactivity.validate()?;

        let registry = Arc::new(SessionRegistry::new());
        let scheduler = Arc::new(InactivityScheduler::new(
            Arc::clone(&registry),
            hooks,
            inactivity,
        ));
        let assembler = ContextAssembler::new(default_estimator(), config.request_defaults());
        let client = CompletionClient::new(config.upstream_config())?;
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_config()));

        Ok(Self {
            registry,
            scheduler,
            assembler,
            client,
            store,
            rate_limiter,
        })
    }

    /// Start the background sweep tasks (duration ceiling, rate-limiter
    /// memory bound). Requires a running tokio runtime.
    pub fn start(&self) {
        self.scheduler.start_sweeper();
        self.rate_limiter.start_sweeper();
    }

    /// Create a fresh session for a user. Refused when the user already
    /// has a live session.
    pub async fn create_session(&self, user_id: &str, persona: Persona) -> Result<SessionId> {
        let state = SessionState::new(user_id, persona);
        let handle = self.registry.insert(state)?;
        self.scheduler.arm_monitoring(&handle);
        METRICS.sessions_started.inc();
        info!(session_id = %handle.id, user_id, "Session started");
        Ok(handle.id)
    }

    /// Reconstruct a session after a restart by reloading its transcript
    /// from the persistent store. A fresh state machine: Active, fresh
    /// timers, week-gap framing.
    pub async fn resume_session(
        &self,
        session_id: SessionId,
        user_id: &str,
        persona: Persona,
    ) -> Result<SessionId> {
        let transcript = self.store.load_all(session_id).await?;
        let state = SessionState::resume(session_id, user_id, persona, transcript);
        let handle = self.registry.insert(state)?;
        self.scheduler.arm_monitoring(&handle);
        METRICS.sessions_started.inc();
        info!(session_id = %handle.id, user_id, "Session resumed from store");
        Ok(handle.id)
    }

    /// Process one inbound operator turn to completion
    pub async fn process_turn(&self, session_id: SessionId, text: &str) -> Result<EngineReply> {
        if text.trim().is_empty() {
            return Err(EngineError::Validation(
                "turn content must not be empty".to_string(),
            ));
        }

        let handle = self.registry.get_or_err(session_id)?;
        if !self.rate_limiter.check(&handle.user_id) {
            return Err(EngineError::RateLimited(handle.user_id.clone()));
        }

        let timer = METRICS.turn_duration.start_timer();

        // Held to completion: serializes turns within the session and
        // keeps timer callbacks out until the turn is done
        let mut state = handle.state.lock().await;

        // The session may have been finalized between the registry lookup
        // and acquiring the lock; a terminal session is never revived
        if state.status.is_terminal() {
            return Err(EngineError::State(format!(
                "session {} is already {:?}",
                session_id, state.status
            )));
        }

        // Inbound activity resets the escalation; a paused session
        // implicitly resumes
        self.scheduler.record_activity(&handle, &mut state);

        let operator = Turn::new(Role::Therapist, text);
        state.record_turn(operator.clone());

        let plan = self.assembler.plan(
            &state.transcript,
            &state.persona.system_prompt,
            state.mode,
        )?;
        let request = self.assembler.request_from_plan(&plan);

        // Upstream failure leaves the operator turn appended; the caller
        // decides whether to retry
        let response = self.client.complete(&request).await?;

        let reply_text = response.text();
        let reply = Turn::new(Role::Patient, reply_text.clone());
        state.record_turn(reply.clone());

        // Persistence failures are non-fatal to the live conversation
        if let Err(e) = self
            .store
            .append(
                session_id,
                TurnPair { operator, reply },
                response.usage.clone(),
            )
            .await
        {
            warn!(%session_id, error = %e, "Transcript persistence failed; continuing in memory");
        }

        timer.observe_duration();

        Ok(EngineReply {
            session_id,
            text: reply_text,
            strategy: plan.strategy,
            used_summary: plan.used_summary,
            usage: response.usage,
        })
    }

    /// Explicit continue: cancel pending timers and restart normal
    /// two-timer monitoring
    pub async fn continue_session(&self, session_id: SessionId) -> Result<()> {
        let handle = self.registry.get_or_err(session_id)?;
        let mut state = handle.state.lock().await;
        if state.status.is_terminal() {
            return Err(EngineError::State(format!(
                "session {} is already {:?}",
                session_id, state.status
            )));
        }
        self.scheduler.record_activity(&handle, &mut state);
        Ok(())
    }

    /// Explicit pause: a single timer invokes the warning hook on expiry;
    /// normal monitoring stays disarmed until a further continue or pause
    pub async fn pause_session(&self, session_id: SessionId, duration: Duration) -> Result<()> {
        let handle = self.registry.get_or_err(session_id)?;
        let mut state = handle.state.lock().await;
        if state.status.is_terminal() {
            return Err(EngineError::State(format!(
                "session {} is already {:?}",
                session_id, state.status
            )));
        }
        self.scheduler.arm_pause(&handle, &mut state, duration);
        Ok(())
    }

    /// End a session explicitly, cancelling its timers and removing it
    /// from the registry
    pub async fn end_session(&self, session_id: SessionId) -> Result<SessionSnapshot> {
        let final_state = finalize_session(&self.registry, session_id, SessionStatus::Ended)
            .await
            .ok_or_else(|| {
                EngineError::State(format!("unknown or ended session {}", session_id))
            })?;
        METRICS.sessions_ended.inc();
        info!(%session_id, "Session ended");
        Ok(SessionSnapshot::from(&final_state))
    }

    /// Snapshot of a live session
    pub async fn snapshot(&self, session_id: SessionId) -> Result<SessionSnapshot> {
        let handle = self.registry.get_or_err(session_id)?;
        let state = handle.state.lock().await;
        Ok(SessionSnapshot::from(&*state))
    }

    /// Number of live sessions
    pub fn live_sessions(&self) -> usize {
        self.registry.len()
    }

    /// Cancel every outstanding timer and background task and drop all
    /// live session state
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        self.rate_limiter.shutdown();
        self.registry.shutdown();
        info!("Session engine shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::inactivity::NoopHooks;
    use crate::store::InMemoryTranscriptStore;

    fn test_config(api_url: &str) -> Config {
        let mut config = Config::default();
        config.upstream.api_url = api_url.to_string();
        config.rate_limit.max_requests = 100;
        config
    }

    fn engine_with(api_url: &str) -> (SessionEngine, Arc<InMemoryTranscriptStore>) {
        let store = Arc::new(InMemoryTranscriptStore::new());
        let engine = SessionEngine::new(
            &test_config(api_url),
            Arc::clone(&store) as Arc<dyn TranscriptStore>,
            Arc::new(NoopHooks),
        )
        .unwrap();
        (engine, store)
    }

    fn persona() -> Persona {
        Persona::new("p1", "Jordan", "You are Jordan, a thoughtful patient.").unwrap()
    }

    async fn mock_reply(server: &mut mockito::ServerGuard, text: &str) -> mockito::Mock {
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "content": [{"type": "text", "text": text}],
                    "usage": {
                        "input_tokens": 50,
                        "output_tokens": 10,
                        "cache_creation_input_tokens": 0,
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
    async fn test_turn_appends_pair_and_persists() {
        let mut server = mockito::Server::new_async().await;
        let _mock = mock_reply(&mut server, "I had a hard week.").await;
        let (engine, store) = engine_with(&server.url());

        let id = engine.create_session("user-1", persona()).await.unwrap();
        let reply = engine.process_turn(id, "How are you?").await.unwrap();

        assert_eq!(reply.text, "I had a hard week.");
        assert_eq!(reply.strategy, CacheStrategy::Simple);
        assert_eq!(store.pair_count(id), 1);

        let snapshot = engine.snapshot(id).await.unwrap();
        assert_eq!(snapshot.turn_count, 2);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_turn_on_unknown_session_fails_fast() {
        let server = mockito::Server::new_async().await;
        let (engine, _) = engine_with(&server.url());
        let err = engine.process_turn(SessionId::new(), "hello").await.unwrap_err();
        assert!(matches!(err, EngineError::State(_)));
    }

    #[tokio::test]
    async fn test_empty_turn_is_rejected_before_append() {
        let server = mockito::Server::new_async().await;
        let (engine, store) = engine_with(&server.url());
        let id = engine.create_session("user-1", persona()).await.unwrap();
        let err = engine.process_turn(id, "   ").await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(store.pair_count(id), 0);
        assert_eq!(engine.snapshot(id).await.unwrap().turn_count, 0);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_rate_limit_gates_turns() {
        let mut server = mockito::Server::new_async().await;
        let _mock = mock_reply(&mut server, "ok").await;
        let store = Arc::new(InMemoryTranscriptStore::new());
        let mut config = test_config(&server.url());
        config.rate_limit.max_requests = 2;
        let engine = SessionEngine::new(
            &config,
            Arc::clone(&store) as Arc<dyn TranscriptStore>,
            Arc::new(NoopHooks),
        )
        .unwrap();

        let id = engine.create_session("user-1", persona()).await.unwrap();
        engine.process_turn(id, "one").await.unwrap();
        engine.process_turn(id, "two").await.unwrap();
        let err = engine.process_turn(id, "three").await.unwrap_err();
        assert!(matches!(err, EngineError::RateLimited(_)));
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_upstream_failure_keeps_operator_turn() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;
        let (engine, store) = engine_with(&server.url());

        let id = engine.create_session("user-1", persona()).await.unwrap();
        let err = engine.process_turn(id, "Hello?").await.unwrap_err();
        assert!(matches!(err, EngineError::Upstream(_)));
        // The appended operator turn is never silently dropped
        assert_eq!(engine.snapshot(id).await.unwrap().turn_count, 1);
        assert_eq!(store.pair_count(id), 0);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_turn_on_terminal_state_fails_without_revival() {
        let server = mockito::Server::new_async().await;
        let (engine, store) = engine_with(&server.url());
        let id = engine.create_session("user-1", persona()).await.unwrap();

        // A termination can mark the state terminal after this turn has
        // fetched the handle but before it takes the lock; model the
        // window by marking the live state directly
        {
            let handle = engine.registry.get_or_err(id).unwrap();
            handle.state.lock().await.status = SessionStatus::Ended;
        }

        let err = engine.process_turn(id, "hello?").await.unwrap_err();
        assert!(matches!(err, EngineError::State(_)));

        let handle = engine.registry.get_or_err(id).unwrap();
        assert_eq!(handle.state.lock().await.status, SessionStatus::Ended);
        assert_eq!(store.pair_count(id), 0);

        let err = engine.continue_session(id).await.unwrap_err();
        assert!(matches!(err, EngineError::State(_)));
        let err = engine
            .pause_session(id, Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::State(_)));
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_end_session_then_operations_fail() {
        let server = mockito::Server::new_async().await;
        let (engine, _) = engine_with(&server.url());
        let id = engine.create_session("user-1", persona()).await.unwrap();

        let snapshot = engine.end_session(id).await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Ended);
        assert_eq!(engine.live_sessions(), 0);

        let err = engine.end_session(id).await.unwrap_err();
        assert!(matches!(err, EngineError::State(_)));
        engine.shutdown();
    }
}
