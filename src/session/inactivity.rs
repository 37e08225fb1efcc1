//! Inactivity escalation: per-session warning/termination timers and the
//! periodic hard-ceiling sweep
//!
//! Timers are spawned tasks sleeping on the tokio clock, so tests drive
//! them with a paused runtime. Every timer callback takes the session's
//! state lock before acting, which serializes it against in-flight turn
//! processing on the same session.

use super::models::{SessionId, SessionSnapshot, SessionState, SessionStatus};
use super::registry::{finalize_session, SessionHandle, SessionRegistry, TimerSet};
use crate::metrics::METRICS;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle callbacks injected by the caller. The scheduler only invokes
/// them; delivery is the caller's concern.
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    async fn on_inactivity_warning(
        &self,
        session_id: SessionId,
        user_id: &str,
        snapshot: SessionSnapshot,
    );

    async fn on_inactivity_end(
        &self,
        session_id: SessionId,
        user_id: &str,
        snapshot: SessionSnapshot,
    );
}

/// Hooks that do nothing
pub struct NoopHooks;

#[async_trait]
impl LifecycleHooks for NoopHooks {
    async fn on_inactivity_warning(&self, _: SessionId, _: &str, _: SessionSnapshot) {}
    async fn on_inactivity_end(&self, _: SessionId, _: &str, _: SessionSnapshot) {}
}

/// Timer configuration
#[derive(Debug, Clone)]
pub struct InactivityConfig {
    /// Delay before the inactivity warning (`Tw`)
    pub warning_delay: Duration,
    /// Delay before automatic termination (`Te > Tw`)
    pub termination_delay: Duration,
    /// Hard ceiling on total session duration, enforced by the sweep
    pub max_session_duration: Duration,
    /// Interval of the hard-ceiling sweep
    pub sweep_interval: Duration,
}

impl Default for InactivityConfig {
    fn default() -> Self {
        Self {
            warning_delay: Duration::from_secs(5 * 60),
            termination_delay: Duration::from_secs(10 * 60),
            max_session_duration: Duration::from_secs(2 * 60 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl InactivityConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.termination_delay <= self.warning_delay {
            return Err(crate::error::EngineError::Configuration(
                "termination delay must exceed warning delay".to_string(),
            ));
        }
        Ok(())
    }
}

/// Drives the warning/termination escalation for every live session
pub struct InactivityScheduler {
    registry: Arc<SessionRegistry>,
    hooks: Arc<dyn LifecycleHooks>,
    config: InactivityConfig,
    sweeper: StdMutex<Option<JoinHandle<()>>>,
}

impl InactivityScheduler {
    pub fn new(
        registry: Arc<SessionRegistry>,
        hooks: Arc<dyn LifecycleHooks>,
        config: InactivityConfig,
    ) -> Self {
        Self {
            registry,
            hooks,
            config,
            sweeper: StdMutex::new(None),
        }
    }

    /// Arm the normal two-stage escalation, replacing any pending timer
    /// set. The warning and termination timers are scheduled
    /// independently: termination fires whether or not the warning ran.
    pub fn arm_monitoring(&self, handle: &Arc<SessionHandle>) {
        let warning = self.spawn_warning_timer(handle.id);
        let termination = self.spawn_termination_timer(handle.id);
        handle.install_timers(TimerSet::Monitoring {
            warning,
            termination,
        });
        debug!(session_id = %handle.id, "Monitoring timers armed");
    }

    /// Inbound activity: clear the warning flag, mark Active, re-arm both
    /// timers. The caller already holds the state lock and passes the
    /// borrow in, so flag mutation and re-arming happen under one lock.
    pub fn record_activity(&self, handle: &Arc<SessionHandle>, state: &mut SessionState) {
        // A stale handle to a finalized session must stay terminal
        if state.status.is_terminal() {
            return;
        }
        state.warning_fired = false;
        state.status = SessionStatus::Active;
        state.last_activity_at = chrono::Utc::now();
        self.arm_monitoring(handle);
    }

    /// Pause path: a single timer that invokes the warning hook directly
    /// on expiry. No termination timer is armed here; a subsequent
    /// continue or pause call is required to re-arm normal monitoring.
    /// This asymmetry versus the main path is intentional (see DESIGN.md).
    pub fn arm_pause(
        &self,
        handle: &Arc<SessionHandle>,
        state: &mut SessionState,
        pause_duration: Duration,
    ) {
        if state.status.is_terminal() {
            return;
        }
        state.status = SessionStatus::Paused;
        state.warning_fired = false;

        let registry = Arc::clone(&self.registry);
        let hooks = Arc::clone(&self.hooks);
        let id = handle.id;
        let pause = tokio::spawn(async move {
            tokio::time::sleep(pause_duration).await;
            let Some(handle) = registry.get(id) else { return };
            let snapshot = {
                let mut state = handle.state.lock().await;
                if state.status != SessionStatus::Paused {
                    return;
                }
                state.warning_fired = true;
                SessionSnapshot::from(&*state)
            };
            METRICS.inactivity_warnings.inc();
            info!(session_id = %id, "Pause expired, issuing warning");
            let user_id = snapshot.user_id.clone();
            hooks.on_inactivity_warning(id, &user_id, snapshot).await;
        });

        handle.install_timers(TimerSet::Pause { pause });
        debug!(session_id = %handle.id, "Pause timer armed");
    }

    fn spawn_warning_timer(&self, id: SessionId) -> JoinHandle<()> {
        let delay = self.config.warning_delay;
        let registry = Arc::clone(&self.registry);
        let hooks = Arc::clone(&self.hooks);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(handle) = registry.get(id) else { return };
            let snapshot = {
                let mut state = handle.state.lock().await;
                if state.status != SessionStatus::Active || state.warning_fired {
                    return;
                }
                state.warning_fired = true;
                SessionSnapshot::from(&*state)
            };
            METRICS.inactivity_warnings.inc();
            warn!(session_id = %id, "Inactivity warning issued");
            let user_id = snapshot.user_id.clone();
            hooks.on_inactivity_warning(id, &user_id, snapshot).await;
        })
    }

    fn spawn_termination_timer(&self, id: SessionId) -> JoinHandle<()> {
        let delay = self.config.termination_delay;
        let registry = Arc::clone(&self.registry);
        let hooks = Arc::clone(&self.hooks);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(final_state) = finalize_session(&registry, id, SessionStatus::Ended).await
            else {
                return;
            };
            METRICS.inactivity_terminations.inc();
            warn!(session_id = %id, "Session ended for inactivity");
            let snapshot = SessionSnapshot::from(&final_state);
            hooks
                .on_inactivity_end(id, &final_state.user_id, snapshot)
                .await;
        })
    }

    /// Start the periodic sweep that force-cancels sessions past the hard
    /// duration ceiling, irrespective of recent activity
    pub fn start_sweeper(self: &Arc<Self>) {
        let scheduler = Arc::clone(self);
        let interval = self.config.sweep_interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                scheduler.sweep_once().await;
            }
        });

        let mut guard = self.sweeper.lock().expect("sweeper lock poisoned");
        if let Some(old) = guard.replace(task) {
            old.abort();
        }
    }

    async fn sweep_once(&self) {
        let ceiling = self.config.max_session_duration;
        for handle in self.registry.handles() {
            if handle.age() <= ceiling {
                continue;
            }
            let Some(final_state) =
                finalize_session(&self.registry, handle.id, SessionStatus::Cancelled).await
            else {
                continue;
            };
            METRICS.inactivity_terminations.inc();
            warn!(session_id = %handle.id, "Session exceeded duration ceiling, cancelled");
            let snapshot = SessionSnapshot::from(&final_state);
            self.hooks
                .on_inactivity_end(handle.id, &final_state.user_id, snapshot)
                .await;
        }
    }

    /// Abort the sweep task; per-session timers are aborted by the
    /// registry's own shutdown
    pub fn shutdown(&self) {
        let mut guard = self.sweeper.lock().expect("sweeper lock poisoned");
        if let Some(task) = guard.take() {
            task.abort();
        }
    }
}
