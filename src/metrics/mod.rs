//! Metrics collection for observability

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_with_registry, Counter, CounterVec, Histogram, Opts, Registry,
};
use std::sync::Arc;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> =
    Lazy::new(|| Arc::new(Metrics::new().expect("Failed to initialize metrics")));

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Context planning
    pub cache_plans: CounterVec,
    pub summarizations: Counter,

    // Admission control
    pub rate_limit_checks: CounterVec,

    // Session lifecycle
    pub sessions_started: Counter,
    pub sessions_ended: Counter,
    pub inactivity_warnings: Counter,
    pub inactivity_terminations: Counter,

    // Upstream usage
    pub upstream_input_tokens: Counter,
    pub upstream_output_tokens: Counter,
    pub upstream_cache_creation_tokens: Counter,
    pub upstream_cache_read_tokens: Counter,
    pub turn_duration: Histogram,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let registry = Registry::new();

        let cache_plans = register_counter_vec_with_registry!(
            Opts::new("cache_plans_total", "Cache plans produced, by strategy"),
            &["strategy"],
            registry
        )?;

        let summarizations = register_counter_with_registry!(
            Opts::new("summarizations_total", "History summarizations performed"),
            registry
        )?;

        let rate_limit_checks = register_counter_vec_with_registry!(
            Opts::new("rate_limit_checks_total", "Admission checks, by outcome"),
            &["outcome"],
            registry
        )?;

        let sessions_started = register_counter_with_registry!(
            Opts::new("sessions_started_total", "Sessions created or resumed"),
            registry
        )?;

        let sessions_ended = register_counter_with_registry!(
            Opts::new("sessions_ended_total", "Sessions ended or cancelled"),
            registry
        )?;

        let inactivity_warnings = register_counter_with_registry!(
            Opts::new("inactivity_warnings_total", "Inactivity warnings issued"),
            registry
        )?;

        let inactivity_terminations = register_counter_with_registry!(
            Opts::new(
                "inactivity_terminations_total",
                "Sessions terminated by the inactivity escalation or sweep"
            ),
            registry
        )?;

        let upstream_input_tokens = register_counter_with_registry!(
            Opts::new("upstream_input_tokens_total", "Input tokens billed upstream"),
            registry
        )?;

        let upstream_output_tokens = register_counter_with_registry!(
            Opts::new("upstream_output_tokens_total", "Output tokens billed upstream"),
            registry
        )?;

        let upstream_cache_creation_tokens = register_counter_with_registry!(
            Opts::new(
                "upstream_cache_creation_tokens_total",
                "Tokens written to the provider prompt cache"
            ),
            registry
        )?;

        let upstream_cache_read_tokens = register_counter_with_registry!(
            Opts::new(
                "upstream_cache_read_tokens_total",
                "Tokens served from the provider prompt cache"
            ),
            registry
        )?;

        let turn_duration = register_histogram_with_registry!(
            prometheus::HistogramOpts::new(
                "turn_duration_seconds",
                "End-to-end duration of one processed turn"
            ),
            registry
        )?;

        Ok(Self {
            registry,
            cache_plans,
            summarizations,
            rate_limit_checks,
            sessions_started,
            sessions_ended,
            inactivity_warnings,
            inactivity_terminations,
            upstream_input_tokens,
            upstream_output_tokens,
            upstream_cache_creation_tokens,
            upstream_cache_read_tokens,
            turn_duration,
        })
    }

    /// Get the prometheus registry for exposition
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
