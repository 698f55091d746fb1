use std::time::Duration;

use prometheus::{Encoder, TextEncoder};
use xroute_types::{ChainType, ProcessStatus, ProcessType};

use crate::metrics::*;

/// How a route execution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Completed,
    Failed,
    /// Waiting for user action
    Paused,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    Paused,
    Failed,
}

impl StepOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            StepOutcome::Done => "done",
            StepOutcome::Paused => "paused",
            StepOutcome::Failed => "failed",
        }
    }
}

/// Typed facade over the process-wide metrics
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ROUTE METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_route_started(&self) {
        ROUTES_STARTED.inc();
        ACTIVE_ROUTES.inc();
    }

    /// Record the end of one execution run of a route
    pub fn record_route_finished(&self, outcome: RouteOutcome) {
        match outcome {
            RouteOutcome::Completed => ROUTES_COMPLETED.inc(),
            RouteOutcome::Failed => ROUTES_FAILED.inc(),
            RouteOutcome::Paused => ROUTES_HALTED.with_label_values(&["paused"]).inc(),
            RouteOutcome::Stopped => ROUTES_HALTED.with_label_values(&["stopped"]).inc(),
        }
    }

    /// Registered route count, refreshed on register and deregister
    pub fn set_active_routes(&self, count: usize) {
        ACTIVE_ROUTES.set(count as i64);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STEP METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_step(&self, chain_type: ChainType, outcome: StepOutcome, duration: Duration) {
        let chain_type = chain_type.to_string();
        STEPS
            .with_label_values(&[chain_type.as_str(), outcome.as_str()])
            .inc();
        STEP_DURATION
            .with_label_values(&[chain_type.as_str()])
            .observe(duration.as_secs_f64());
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PROCESS METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_process_transition(&self, process_type: ProcessType, status: ProcessStatus) {
        let process_type = process_type.to_string();
        let status = status.to_string();
        PROCESS_TRANSITIONS
            .with_label_values(&[process_type.as_str(), status.as_str()])
            .inc();
    }

    /// `kind` is "permit", "transaction" or "batch"
    pub fn record_signature(&self, kind: &str) {
        SIGNATURES.with_label_values(&[kind]).inc();
    }

    pub fn record_replacement(&self, reason: &str) {
        REPLACEMENTS.with_label_values(&[reason]).inc();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUOTE SERVICE METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_quote_request(&self, endpoint: &str, success: bool) {
        let outcome = if success { "success" } else { "error" };
        QUOTE_REQUESTS.with_label_values(&[endpoint, outcome]).inc();
    }

    pub fn record_status_poll(&self) {
        STATUS_POLLS.inc();
    }

    /// Prometheus text exposition of every registered metric
    pub fn render(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MetricsError::EncodingError(e.to_string()))?;

        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingError(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("encoding error: {0}")]
    EncodingError(String),
}
