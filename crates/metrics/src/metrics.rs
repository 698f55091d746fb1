use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

lazy_static! {
    // ═══════════════════════════════════════════════════════════════════════════
    // ROUTE METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Routes handed to the registry
    pub static ref ROUTES_STARTED: IntCounter = register_int_counter!(
        "xroute_routes_started_total",
        "Total number of route executions started"
    )
    .unwrap();

    /// Routes that reached DONE
    pub static ref ROUTES_COMPLETED: IntCounter = register_int_counter!(
        "xroute_routes_completed_total",
        "Total number of routes completed"
    )
    .unwrap();

    pub static ref ROUTES_FAILED: IntCounter = register_int_counter!(
        "xroute_routes_failed_total",
        "Total number of route executions that failed"
    )
    .unwrap();

    /// Routes paused for user action or stopped
    pub static ref ROUTES_HALTED: IntCounterVec = register_int_counter_vec!(
        "xroute_routes_halted_total",
        "Total number of route executions halted before completion",
        &["reason"]
    )
    .unwrap();

    pub static ref ACTIVE_ROUTES: IntGauge = register_int_gauge!(
        "xroute_routes_active",
        "Current number of registered routes"
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // STEP METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub static ref STEPS: IntCounterVec = register_int_counter_vec!(
        "xroute_steps_total",
        "Total steps executed by chain type and outcome",
        &["chain_type", "outcome"]
    )
    .unwrap();

    /// Step wall clock duration in seconds
    pub static ref STEP_DURATION: HistogramVec = register_histogram_vec!(
        "xroute_step_duration_seconds",
        "Step execution duration in seconds",
        &["chain_type"],
        vec![1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0, 3600.0]
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // PROCESS METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub static ref PROCESS_TRANSITIONS: IntCounterVec = register_int_counter_vec!(
        "xroute_process_transitions_total",
        "Process status transitions by process type and status",
        &["process_type", "status"]
    )
    .unwrap();

    pub static ref SIGNATURES: IntCounterVec = register_int_counter_vec!(
        "xroute_signatures_total",
        "Signature requests sent to wallets",
        &["kind"]
    )
    .unwrap();

    pub static ref REPLACEMENTS: IntCounterVec = register_int_counter_vec!(
        "xroute_replacements_total",
        "Detected transaction replacements by reason",
        &["reason"]
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // QUOTE SERVICE METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub static ref QUOTE_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "xroute_quote_requests_total",
        "Quote service requests by endpoint and outcome",
        &["endpoint", "outcome"]
    )
    .unwrap();

    pub static ref STATUS_POLLS: IntCounter = register_int_counter!(
        "xroute_status_polls_total",
        "Destination status polls"
    )
    .unwrap();
}
