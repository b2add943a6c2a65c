//! Prometheus metrics for the finalization subsystem.
//!
//! Metrics are domain-specific gauges mirroring the aggregator's view
//! counters and the orchestrator's stage state. Use traces for event-level
//! granularity during investigations.

use prometheus::{register_gauge, register_int_gauge, Gauge, IntGauge};
use std::sync::OnceLock;

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Finalization metrics.
pub struct Metrics {
    /// Number of steps currently tracked by the multi-step aggregator.
    pub active_steps: IntGauge,
    /// Point component of the minimum tracked step identifier.
    pub finalization_point: IntGauge,
    /// Round component of the minimum tracked step identifier.
    pub finalization_round: IntGauge,
    /// Sub-round component of the minimum tracked step identifier.
    pub finalization_sub_round: IntGauge,
    /// The orchestrator's current sub-round.
    pub orchestrator_sub_round: IntGauge,
    /// Start time of the current sub-round, in seconds since service start
    /// (zero while unset).
    pub orchestrator_sub_round_start_seconds: Gauge,
}

/// The process-wide finalization metrics.
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(|| Metrics {
        active_steps: register_int_gauge!(
            "finalization_active_steps",
            "Steps tracked by the multi-step aggregator"
        )
        .expect("metric registration"),
        finalization_point: register_int_gauge!(
            "finalization_point",
            "Point component of the minimum tracked step"
        )
        .expect("metric registration"),
        finalization_round: register_int_gauge!(
            "finalization_round",
            "Round component of the minimum tracked step"
        )
        .expect("metric registration"),
        finalization_sub_round: register_int_gauge!(
            "finalization_sub_round",
            "Sub-round component of the minimum tracked step"
        )
        .expect("metric registration"),
        orchestrator_sub_round: register_int_gauge!(
            "finalization_orchestrator_sub_round",
            "Current orchestrator sub-round"
        )
        .expect("metric registration"),
        orchestrator_sub_round_start_seconds: register_gauge!(
            "finalization_orchestrator_sub_round_start_seconds",
            "Start time of the current sub-round"
        )
        .expect("metric registration"),
    })
}
