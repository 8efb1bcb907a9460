// remediation-engine-rs/src/thresholds.rs
// Threshold resolution: static limits, baseline-relative dynamic limits,
// or a per-field hybrid merge. Total over well-typed inputs; there are no
// error conditions here.

use pipeline_types::MetricsSnapshot;

use crate::config::{HybridMergeStrategy, StaticThresholds, ThresholdConfig, ThresholdMode};

/// Concrete numeric thresholds for one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedThresholds {
    pub success_rate_floor: f64,
    pub success_rate_warning_floor: f64,
    pub latency_p50_ceiling_ms: f64,
    pub latency_p95_ceiling_ms: f64,
    pub latency_p99_ceiling_ms: f64,
    pub retry_ratio_ceiling: f64,
    /// Allowed retry amplification relative to baseline.
    pub retry_amplification_limit: f64,
}

/// Resolve the configured thresholds against an optional baseline.
pub fn resolve(config: &ThresholdConfig, baseline: Option<&MetricsSnapshot>) -> ResolvedThresholds {
    match config.mode {
        ThresholdMode::Static => from_static(config),
        ThresholdMode::Dynamic => match derive_dynamic(config, baseline) {
            Some(resolved) => resolved,
            // Insufficient baseline sample: fall back to the static limits.
            None => from_static(config),
        },
        ThresholdMode::Hybrid => {
            let static_limits = from_static(config);
            match derive_dynamic(config, baseline) {
                Some(dynamic) => merge(&static_limits, &dynamic, config.merge_strategy),
                None => static_limits,
            }
        }
    }
}

fn from_static(config: &ThresholdConfig) -> ResolvedThresholds {
    let s: &StaticThresholds = &config.static_limits;
    ResolvedThresholds {
        success_rate_floor: s.success_rate_floor,
        success_rate_warning_floor: s.success_rate_warning_floor,
        latency_p50_ceiling_ms: s.latency_p50_ceiling_ms,
        latency_p95_ceiling_ms: s.latency_p95_ceiling_ms,
        latency_p99_ceiling_ms: s.latency_p99_ceiling_ms,
        retry_ratio_ceiling: s.retry_ratio_ceiling,
        retry_amplification_limit: config.sensitivity.retry_multiplier,
    }
}

/// Derive baseline-relative thresholds, or None when the baseline is
/// missing or carries too few transactions to trust.
fn derive_dynamic(
    config: &ThresholdConfig,
    baseline: Option<&MetricsSnapshot>,
) -> Option<ResolvedThresholds> {
    let baseline = baseline?;
    let sens = &config.sensitivity;
    if baseline.transaction_count < sens.min_baseline_transactions {
        return None;
    }

    // A zero baseline retry ratio would make any retry look infinitely
    // amplified; keep the static ceiling for that field.
    let retry_ceiling = if baseline.retry_ratio > 0.0 {
        baseline.retry_ratio * sens.retry_multiplier
    } else {
        config.static_limits.retry_ratio_ceiling
    };

    Some(ResolvedThresholds {
        success_rate_floor: (baseline.success_rate - sens.success_rate_drop_tolerance).max(0.0),
        success_rate_warning_floor: (baseline.success_rate - sens.warning_drop_tolerance).max(0.0),
        latency_p50_ceiling_ms: baseline.latency_p50_ms * sens.latency_multiplier,
        latency_p95_ceiling_ms: baseline.latency_p95_ms * sens.latency_multiplier,
        latency_p99_ceiling_ms: baseline.latency_p99_ms * sens.latency_multiplier,
        retry_ratio_ceiling: retry_ceiling,
        retry_amplification_limit: sens.retry_multiplier,
    })
}

/// Per-field merge of static and dynamic thresholds. "Stricter" means a
/// higher floor for rates and a lower ceiling for latency/retry.
fn merge(
    static_limits: &ResolvedThresholds,
    dynamic: &ResolvedThresholds,
    strategy: HybridMergeStrategy,
) -> ResolvedThresholds {
    let (floor, ceiling): (fn(f64, f64) -> f64, fn(f64, f64) -> f64) = match strategy {
        HybridMergeStrategy::Conservative => (f64::max, f64::min),
        HybridMergeStrategy::Permissive => (f64::min, f64::max),
    };

    ResolvedThresholds {
        success_rate_floor: floor(static_limits.success_rate_floor, dynamic.success_rate_floor),
        success_rate_warning_floor: floor(
            static_limits.success_rate_warning_floor,
            dynamic.success_rate_warning_floor,
        ),
        latency_p50_ceiling_ms: ceiling(
            static_limits.latency_p50_ceiling_ms,
            dynamic.latency_p50_ceiling_ms,
        ),
        latency_p95_ceiling_ms: ceiling(
            static_limits.latency_p95_ceiling_ms,
            dynamic.latency_p95_ceiling_ms,
        ),
        latency_p99_ceiling_ms: ceiling(
            static_limits.latency_p99_ceiling_ms,
            dynamic.latency_p99_ceiling_ms,
        ),
        retry_ratio_ceiling: ceiling(
            static_limits.retry_ratio_ceiling,
            dynamic.retry_ratio_ceiling,
        ),
        retry_amplification_limit: static_limits.retry_amplification_limit,
    }
}
