// remediation-engine-rs/src/anomaly.rs
// Three independent pure detectors, one per anomaly type. Each compares
// the current snapshot against the resolved thresholds and baseline and
// returns at most one anomaly. Detectors never suppress one another;
// multiple anomalies can co-exist in a cycle.

use chrono::Utc;
use pipeline_types::{
    clamp_unit, Anomaly, AnomalyType, ContributingFactor, MetricsSnapshot, Severity,
};

use crate::thresholds::ResolvedThresholds;

/// An issuer counts as affected once its success rate sits this far
/// under baseline; within `HEALTHY_DROP` of baseline it counts healthy.
pub(crate) const AFFECTED_DROP: f64 = 0.05;
pub(crate) const HEALTHY_DROP: f64 = 0.02;

const MAX_CONTRIBUTING_FACTORS: usize = 5;

/// Run all three detectors. Output order is fixed (drop, spike, retry)
/// so cycles are reproducible; length is 0-3.
pub fn detect_all(
    current: &MetricsSnapshot,
    baseline: &MetricsSnapshot,
    thresholds: &ResolvedThresholds,
) -> Vec<Anomaly> {
    [
        detect_success_rate_drop(current, baseline, thresholds),
        detect_latency_spike(current, baseline, thresholds),
        detect_retry_amplification(current, baseline, thresholds),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Success-rate drop: deviation is the shortfall under the hard floor; a
/// crossing of the warning floor alone yields a low-severity anomaly.
pub fn detect_success_rate_drop(
    current: &MetricsSnapshot,
    baseline: &MetricsSnapshot,
    thresholds: &ResolvedThresholds,
) -> Option<Anomaly> {
    let deviation = thresholds.success_rate_floor - current.success_rate;

    let (severity, deviation) = if deviation <= 0.0 {
        let warning_deviation = thresholds.success_rate_warning_floor - current.success_rate;
        if warning_deviation <= 0.0 {
            return None;
        }
        (Severity::Low, warning_deviation)
    } else if deviation >= 0.05 {
        (Severity::Critical, deviation)
    } else if deviation >= 0.03 {
        (Severity::High, deviation)
    } else if deviation >= 0.01 {
        (Severity::Medium, deviation)
    } else {
        (Severity::Low, deviation)
    };

    let mut factors = Vec::new();
    let mut affected = Vec::new();

    for issuer in &current.issuers {
        let Some(base) = baseline.issuer(&issuer.issuer_id) else {
            continue;
        };
        let drop = base.success_rate - issuer.success_rate;
        if drop <= 0.0 {
            continue;
        }
        if drop >= AFFECTED_DROP {
            affected.push(issuer.issuer_id.clone());
        }
        let share = current.issuer_share(&issuer.issuer_id);
        factors.push(ContributingFactor {
            factor: format!("issuer:{}", issuer.issuer_id),
            // Weight the drop by the issuer's share of total volume so a
            // large issuer's partial outage outranks a tiny issuer's
            // total one.
            impact: clamp_unit(drop * share * 10.0),
            details: format!(
                "success rate {:.3} vs baseline {:.3} ({:.1}% of traffic)",
                issuer.success_rate,
                base.success_rate,
                share * 100.0
            ),
        });
    }

    for code in &current.error_codes {
        let base_pct = baseline
            .error_codes
            .iter()
            .find(|c| c.code == code.code)
            .map(|c| c.percentage)
            .unwrap_or(0.0);
        let increase = code.percentage - base_pct;
        if increase <= 0.0 {
            continue;
        }
        factors.push(ContributingFactor {
            factor: format!("error_code:{}", code.code),
            impact: clamp_unit(increase / 10.0),
            details: format!(
                "{:.2}% of transactions vs baseline {:.2}%",
                code.percentage, base_pct
            ),
        });
    }

    factors.sort_by(|a, b| b.impact.total_cmp(&a.impact));
    factors.truncate(MAX_CONTRIBUTING_FACTORS);

    Some(Anomaly {
        anomaly_type: AnomalyType::SuccessRateDrop,
        severity,
        deviation,
        contributing_factors: factors,
        affected_issuers: affected,
        detected_at: Utc::now(),
    })
}

/// Latency spike: the worst observed-to-ceiling ratio across the three
/// percentiles, banded at 1.2x/1.5x/2.0x.
pub fn detect_latency_spike(
    current: &MetricsSnapshot,
    baseline: &MetricsSnapshot,
    thresholds: &ResolvedThresholds,
) -> Option<Anomaly> {
    let ratios = [
        current.latency_p50_ms / thresholds.latency_p50_ceiling_ms,
        current.latency_p95_ms / thresholds.latency_p95_ceiling_ms,
        current.latency_p99_ms / thresholds.latency_p99_ceiling_ms,
    ];
    let max_ratio = ratios.into_iter().fold(0.0_f64, f64::max);
    if max_ratio <= 1.0 {
        return None;
    }

    let severity = if max_ratio >= 2.0 {
        Severity::Critical
    } else if max_ratio >= 1.5 {
        Severity::High
    } else if max_ratio >= 1.2 {
        Severity::Medium
    } else {
        Severity::Low
    };

    let mut factors = Vec::new();
    let mut affected = Vec::new();
    for issuer in &current.issuers {
        let Some(base) = baseline.issuer(&issuer.issuer_id) else {
            continue;
        };
        if base.latency_p95_ms <= 0.0 {
            continue;
        }
        let growth = issuer.latency_p95_ms / base.latency_p95_ms - 1.0;
        if growth <= 0.30 {
            continue;
        }
        affected.push(issuer.issuer_id.clone());
        factors.push(ContributingFactor {
            factor: format!("issuer:{}", issuer.issuer_id),
            impact: clamp_unit(growth / 2.0),
            details: format!(
                "p95 {:.0}ms vs baseline {:.0}ms (+{:.0}%)",
                issuer.latency_p95_ms,
                base.latency_p95_ms,
                growth * 100.0
            ),
        });
    }

    factors.sort_by(|a, b| b.impact.total_cmp(&a.impact));
    factors.truncate(MAX_CONTRIBUTING_FACTORS);

    Some(Anomaly {
        anomaly_type: AnomalyType::LatencySpike,
        severity,
        deviation: max_ratio,
        contributing_factors: factors,
        affected_issuers: affected,
        detected_at: Utc::now(),
    })
}

/// Retry amplification: triggers when the retry ratio exceeds either the
/// absolute ceiling or the allowed amplification over baseline. Severity
/// bands at 1.5x/2.0x/3.0x of the worse of the two ratios.
pub fn detect_retry_amplification(
    current: &MetricsSnapshot,
    baseline: &MetricsSnapshot,
    thresholds: &ResolvedThresholds,
) -> Option<Anomaly> {
    let ceiling_ratio = if thresholds.retry_ratio_ceiling > 0.0 {
        current.retry_ratio / thresholds.retry_ratio_ceiling
    } else {
        0.0
    };
    // Undefined amplification over a retry-free baseline: judge on the
    // absolute ceiling alone.
    let amplification = if baseline.retry_ratio > 0.0 {
        current.retry_ratio / baseline.retry_ratio
    } else {
        ceiling_ratio
    };

    let exceeded = current.retry_ratio > thresholds.retry_ratio_ceiling
        || amplification > thresholds.retry_amplification_limit;
    if !exceeded {
        return None;
    }

    let worse = ceiling_ratio.max(amplification);
    let severity = if worse >= 3.0 {
        Severity::Critical
    } else if worse >= 2.0 {
        Severity::High
    } else if worse >= 1.5 {
        Severity::Medium
    } else {
        Severity::Low
    };

    let mut factors = vec![ContributingFactor {
        factor: "retry_ratio".to_string(),
        impact: clamp_unit((worse - 1.0) / 3.0),
        details: format!(
            "retry ratio {:.3} vs ceiling {:.3} ({:.1}x baseline)",
            current.retry_ratio, thresholds.retry_ratio_ceiling, amplification
        ),
    }];
    if current.retry_count > baseline.retry_count {
        let delta = current.retry_count - baseline.retry_count;
        factors.push(ContributingFactor {
            factor: "retry_count".to_string(),
            impact: clamp_unit(delta as f64 / current.retry_count.max(1) as f64),
            details: format!(
                "{} retries vs baseline {}",
                current.retry_count, baseline.retry_count
            ),
        });
    }

    // Issuers whose error rate grew sharply are the likely retry sources.
    let mut affected = Vec::new();
    for issuer in &current.issuers {
        let Some(base) = baseline.issuer(&issuer.issuer_id) else {
            continue;
        };
        let rate = error_rate(issuer.error_count, issuer.transaction_count);
        let base_rate = error_rate(base.error_count, base.transaction_count);
        if base_rate > 0.0 && rate / base_rate > 1.5 {
            affected.push(issuer.issuer_id.clone());
        }
    }

    factors.sort_by(|a, b| b.impact.total_cmp(&a.impact));
    factors.truncate(MAX_CONTRIBUTING_FACTORS);

    Some(Anomaly {
        anomaly_type: AnomalyType::RetryAmplification,
        severity,
        deviation: worse,
        contributing_factors: factors,
        affected_issuers: affected,
        detected_at: Utc::now(),
    })
}

fn error_rate(errors: u64, transactions: u64) -> f64 {
    if transactions == 0 {
        return 0.0;
    }
    errors as f64 / transactions as f64
}
