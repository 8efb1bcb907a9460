// remediation-engine-rs/src/patterns.rs
// Pattern recognition: four classifiers over the cycle's anomaly set.
// The noise classifier runs last and only when nothing else is confident.
// No confidence ever reaches 1.0.

use pipeline_types::{
    clamp_confidence, clamp_unit, Anomaly, AnomalyType, DiagnosticContext, Evidence, PatternType,
    RecognizedPattern, Severity,
};

use crate::anomaly::{AFFECTED_DROP, HEALTHY_DROP};

const ISSUER_DEGRADATION_FLOOR: f64 = 0.3;
const RETRY_STORM_FLOOR: f64 = 0.4;
const LATENCY_SPIKE_FLOOR: f64 = 0.35;
const NOISE_CAP: f64 = 0.8;

/// Run all classifiers; result is sorted descending by confidence.
pub fn recognize(ctx: &DiagnosticContext<'_>) -> Vec<RecognizedPattern> {
    let mut patterns: Vec<RecognizedPattern> = [
        classify_issuer_degradation(ctx),
        classify_retry_storm(ctx),
        classify_latency_spike(ctx),
    ]
    .into_iter()
    .flatten()
    .collect();

    // Noise must see the other classifiers' output: it only fires when
    // none of them produced a confident explanation.
    if let Some(noise) = classify_noise(ctx, &patterns) {
        patterns.push(noise);
    }

    patterns.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    patterns
}

/// 60% max significance, 40% mean significance, clamped below 1.0.
fn blend_confidence(evidence: &[Evidence]) -> f64 {
    if evidence.is_empty() {
        return 0.0;
    }
    let max = evidence
        .iter()
        .map(|e| e.significance)
        .fold(0.0_f64, f64::max);
    let mean = evidence.iter().map(|e| e.significance).sum::<f64>() / evidence.len() as f64;
    clamp_confidence(0.6 * max + 0.4 * mean)
}

fn find_anomaly<'a>(ctx: &'a DiagnosticContext<'_>, kind: AnomalyType) -> Option<&'a Anomaly> {
    ctx.anomalies.iter().find(|a| a.anomaly_type == kind)
}

/// Issuer degradation: some issuers fell sharply while at least one
/// stayed healthy. The healthy contrast is what distinguishes this from
/// a platform-wide outage.
fn classify_issuer_degradation(ctx: &DiagnosticContext<'_>) -> Option<RecognizedPattern> {
    let success_anomaly = find_anomaly(ctx, AnomalyType::SuccessRateDrop);

    let mut degraded: Vec<(&str, f64, f64, f64)> = Vec::new();
    let mut healthy: Vec<(&str, f64, f64)> = Vec::new();
    for issuer in &ctx.current.issuers {
        let Some(base) = ctx.baseline.issuer(&issuer.issuer_id) else {
            continue;
        };
        let drop = base.success_rate - issuer.success_rate;
        if drop >= AFFECTED_DROP {
            degraded.push((
                &issuer.issuer_id,
                issuer.success_rate,
                base.success_rate,
                drop,
            ));
        } else if drop.abs() <= HEALTHY_DROP {
            healthy.push((&issuer.issuer_id, issuer.success_rate, base.success_rate));
        }
    }

    let anomaly_names_issuers =
        success_anomaly.is_some_and(|a| !a.affected_issuers.is_empty());
    let sharp_drop = degraded.iter().any(|(_, _, _, drop)| *drop > 0.10);
    if !(anomaly_names_issuers || sharp_drop) {
        return None;
    }
    if healthy.is_empty() {
        return None;
    }

    let mut evidence = Vec::new();
    let mut affected = Vec::new();
    for (id, observed, expected, drop) in &degraded {
        affected.push((*id).to_string());
        evidence.push(Evidence {
            metric: format!("issuer.{id}.success_rate"),
            observed: *observed,
            expected: *expected,
            significance: clamp_unit(drop / 0.25),
        });
    }
    for (id, observed, expected) in &healthy {
        evidence.push(Evidence {
            metric: format!("issuer.{id}.stability"),
            observed: *observed,
            expected: *expected,
            significance: clamp_unit(1.0 - (expected - observed).abs() / AFFECTED_DROP),
        });
    }

    let confidence = blend_confidence(&evidence);
    if confidence <= ISSUER_DEGRADATION_FLOOR {
        return None;
    }

    Some(RecognizedPattern {
        pattern_type: PatternType::IssuerDegradation,
        confidence,
        description: format!(
            "degradation isolated to {} issuer(s) [{}] while {} issuer(s) remain healthy",
            affected.len(),
            affected.join(", "),
            healthy.len()
        ),
        evidence,
        affected_issuers: affected,
    })
}

/// Retry storm: retries amplifying well past baseline, with correlated
/// success-rate and latency evidence folded in when present.
fn classify_retry_storm(ctx: &DiagnosticContext<'_>) -> Option<RecognizedPattern> {
    let retry_anomaly = find_anomaly(ctx, AnomalyType::RetryAmplification)?;

    let amplification = if ctx.baseline.retry_ratio > 0.0 {
        ctx.current.retry_ratio / ctx.baseline.retry_ratio
    } else {
        retry_anomaly.deviation
    };
    if amplification <= 1.5 {
        return None;
    }

    let mut evidence = vec![Evidence {
        metric: "retry_ratio".to_string(),
        observed: ctx.current.retry_ratio,
        expected: ctx.baseline.retry_ratio,
        significance: clamp_unit((amplification - 1.0) / 4.0),
    }];

    if let Some(success_anomaly) = find_anomaly(ctx, AnomalyType::SuccessRateDrop) {
        evidence.push(Evidence {
            metric: "success_rate".to_string(),
            observed: ctx.current.success_rate,
            expected: ctx.baseline.success_rate,
            significance: clamp_unit(success_anomaly.deviation / 0.05),
        });
    }
    if ctx.baseline.latency_p95_ms > 0.0 {
        let latency_growth = ctx.current.latency_p95_ms / ctx.baseline.latency_p95_ms - 1.0;
        if latency_growth > 0.2 {
            evidence.push(Evidence {
                metric: "latency_p95_ms".to_string(),
                observed: ctx.current.latency_p95_ms,
                expected: ctx.baseline.latency_p95_ms,
                significance: clamp_unit(latency_growth),
            });
        }
    }

    let confidence = blend_confidence(&evidence);
    if confidence <= RETRY_STORM_FLOOR {
        return None;
    }

    Some(RecognizedPattern {
        pattern_type: PatternType::RetryStorm,
        confidence,
        description: format!(
            "retries running at {amplification:.1}x baseline, feeding back into load"
        ),
        evidence,
        affected_issuers: retry_anomaly.affected_issuers.clone(),
    })
}

/// Latency spike pattern: a latency anomaly plus the breadth of issuer
/// involvement (above half the issuers means a broad spike).
fn classify_latency_spike(ctx: &DiagnosticContext<'_>) -> Option<RecognizedPattern> {
    let latency_anomaly = find_anomaly(ctx, AnomalyType::LatencySpike)?;

    let mut evidence = vec![Evidence {
        metric: "latency_ceiling_ratio".to_string(),
        observed: latency_anomaly.deviation,
        expected: 1.0,
        significance: clamp_unit((latency_anomaly.deviation - 1.0) / 1.5),
    }];

    for (metric, observed, expected) in [
        (
            "latency_p50_ms",
            ctx.current.latency_p50_ms,
            ctx.baseline.latency_p50_ms,
        ),
        (
            "latency_p95_ms",
            ctx.current.latency_p95_ms,
            ctx.baseline.latency_p95_ms,
        ),
        (
            "latency_p99_ms",
            ctx.current.latency_p99_ms,
            ctx.baseline.latency_p99_ms,
        ),
    ] {
        if expected <= 0.0 {
            continue;
        }
        let ratio = observed / expected;
        if ratio <= 1.0 {
            continue;
        }
        evidence.push(Evidence {
            metric: metric.to_string(),
            observed,
            expected,
            significance: clamp_unit((ratio - 1.0) / 1.5),
        });
    }

    let mut widened = Vec::new();
    let mut compared = 0usize;
    for issuer in &ctx.current.issuers {
        let Some(base) = ctx.baseline.issuer(&issuer.issuer_id) else {
            continue;
        };
        if base.latency_p95_ms <= 0.0 {
            continue;
        }
        compared += 1;
        if issuer.latency_p95_ms / base.latency_p95_ms - 1.0 > 0.20 {
            widened.push(issuer.issuer_id.clone());
        }
    }
    let breadth = if compared > 0 {
        widened.len() as f64 / compared as f64
    } else {
        0.0
    };
    evidence.push(Evidence {
        metric: "issuer_breadth".to_string(),
        observed: breadth,
        expected: 0.0,
        significance: clamp_unit(breadth),
    });

    let confidence = blend_confidence(&evidence);
    if confidence <= LATENCY_SPIKE_FLOOR {
        return None;
    }

    let description = if breadth > 0.5 {
        format!(
            "broad latency degradation: {:.0}% of issuers past +20% on p95",
            breadth * 100.0
        )
    } else if widened.is_empty() {
        "latency degradation at the aggregate percentiles".to_string()
    } else {
        format!("latency degradation concentrated in [{}]", widened.join(", "))
    };

    Some(RecognizedPattern {
        pattern_type: PatternType::LatencySpike,
        confidence,
        description,
        evidence,
        affected_issuers: widened,
    })
}

/// Noise: anomalies exist but everything stayed mild and no other
/// classifier produced a confident explanation. Confidence is the
/// inverse of the other detectors: the smaller the deviations, the more
/// likely this is measurement noise. Capped at 0.8.
fn classify_noise(
    ctx: &DiagnosticContext<'_>,
    others: &[RecognizedPattern],
) -> Option<RecognizedPattern> {
    if ctx.anomalies.is_empty() {
        return None;
    }
    if others.iter().any(|p| p.confidence > 0.6) {
        return None;
    }
    if ctx.anomalies.iter().any(|a| a.severity > Severity::Medium) {
        return None;
    }
    if others.iter().any(|p| p.confidence >= 0.5) {
        return None;
    }

    let mut evidence = Vec::new();
    let mut magnitudes = Vec::new();
    for anomaly in ctx.anomalies {
        let magnitude = normalized_deviation(anomaly);
        magnitudes.push(magnitude);
        evidence.push(Evidence {
            metric: anomaly.anomaly_type.to_string(),
            observed: anomaly.deviation,
            expected: 0.0,
            significance: clamp_unit(1.0 - magnitude),
        });
    }
    let mean_magnitude = magnitudes.iter().sum::<f64>() / magnitudes.len() as f64;
    let confidence = clamp_confidence((NOISE_CAP * (1.0 - mean_magnitude)).min(NOISE_CAP));

    Some(RecognizedPattern {
        pattern_type: PatternType::Noise,
        confidence,
        description: format!(
            "{} mild anomaly(ies) with no coherent failure shape; likely measurement noise",
            ctx.anomalies.len()
        ),
        evidence,
        affected_issuers: Vec::new(),
    })
}

/// Map an anomaly's deviation onto [0, 1] against the scale where its
/// detector saturates to critical.
fn normalized_deviation(anomaly: &Anomaly) -> f64 {
    match anomaly.anomaly_type {
        AnomalyType::SuccessRateDrop => clamp_unit(anomaly.deviation / 0.05),
        AnomalyType::LatencySpike => clamp_unit((anomaly.deviation - 1.0) / 1.0),
        AnomalyType::RetryAmplification => clamp_unit((anomaly.deviation - 1.0) / 2.0),
    }
}
