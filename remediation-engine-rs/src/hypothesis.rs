// remediation-engine-rs/src/hypothesis.rs
// Hypothesis generation: one causal explanation per recognized pattern,
// obtained from the reasoning oracle and validated, or synthesized
// locally when the oracle fails. A single pattern's failure never blocks
// the others; the cycle always gets a hypothesis per pattern.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use oracle_client::{HypothesisOracle, OracleError, OracleHypothesis};
use pipeline_types::{
    clamp_confidence, AlternativeExplanation, Hypothesis, HypothesisSource, MetricsSnapshot,
    PatternType, ReasoningStep, RecognizedPattern,
};
use uuid::Uuid;

const FALLBACK_ALTERNATIVE_CONFIDENCE: f64 = 0.2;

pub struct HypothesisGenerator {
    oracle: Arc<dyn HypothesisOracle>,
    oracle_timeout: Duration,
}

impl HypothesisGenerator {
    pub fn new(oracle: Arc<dyn HypothesisOracle>, oracle_timeout: Duration) -> Self {
        Self {
            oracle,
            oracle_timeout,
        }
    }

    /// Generate one hypothesis per pattern. Oracle failures degrade to the
    /// local fallback per pattern; this function itself cannot fail.
    pub async fn generate_all(
        &self,
        patterns: &[RecognizedPattern],
        current: &MetricsSnapshot,
        baseline: &MetricsSnapshot,
    ) -> Vec<Hypothesis> {
        let mut hypotheses = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            hypotheses.push(self.generate_one(pattern, current, baseline).await);
        }
        hypotheses
    }

    async fn generate_one(
        &self,
        pattern: &RecognizedPattern,
        current: &MetricsSnapshot,
        baseline: &MetricsSnapshot,
    ) -> Hypothesis {
        let prompt = build_prompt(pattern, current, baseline);
        tracing::debug!(
            pattern = %pattern.pattern_type,
            prompt_len = prompt.len(),
            "requesting hypothesis from oracle"
        );

        let oracle_result: Result<OracleHypothesis, OracleError> =
            match tokio::time::timeout(self.oracle_timeout, self.oracle.generate(&prompt)).await {
                Ok(result) => result,
                Err(_) => Err(OracleError::Timeout(self.oracle_timeout.as_secs())),
            };

        match oracle_result {
            Ok(response) => match validate_response(response, pattern) {
                Ok(hypothesis) => hypothesis,
                Err(reason) => {
                    tracing::warn!(
                        pattern = %pattern.pattern_type,
                        reason = %reason,
                        "oracle response failed validation; using local fallback"
                    );
                    metrics::increment_counter!(
                        "remediation_oracle_fallbacks_total",
                        "pattern" => pattern.pattern_type.to_string()
                    );
                    fallback_hypothesis(pattern)
                }
            },
            Err(err) => {
                tracing::warn!(
                    pattern = %pattern.pattern_type,
                    error = %err,
                    "oracle call failed; using local fallback"
                );
                metrics::increment_counter!(
                    "remediation_oracle_fallbacks_total",
                    "pattern" => pattern.pattern_type.to_string()
                );
                fallback_hypothesis(pattern)
            }
        }
    }
}

/// Structured prompt summarizing the pattern, its evidence, and the
/// headline metrics of both snapshots.
fn build_prompt(
    pattern: &RecognizedPattern,
    current: &MetricsSnapshot,
    baseline: &MetricsSnapshot,
) -> String {
    let mut prompt = format!(
        "A payment pipeline shows the failure pattern \"{}\" (confidence {:.2}).\n\
         Pattern summary: {}\n\n\
         Current metrics: success rate {:.3}, p95 latency {:.0}ms, retry ratio {:.3}, \
         {} transactions.\n\
         Baseline metrics: success rate {:.3}, p95 latency {:.0}ms, retry ratio {:.3}, \
         {} transactions.\n\nEvidence:\n",
        pattern.pattern_type,
        pattern.confidence,
        pattern.description,
        current.success_rate,
        current.latency_p95_ms,
        current.retry_ratio,
        current.transaction_count,
        baseline.success_rate,
        baseline.latency_p95_ms,
        baseline.retry_ratio,
        baseline.transaction_count,
    );
    for evidence in &pattern.evidence {
        prompt.push_str(&format!(
            "- {}: observed {:.3}, expected {:.3} (significance {:.2})\n",
            evidence.metric, evidence.observed, evidence.expected, evidence.significance
        ));
    }
    if !pattern.affected_issuers.is_empty() {
        prompt.push_str(&format!(
            "Affected issuers: {}\n",
            pattern.affected_issuers.join(", ")
        ));
    }
    prompt.push_str(
        "\nProvide the most likely causal explanation, a step-by-step reasoning chain, \
         and at least two alternative explanations with why each is less likely.",
    );
    prompt
}

/// Validate and normalize an oracle response into a domain hypothesis.
///
/// Rejects empty hypothesis text outright; clamps confidence into
/// [0.01, 0.99]; synthesizes a reasoning chain from the evidence when the
/// oracle omitted one; pads alternatives to the two the contract requires.
fn validate_response(
    response: OracleHypothesis,
    pattern: &RecognizedPattern,
) -> Result<Hypothesis, String> {
    let primary = response.primary_hypothesis.trim().to_string();
    if primary.is_empty() {
        return Err("empty hypothesis text".to_string());
    }

    let confidence = clamp_confidence(response.confidence);

    let reasoning_chain: Vec<ReasoningStep> = if response.reasoning_chain.is_empty() {
        synthesize_chain(pattern)
    } else {
        response
            .reasoning_chain
            .into_iter()
            .map(|step| ReasoningStep {
                observation: step.observation,
                inference: step.inference,
            })
            .collect()
    };

    let mut alternatives: Vec<AlternativeExplanation> = response
        .alternative_explanations
        .into_iter()
        .filter(|alt| !alt.explanation.trim().is_empty())
        .map(|alt| AlternativeExplanation {
            explanation: alt.explanation,
            confidence: clamp_confidence(alt.confidence),
            why_less_likely: if alt.why_less_likely.trim().is_empty() {
                "not ranked by the oracle".to_string()
            } else {
                alt.why_less_likely
            },
        })
        .collect();
    if alternatives.len() < 2 {
        for canned in canned_alternatives(pattern.pattern_type) {
            if alternatives.len() >= 2 {
                break;
            }
            alternatives.push(canned);
        }
    }

    Ok(Hypothesis {
        id: Uuid::new_v4(),
        pattern_type: pattern.pattern_type,
        confidence,
        primary_explanation: primary,
        reasoning_chain,
        alternatives,
        supporting_evidence: pattern.evidence.clone(),
        source: HypothesisSource::Oracle,
        generated_at: Utc::now(),
    })
}

/// Deterministic local hypothesis keyed by pattern type, used whenever
/// the oracle is unreachable or its output fails validation.
pub(crate) fn fallback_hypothesis(pattern: &RecognizedPattern) -> Hypothesis {
    let primary = match pattern.pattern_type {
        PatternType::IssuerDegradation => {
            "One or more issuers are degraded at the issuer or acquirer side while the rest \
             of the pipeline is healthy; the most likely cause is an issuer-side incident or \
             maintenance window."
        }
        PatternType::RetryStorm => {
            "Failed transactions are being retried aggressively enough to amplify load; the \
             most likely cause is a downstream fault combined with an unbounded retry policy."
        }
        PatternType::LatencySpike => {
            "Processing latency has risen across percentiles; the most likely cause is \
             saturation or slowdown in a shared dependency on the payment path."
        }
        PatternType::Noise => {
            "Observed deviations are small and inconsistent; the most likely explanation is \
             ordinary variance in the metrics rather than a real fault."
        }
    };

    Hypothesis {
        id: Uuid::new_v4(),
        pattern_type: pattern.pattern_type,
        confidence: clamp_confidence(pattern.confidence * 0.75),
        primary_explanation: primary.to_string(),
        reasoning_chain: synthesize_chain(pattern),
        alternatives: canned_alternatives(pattern.pattern_type),
        supporting_evidence: pattern.evidence.clone(),
        source: HypothesisSource::Fallback,
        generated_at: Utc::now(),
    }
}

/// Build a reasoning chain from the pattern's own evidence.
fn synthesize_chain(pattern: &RecognizedPattern) -> Vec<ReasoningStep> {
    let mut chain: Vec<ReasoningStep> = pattern
        .evidence
        .iter()
        .take(4)
        .map(|e| ReasoningStep {
            observation: format!(
                "{} observed at {:.3} against an expected {:.3}",
                e.metric, e.observed, e.expected
            ),
            inference: format!(
                "deviation supports the {} pattern (significance {:.2})",
                pattern.pattern_type, e.significance
            ),
        })
        .collect();
    if chain.is_empty() {
        chain.push(ReasoningStep {
            observation: pattern.description.clone(),
            inference: format!("consistent with the {} pattern", pattern.pattern_type),
        });
    }
    chain
}

fn canned_alternatives(pattern_type: PatternType) -> Vec<AlternativeExplanation> {
    let (first, second) = match pattern_type {
        PatternType::IssuerDegradation => (
            ("a network path problem between the gateway and the affected issuers",
             "latency to unaffected issuers over the same paths is unchanged"),
            ("a fraud-rule change rejecting legitimate traffic",
             "error codes are availability-shaped rather than decline-shaped"),
        ),
        PatternType::RetryStorm => (
            ("a genuine surge in client traffic",
             "transaction volume does not show a matching organic increase"),
            ("a batch job re-submitting failed payments",
             "retries correlate with live error responses, not a schedule"),
        ),
        PatternType::LatencySpike => (
            ("a garbage-collection or resource spike in the gateway itself",
             "issuer-side percentiles moved together with the aggregate"),
            ("a slow database or cache tier behind the pipeline",
             "success rates would usually degrade before latency at this scale"),
        ),
        PatternType::Noise => (
            ("the earliest phase of a real incident still below thresholds",
             "deviations have not grown across consecutive observations"),
            ("a measurement or aggregation artifact in the collector",
             "multiple independent metrics moved, if only slightly"),
        ),
    };

    vec![
        AlternativeExplanation {
            explanation: first.0.to_string(),
            confidence: FALLBACK_ALTERNATIVE_CONFIDENCE,
            why_less_likely: first.1.to_string(),
        },
        AlternativeExplanation {
            explanation: second.0.to_string(),
            confidence: FALLBACK_ALTERNATIVE_CONFIDENCE,
            why_less_likely: second.1.to_string(),
        },
    ]
}
